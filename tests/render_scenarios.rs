use std::f64::consts::TAU;

use mixdown_core::graph::{GraphContext, NodeSpec};
use mixdown_core::render::build_track_chain;
use mixdown_core::{
    AudioRegion, CacheMode, CancelToken, MidiNote, MidiRegion, Project, Region, RenderConfig,
    RenderError, RenderSession, RenderState, SampleLibrary, TimeSignature, Track, TrackKind,
    dsp::SampleBuffer, render,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn note(pitch: u8, start: f64, duration: f64, velocity: u8) -> MidiNote {
    MidiNote {
        pitch,
        start,
        duration,
        velocity,
    }
}

fn midi_track(index: usize, kind: TrackKind, length: f64, notes: Vec<MidiNote>) -> Track {
    let mut track = Track::new(index, kind);
    track.regions.push(Region::Midi(MidiRegion {
        start: 0.0,
        length,
        notes,
    }));
    track
}

fn project(tracks: Vec<Track>) -> Project {
    let mut project = Project::new(120.0, TimeSignature::default());
    project.tracks = tracks;
    project
}

fn config(sample_rate: u32) -> RenderConfig {
    RenderConfig::default().with_sample_rate(sample_rate)
}

fn tone_power(samples: &[f32], freq: f64, sample_rate: f64) -> f64 {
    let coeff = 2.0 * (TAU * freq / sample_rate).cos();
    let (mut s1, mut s2) = (0.0, 0.0);
    for &x in samples {
        let s = x as f64 + coeff * s1 - s2;
        s2 = s1;
        s1 = s;
    }
    s1 * s1 + s2 * s2 - coeff * s1 * s2
}

#[test]
fn single_a4_note_sounds_at_440hz_from_the_start() {
    init_tracing();
    let project = project(vec![midi_track(
        0,
        TrackKind::Instrument,
        1.0,
        vec![note(69, 0.0, 1.0, 127)],
    )]);
    let out = render(&project, &SampleLibrary::new(), config(48_000), CancelToken::new()).unwrap();

    // One 4/4 bar at 120 bpm.
    assert_eq!(out.frames(), 96_000);
    assert!((out.duration - 2.0).abs() < 1e-9);

    let onset = out.buffer.left[..480].iter().map(|s| s.abs()).fold(0.0, f32::max);
    assert!(onset > 0.0, "no signal in the first 10 ms");

    let window = &out.buffer.left[4_800..48_000];
    let p440 = tone_power(window, 440.0, 48_000.0);
    for other in [220.0, 330.0, 550.0, 660.0, 880.0] {
        let p = tone_power(window, other, 48_000.0);
        assert!(p440 > p, "440 Hz ({p440}) should dominate {other} Hz ({p})");
    }
}

#[test]
fn simultaneous_kick_and_snare_stay_in_range() {
    init_tracing();
    let project = project(vec![midi_track(
        0,
        TrackKind::Drums,
        0.5,
        vec![note(36, 0.0, 0.25, 127), note(38, 0.0, 0.25, 127)],
    )]);
    let out = render(&project, &SampleLibrary::new(), config(44_100), CancelToken::new()).unwrap();
    let peak = out.buffer.peak();
    assert!(peak.is_finite());
    assert!(peak > 0.0);
    assert!(peak <= 2.0, "peak {peak}");
    assert!(out.buffer.energy() > 0.0);
}

#[test]
fn reverb_stage_follows_the_send() {
    let ctx = GraphContext::new(22_050.0, 3, CacheMode::Bypass);
    let mut track = Track::new(0, TrackKind::Instrument);
    assert!(!build_track_chain(&track, &ctx).unwrap().has_reverb());

    track.reverb = 50.0;
    let mut chain = build_track_chain(&track, &ctx).unwrap();
    assert!(chain.has_reverb());
    let reverb = chain.reverb_mut().unwrap();
    reverb.set_amount(0.0);
    assert_eq!(reverb.wet_gain(), 0.0);

    let mut buffer = mixdown_core::dsp::StereoBuffer::from_channels(vec![0.5; 64], vec![0.5; 64]);
    chain.process(&mut buffer);
    assert!(buffer.left.iter().all(|s| s.is_finite()));
    chain.teardown();
    assert_eq!(ctx.live_nodes(), 0);
}

#[test]
fn reverb_send_adds_a_tail() {
    let dry = project(vec![midi_track(
        0,
        TrackKind::Drums,
        1.0,
        vec![note(38, 0.0, 0.0625, 127)],
    )]);
    let mut wet = dry.clone();
    wet.tracks[0].reverb = 60.0;
    let library = SampleLibrary::new();
    let a = render(&dry, &library, config(22_050), CancelToken::new()).unwrap();
    let b = render(&wet, &library, config(22_050), CancelToken::new()).unwrap();

    // The snare is gone after half a second; only the reverb rings on.
    let late = |out: &mixdown_core::RenderOutput| -> f64 {
        out.buffer.left[22_050..].iter().map(|&s| s as f64 * s as f64).sum()
    };
    assert_eq!(late(&a), 0.0);
    assert!(late(&b) > 0.0);
}

fn busy_project() -> Project {
    let mut lead = midi_track(
        0,
        TrackKind::Instrument,
        1.0,
        vec![note(60, 0.0, 0.25, 100), note(64, 0.25, 0.25, 90), note(67, 0.5, 0.5, 110)],
    );
    lead.reverb = 30.0;
    lead.pan = 25.0;
    lead.effects.push(NodeSpec::from_json(&serde_json::json!({ "type": "overdrive", "amount": 30 })).unwrap());
    let drums = midi_track(
        1,
        TrackKind::Drums,
        1.0,
        vec![
            note(36, 0.0, 0.125, 127),
            note(42, 0.125, 0.125, 80),
            note(38, 0.25, 0.125, 110),
            note(39, 0.5, 0.125, 100),
            note(49, 0.75, 0.25, 90),
        ],
    );
    project(vec![lead, drums])
}

#[test]
fn same_seed_renders_are_bit_identical() {
    init_tracing();
    let project = busy_project();
    let library = SampleLibrary::new();
    let mut cfg = config(22_050);
    cfg.master_effects.push(NodeSpec::Limiter { threshold: -1.0 });

    let a = render(&project, &library, cfg.clone(), CancelToken::new()).unwrap();
    let b = render(&project, &library, cfg.clone(), CancelToken::new()).unwrap();
    assert_eq!(a.buffer.left, b.buffer.left);
    assert_eq!(a.buffer.right, b.buffer.right);

    let shared = RenderConfig {
        impulse_cache: CacheMode::Shared,
        parallel_tracks: false,
        ..cfg.clone()
    };
    let c = render(&project, &library, shared, CancelToken::new()).unwrap();
    assert_eq!(a, c);

    let reseeded = RenderConfig {
        noise_seed: cfg.noise_seed ^ 1,
        ..cfg
    };
    let d = render(&project, &library, reseeded, CancelToken::new()).unwrap();
    assert_ne!(a.buffer.left, d.buffer.left);
}

#[test]
fn cancelled_render_releases_the_graph() {
    let project = busy_project();
    let library = SampleLibrary::new();
    let cancel = CancelToken::new();
    let mut session = RenderSession::new(&project, &library, config(22_050), cancel.clone()).unwrap();
    cancel.cancel();
    assert!(matches!(session.run(), Err(RenderError::Cancelled)));
    assert_ne!(session.state(), RenderState::Complete);
    assert_eq!(session.live_nodes(), 0);
}

#[test]
fn every_node_is_torn_down_after_rendering() {
    let project = busy_project();
    let library = SampleLibrary::new();
    let mut session = RenderSession::new(&project, &library, config(22_050), CancelToken::new()).unwrap();
    session.run().unwrap();
    assert_eq!(session.state(), RenderState::Complete);
    assert_eq!(session.live_nodes(), 0);
}

fn audio_track(file_id: &str, fade_in: f64, gain: f32) -> Track {
    let mut track = Track::new(0, TrackKind::Audio);
    track.volume = 100.0;
    track.regions.push(Region::Audio(AudioRegion {
        file_id: file_id.to_string(),
        start: 0.0,
        length: 0.25,
        trim_start: 0.0,
        gain,
        fade_in,
        fade_out: 0.0,
    }));
    track
}

#[test]
fn audio_region_plays_with_fade_and_gain() {
    let project = project(vec![audio_track("tone.wav", 0.1, 0.5)]);
    let mut library = SampleLibrary::new();
    library.insert("tone.wav", SampleBuffer::mono(vec![1.0; 8_000], 8_000));
    let out = render(&project, &library, config(8_000), CancelToken::new()).unwrap();

    assert_eq!(out.frames(), 4_000);
    assert_eq!(out.buffer.left[0], 0.0);
    assert!((out.buffer.left[400] - 0.25).abs() < 1e-3);
    assert!((out.buffer.left[2_000] - 0.5).abs() < 1e-6);
    assert!((out.buffer.right[2_000] - 0.5).abs() < 1e-6);
}

fn starting_before_zero(mut track: Track, start: f64) -> Track {
    if let Region::Audio(region) = &mut track.regions[0] {
        region.start = start;
    }
    track
}

#[test]
fn audio_region_before_zero_is_clipped_not_shifted() {
    let ramp: Vec<f32> = (0..8_000).map(|i| i as f32 / 8_000.0).collect();
    let mut library = SampleLibrary::new();
    library.insert("ramp.wav", SampleBuffer::mono(ramp, 8_000));
    library.insert("flat.wav", SampleBuffer::mono(vec![1.0; 8_000], 8_000));

    // A quarter second of the region lies before the render start.
    let clipped = project(vec![starting_before_zero(audio_track("ramp.wav", 0.0, 1.0), -0.125)]);
    let out = render(&clipped, &library, config(8_000), CancelToken::new()).unwrap();
    assert_eq!(out.frames(), 2_000);
    assert!((out.buffer.left[0] - 0.25).abs() < 1e-6, "got {}", out.buffer.left[0]);
    assert!((out.buffer.left[100] - 0.2625).abs() < 1e-6);

    // The fade-in picks up where the region's own timeline is.
    let faded = project(vec![starting_before_zero(audio_track("flat.wav", 0.5, 1.0), -0.125)]);
    let out = render(&faded, &library, config(8_000), CancelToken::new()).unwrap();
    assert!((out.buffer.left[0] - 0.5).abs() < 1e-6);
    assert!((out.buffer.left[1_000] - 0.75).abs() < 1e-6);
    assert!(out.buffer.left.windows(2).all(|w| w[1] >= w[0]));
}

#[test]
fn missing_sample_is_skipped() {
    init_tracing();
    let mut tracks = vec![audio_track("missing.wav", 0.0, 1.0)];
    tracks.push(midi_track(1, TrackKind::Instrument, 0.25, vec![note(57, 0.0, 0.125, 100)]));
    let project = project(tracks);
    let library = SampleLibrary::new();
    let mut session = RenderSession::new(&project, &library, config(8_000), CancelToken::new()).unwrap();
    let out = session.run().unwrap();
    assert_eq!(out.frames(), 4_000);
    assert!(out.buffer.peak() > 0.0);
    assert_eq!(session.live_nodes(), 0);
}

#[test]
fn mute_and_solo_select_tracks() {
    let lead = midi_track(0, TrackKind::Instrument, 0.25, vec![note(60, 0.0, 0.125, 100)]);
    let mut drums = midi_track(1, TrackKind::Drums, 0.25, vec![note(36, 0.0, 0.125, 100)]);
    let library = SampleLibrary::new();

    drums.mute = true;
    let mut muted = project(vec![lead.clone(), drums.clone()]);
    muted.tracks[0].mute = true;
    let out = render(&muted, &library, config(8_000), CancelToken::new()).unwrap();
    assert_eq!(out.buffer.peak(), 0.0);

    drums.mute = false;
    drums.solo = true;
    let soloed = project(vec![lead, drums.clone()]);
    let only_drums = project(vec![drums]);
    let a = render(&soloed, &library, config(8_000), CancelToken::new()).unwrap();
    let b = render(&only_drums, &library, config(8_000), CancelToken::new()).unwrap();
    assert_eq!(a.buffer, b.buffer);
}

#[test]
fn unknown_master_effect_fails_the_render() {
    let project = busy_project();
    let library = SampleLibrary::new();
    let json = r#"{ "masterEffects": [{ "type": "wahwah" }] }"#;
    assert!(RenderConfig::from_json(json).is_err());

    let mut cfg = config(8_000);
    cfg.master_effects.push(NodeSpec::FadeIn {
        duration: f64::NAN,
        offset: 0.0,
    });
    let mut session = RenderSession::new(&project, &library, cfg, CancelToken::new()).unwrap();
    assert!(matches!(session.run(), Err(RenderError::Master(_))));
    assert_eq!(session.live_nodes(), 0);
}
