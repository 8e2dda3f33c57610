//! Render orchestration.
//!
//! A [`RenderSession`] owns one render of one project. It resolves the
//! duration, builds the clip/track/master layer tree, schedules every
//! voice onto explicit event lists and finally mixes the tree into a
//! single stereo buffer. Sessions are single-use:
//!
//! ```text
//! Idle → ResolvingDuration → BuildingGraph → SchedulingVoices → Mixing → Complete
//! ```

pub mod fetch;

pub use fetch::{MemoryFetcher, SampleFetcher, SampleLibrary, prefetch_samples, render_project};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::RenderConfig;
use crate::dsp::buffer::{Bus, StereoBuffer};
use crate::dsp::noise::NoiseBuffer;
use crate::dsp::sampler::{SampleBuffer, SampleVoice};
use crate::error::RenderError;
use crate::graph::{Chain, GraphContext, Layer, LayerLevel, LayerSpec, NodeSpec, build_chain, build_layer};
use crate::project::{AudioRegion, MidiRegion, Project, Region, Track, TrackKind};
use crate::synth::{ActiveVoice, DrumEngine, MelodicEngine, NoteTiming, VoiceQueue};
use crate::transport::seconds_to_samples;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderState {
    Idle,
    ResolvingDuration,
    BuildingGraph,
    SchedulingVoices,
    Mixing,
    Complete,
}

impl RenderState {
    /// The only state reachable from this one.
    pub fn next(self) -> Option<RenderState> {
        match self {
            RenderState::Idle => Some(RenderState::ResolvingDuration),
            RenderState::ResolvingDuration => Some(RenderState::BuildingGraph),
            RenderState::BuildingGraph => Some(RenderState::SchedulingVoices),
            RenderState::SchedulingVoices => Some(RenderState::Mixing),
            RenderState::Mixing => Some(RenderState::Complete),
            RenderState::Complete => None,
        }
    }
}

/// Cooperative cancellation flag, checked between tracks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<(), RenderError> {
        if self.is_cancelled() {
            Err(RenderError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The mixed result of a render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub sample_rate: u32,
    pub buffer: StereoBuffer,
    /// Rendered length in seconds, tail included.
    pub duration: f64,
}

impl RenderOutput {
    pub fn frames(&self) -> usize {
        self.buffer.len()
    }
}

/// Node list for a track's own chain: inserts, then volume, pan and, only
/// when the send is above zero, the reverb mix.
pub fn track_chain_specs(track: &Track) -> Vec<NodeSpec> {
    let mut specs = track.effects.clone();
    specs.push(NodeSpec::gain(track.volume / 100.0));
    specs.push(NodeSpec::pan(track.pan / 100.0));
    if track.reverb > 0.0 {
        specs.push(NodeSpec::reverb(track.reverb));
    }
    specs
}

pub fn build_track_chain(track: &Track, ctx: &GraphContext) -> Result<Chain, RenderError> {
    build_chain(&track_chain_specs(track), ctx).map_err(|source| RenderError::Graph {
        track: track.index,
        source,
    })
}

/// Clip chain for an audio region lasting `length` seconds, of which the
/// first `lead_in` seconds fall before the render start: fades, then gain.
fn audio_clip_specs(region: &AudioRegion, length: f64, lead_in: f64) -> Vec<NodeSpec> {
    let mut specs = Vec::with_capacity(3);
    if region.fade_in > lead_in {
        specs.push(NodeSpec::FadeIn {
            duration: region.fade_in,
            offset: lead_in,
        });
    }
    if region.fade_out > 0.0 {
        specs.push(NodeSpec::FadeOut {
            start: (length - region.fade_out).max(0.0),
            duration: region.fade_out,
            offset: lead_in,
        });
    }
    specs.push(NodeSpec::gain(region.gain));
    specs
}

/// Where a region lands in the render.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RegionSpan {
    /// First and one-past-last frame, clipped to the render.
    start: usize,
    end: usize,
    /// Unclipped region length in seconds.
    length: f64,
    /// Seconds of the region cut off before the render start.
    lead_in: f64,
}

/// `None` when nothing of the region is inside the render.
fn region_span(project: &Project, region: &Region, sample_rate: u32, total: usize) -> Option<RegionSpan> {
    let (from, to) = (project.time_at(region.start()), project.time_at(region.end()));
    let start = seconds_to_samples(from, sample_rate);
    let end = seconds_to_samples(to, sample_rate).min(total);
    (start < end).then_some(RegionSpan {
        start,
        end,
        length: to - from,
        lead_in: (-from).max(0.0),
    })
}

/// What a clip plays once its layer is built.
#[derive(Debug)]
enum ClipSource<'p> {
    Audio(&'p AudioRegion, Arc<SampleBuffer>),
    Midi(&'p MidiRegion),
}

#[derive(Debug)]
struct ClipPlan<'p> {
    source: ClipSource<'p>,
    start: usize,
    end: usize,
    lead_in: f64,
}

/// One render of one project.
pub struct RenderSession<'a> {
    project: &'a Project,
    samples: &'a SampleLibrary,
    config: RenderConfig,
    cancel: CancelToken,
    ctx: GraphContext,
    state: RenderState,
}

impl<'a> RenderSession<'a> {
    pub fn new(
        project: &'a Project,
        samples: &'a SampleLibrary,
        config: RenderConfig,
        cancel: CancelToken,
    ) -> Result<Self, RenderError> {
        config.validate()?;
        let ctx = GraphContext::new(
            config.sample_rate as f64,
            config.noise_seed,
            config.impulse_cache,
        );
        Ok(RenderSession {
            project,
            samples,
            config,
            cancel,
            ctx,
            state: RenderState::Idle,
        })
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Graph nodes built by this session and not yet torn down.
    pub fn live_nodes(&self) -> usize {
        self.ctx.live_nodes()
    }

    fn advance(&mut self, to: RenderState) -> Result<(), RenderError> {
        if self.state.next() != Some(to) {
            return Err(RenderError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        trace!(from = ?self.state, ?to, "render state");
        self.state = to;
        Ok(())
    }

    /// Run the render to completion. Every node built along the way is
    /// torn down before this returns, whatever the outcome.
    #[instrument(skip_all, fields(tracks = self.project.tracks.len(), sample_rate = self.config.sample_rate))]
    pub fn run(&mut self) -> Result<RenderOutput, RenderError> {
        self.advance(RenderState::ResolvingDuration)?;
        let sample_rate = self.config.sample_rate;
        let duration = self.project.duration_seconds() + self.config.tail_seconds.max(0.0);
        let total = seconds_to_samples(duration, sample_rate);
        info!(duration, frames = total, "render started");

        self.advance(RenderState::BuildingGraph)?;
        let project = self.project;
        let tracks: Vec<&'a Track> = project.audible_tracks().collect();
        let mut master = {
            let mut specs = self.config.master_effects.clone();
            specs.push(NodeSpec::gain(self.config.master_volume));
            build_layer(&LayerSpec::new(LayerLevel::Master, specs, 0, total), &self.ctx)
                .map_err(RenderError::Master)?
        };
        let mut plans: Vec<Vec<ClipPlan<'a>>> = Vec::with_capacity(tracks.len());
        for &track in &tracks {
            self.cancel.check()?;
            let (layer, clips) = self.build_track(track, total)?;
            master.children.push(layer);
            plans.push(clips);
        }
        debug!(nodes = master.node_count(), "graph built");

        self.advance(RenderState::SchedulingVoices)?;
        let noise = NoiseBuffer::new(
            seconds_to_samples(self.config.noise_buffer_seconds, sample_rate).max(1),
            self.config.noise_seed,
        );
        let drums = DrumEngine::new(noise, sample_rate as f64);
        let mut queues: Vec<Vec<VoiceQueue>> = Vec::with_capacity(tracks.len());
        for ((&track, layer), clips) in tracks.iter().zip(master.children_mut()).zip(&plans) {
            self.cancel.check()?;
            queues.push(self.schedule_track(track, layer, clips, &drums, total));
        }

        self.advance(RenderState::Mixing)?;
        let cancel = &self.cancel;
        if self.config.parallel_tracks {
            master
                .children
                .par_iter_mut()
                .zip(queues.par_iter_mut())
                .try_for_each(|(layer, queues)| {
                    cancel.check()?;
                    mix_track(layer, queues);
                    Ok::<(), RenderError>(())
                })?;
        } else {
            for (layer, queues) in master.children.iter_mut().zip(queues.iter_mut()) {
                cancel.check()?;
                mix_track(layer, queues);
            }
        }
        // Track buses are summed in track order.
        master.mix_and_run();
        let buffer = std::mem::take(&mut master.bus.buffer);
        master.teardown();

        self.advance(RenderState::Complete)?;
        info!(frames = buffer.len(), peak = buffer.peak(), "render complete");
        Ok(RenderOutput {
            sample_rate,
            buffer,
            duration,
        })
    }

    /// Build a track layer with one clip child per playable region.
    fn build_track(&self, track: &'a Track, total: usize) -> Result<(Layer, Vec<ClipPlan<'a>>), RenderError> {
        let sample_rate = self.config.sample_rate;
        let mut spec = LayerSpec::new(LayerLevel::Track, track_chain_specs(track), 0, total);
        let mut clips = Vec::new();

        for region in &track.regions {
            let Some(span) = region_span(self.project, region, sample_rate, total) else {
                trace!(track = track.index, "region outside render; skipped");
                continue;
            };
            let (source, effects) = match region {
                Region::Audio(audio) => {
                    let Some(sample) = self.samples.get(&audio.file_id) else {
                        warn!(track = track.index, file_id = %audio.file_id, "sample unavailable; skipping region");
                        continue;
                    };
                    let effects = audio_clip_specs(audio, span.length, span.lead_in);
                    (ClipSource::Audio(audio, sample), effects)
                }
                Region::Midi(midi) => {
                    if !matches!(track.kind, TrackKind::Instrument | TrackKind::Drums) {
                        warn!(track = track.index, kind = ?track.kind, "MIDI region on a non-MIDI track; skipping");
                        continue;
                    }
                    (ClipSource::Midi(midi), Vec::new())
                }
            };
            spec.children.push(LayerSpec::new(
                LayerLevel::Clip,
                effects,
                span.start,
                span.end - span.start,
            ));
            clips.push(ClipPlan {
                source,
                start: span.start,
                end: span.end,
                lead_in: span.lead_in,
            });
        }
        let layer = build_layer(&spec, &self.ctx).map_err(|source| RenderError::Graph {
            track: track.index,
            source,
        })?;
        debug!(track = track.index, clips = clips.len(), stages = layer.chain.len(), "track built");
        Ok((layer, clips))
    }

    /// Queue the voices of every clip on `track` and size each clip bus to
    /// hold its release tails.
    fn schedule_track(
        &self,
        track: &Track,
        layer: &mut Layer,
        clips: &[ClipPlan<'_>],
        drums: &DrumEngine,
        total: usize,
    ) -> Vec<VoiceQueue> {
        let sample_rate = self.config.sample_rate;
        let melodic = MelodicEngine::new(track.synth.clone(), sample_rate as f64);
        let mut queues = Vec::with_capacity(clips.len());

        for (clip, plan) in layer.children_mut().iter_mut().zip(clips) {
            let mut queue = VoiceQueue::new(plan.start, plan.end - plan.start, sample_rate as f64);
            match &plan.source {
                ClipSource::Audio(audio, sample) => {
                    let voice = SampleVoice::new(
                        Arc::clone(sample),
                        audio.trim_start.max(0.0) + plan.lead_in,
                        plan.end - plan.start,
                        sample_rate as f64,
                    );
                    queue.push(ActiveVoice::Sample(voice), NoteTiming::new(plan.start, plan.end));
                }
                ClipSource::Midi(midi) => {
                    for note in &midi.notes {
                        let on_beat = midi.start + note.start;
                        let on = seconds_to_samples(self.project.time_at(on_beat), sample_rate)
                            .max(plan.start);
                        let off = seconds_to_samples(
                            self.project.time_at(on_beat + note.duration),
                            sample_rate,
                        )
                        .min(plan.end);
                        if on >= off {
                            trace!(pitch = note.pitch, "note has no audible span; skipped");
                            continue;
                        }
                        let timing = NoteTiming::new(on, off);
                        match track.kind {
                            TrackKind::Drums => drums.trigger(&mut queue, note, timing),
                            _ => melodic.trigger(&mut queue, note, timing),
                        };
                    }
                }
            }
            let end = queue.latest_end().max(plan.end).min(total);
            clip.bus = Bus::new(plan.start, end - plan.start);
            queues.push(queue);
        }
        debug!(track = track.index, voices = queues.iter().map(VoiceQueue::len).sum::<usize>(), "voices scheduled");
        queues
    }
}

/// Render a track's voices into its clips, then mix the track.
fn mix_track(layer: &mut Layer, queues: &mut [VoiceQueue]) {
    for (clip, queue) in layer.children_mut().iter_mut().zip(queues.iter_mut()) {
        queue.render_into(&mut clip.bus);
    }
    layer.process();
}

/// Render `project` in one call.
pub fn render(
    project: &Project,
    samples: &SampleLibrary,
    config: RenderConfig,
    cancel: CancelToken,
) -> Result<RenderOutput, RenderError> {
    RenderSession::new(project, samples, config, cancel)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{MidiNote, TimeSignature};

    fn config() -> RenderConfig {
        RenderConfig {
            sample_rate: 8000,
            ..RenderConfig::default()
        }
    }

    fn one_note_project(kind: TrackKind, pitch: u8) -> Project {
        let mut project = Project::new(120.0, TimeSignature::default());
        let mut track = Track::new(0, kind);
        track.regions.push(Region::Midi(MidiRegion {
            start: 0.0,
            length: 0.25,
            notes: vec![MidiNote {
                pitch,
                start: 0.0,
                duration: 0.125,
                velocity: 100,
            }],
        }));
        project.tracks.push(track);
        project
    }

    fn clip_project(region_length: f64, note_start: f64, note_duration: f64) -> Project {
        let mut project = one_note_project(TrackKind::Instrument, 60);
        let Region::Midi(region) = &mut project.tracks[0].regions[0] else {
            unreachable!()
        };
        region.length = region_length;
        region.notes[0].start = note_start;
        region.notes[0].duration = note_duration;
        project
    }

    #[test]
    fn note_past_region_end_is_cut_at_the_boundary() {
        let library = SampleLibrary::new();
        let overlong = render(&clip_project(0.125, 0.0, 1.0), &library, config(), CancelToken::new()).unwrap();
        let fitted = render(&clip_project(0.125, 0.0, 0.125), &library, config(), CancelToken::new()).unwrap();
        assert_eq!(overlong.frames(), 2000);
        assert!(overlong.buffer.peak() > 0.0);
        assert_eq!(overlong, fitted);
    }

    #[test]
    fn note_starting_after_region_end_is_skipped() {
        let project = clip_project(0.125, 0.25, 0.125);
        let library = SampleLibrary::new();
        let mut session = RenderSession::new(&project, &library, config(), CancelToken::new()).unwrap();
        let out = session.run().unwrap();
        assert_eq!(out.frames(), 2000);
        assert_eq!(out.buffer.peak(), 0.0);
        assert_eq!(session.live_nodes(), 0);
    }

    #[test]
    fn region_before_zero_keeps_its_lead_in() {
        let project = Project::new(120.0, TimeSignature::default());
        let region = Region::Midi(MidiRegion {
            start: -0.125,
            length: 0.25,
            notes: Vec::new(),
        });
        let span = region_span(&project, &region, 8000, 8000).unwrap();
        assert_eq!((span.start, span.end), (0, 2000));
        assert!((span.lead_in - 0.25).abs() < 1e-12);
        assert!((span.length - 0.5).abs() < 1e-12);

        let early = Region::Midi(MidiRegion {
            start: -1.0,
            length: 0.5,
            notes: Vec::new(),
        });
        assert_eq!(region_span(&project, &early, 8000, 8000), None);
    }

    #[test]
    fn clipped_fade_in_resumes_part_way() {
        let region = AudioRegion {
            file_id: "a.wav".into(),
            start: -0.125,
            length: 0.25,
            trim_start: 0.0,
            gain: 1.0,
            fade_in: 0.5,
            fade_out: 0.0,
        };
        let specs = audio_clip_specs(&region, 0.5, 0.25);
        assert_eq!(
            specs[0],
            NodeSpec::FadeIn {
                duration: 0.5,
                offset: 0.25
            }
        );
        let short = AudioRegion {
            fade_in: 0.2,
            ..region
        };
        assert_eq!(audio_clip_specs(&short, 0.5, 0.25), vec![NodeSpec::gain(1.0)]);
    }

    #[test]
    fn state_machine_walks_forward_only() {
        let mut state = RenderState::Idle;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            seen.push(next);
            state = next;
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(state, RenderState::Complete);
    }

    #[test]
    fn session_is_single_use() {
        let project = one_note_project(TrackKind::Instrument, 60);
        let library = SampleLibrary::new();
        let mut session = RenderSession::new(&project, &library, config(), CancelToken::new()).unwrap();
        assert_eq!(session.state(), RenderState::Idle);
        let out = session.run().unwrap();
        assert_eq!(session.state(), RenderState::Complete);
        assert_eq!(out.frames(), 4000);
        assert!(matches!(
            session.run(),
            Err(RenderError::InvalidTransition {
                from: RenderState::Complete,
                ..
            })
        ));
        assert_eq!(session.live_nodes(), 0);
    }

    #[test]
    fn track_chain_includes_reverb_only_when_sent() {
        let ctx = GraphContext::new(8000.0, 1, Default::default());
        let mut track = Track::new(3, TrackKind::Instrument);
        assert!(!build_track_chain(&track, &ctx).unwrap().has_reverb());
        track.reverb = 50.0;
        assert!(build_track_chain(&track, &ctx).unwrap().has_reverb());
        assert_eq!(ctx.live_nodes(), 0);
    }

    #[test]
    fn bad_track_effect_is_fatal_and_cleaned_up() {
        let mut project = one_note_project(TrackKind::Instrument, 60);
        project.tracks.push(Track::new(1, TrackKind::Instrument));
        project.tracks[1].effects.push(NodeSpec::Delay(crate::graph::node::DelayParams {
            time: -1.0,
            ..Default::default()
        }));
        let library = SampleLibrary::new();
        let mut session = RenderSession::new(&project, &library, config(), CancelToken::new()).unwrap();
        let err = session.run().unwrap_err();
        assert!(matches!(err, RenderError::Graph { track: 1, .. }));
        assert_eq!(session.live_nodes(), 0);
    }

    #[test]
    fn midi_on_audio_track_is_skipped() {
        let project = one_note_project(TrackKind::Audio, 60);
        let out = render(&project, &SampleLibrary::new(), config(), CancelToken::new()).unwrap();
        assert_eq!(out.frames(), 4000);
        assert_eq!(out.buffer.peak(), 0.0);
    }

    #[test]
    fn cancelled_before_start() {
        let project = one_note_project(TrackKind::Drums, 36);
        let cancel = CancelToken::new();
        cancel.cancel();
        let library = SampleLibrary::new();
        let mut session = RenderSession::new(&project, &library, config(), cancel).unwrap();
        assert!(matches!(session.run(), Err(RenderError::Cancelled)));
        assert_eq!(session.live_nodes(), 0);
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let mut project = one_note_project(TrackKind::Drums, 38);
        let mut second = one_note_project(TrackKind::Instrument, 64).tracks.remove(0);
        second.index = 1;
        second.pan = -40.0;
        project.tracks.push(second);
        let library = SampleLibrary::new();
        let parallel = render(&project, &library, config(), CancelToken::new()).unwrap();
        let sequential = render(
            &project,
            &library,
            RenderConfig {
                parallel_tracks: false,
                ..config()
            },
            CancelToken::new(),
        )
        .unwrap();
        assert_eq!(parallel, sequential);
        assert!(parallel.buffer.peak() > 0.0);
    }
}
