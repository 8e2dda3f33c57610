//! Realized node chains.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, instrument, trace};

use crate::dsp::buffer::StereoBuffer;
use crate::dsp::db_to_linear;
use crate::dsp::filter::FilterType;
use crate::error::GraphError;

use super::GraphContext;
use super::effects::delay::MAX_DELAY_SECONDS;
use super::effects::phaser::MAX_STAGES;
use super::effects::{
    CurveKind, Delay, Dynamics, Fade, Flanger, Gain, Pan, Phaser, ReverbMix, StereoBiquad,
    Waveshaper, eq_bands, make_curve,
};
use super::node::{NodeKind, NodeSpec, ShaperParams};

/// A processing stage inside a [`Chain`].
#[derive(Debug, Clone)]
pub enum Node {
    Gain(Gain),
    Pan(Pan),
    Fade(Fade),
    Reverb(ReverbMix),
    Biquad(StereoBiquad),
    Dynamics(Dynamics),
    Delay(Delay),
    Flanger(Flanger),
    Phaser(Phaser),
    Waveshaper(Waveshaper),
    /// A node type with no processing; kept so the chain shape matches
    /// its description.
    Passthrough(NodeKind),
}

impl Node {
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        match self {
            Node::Gain(n) => n.process(buffer),
            Node::Pan(n) => n.process(buffer),
            Node::Fade(n) => n.process(buffer),
            Node::Reverb(n) => n.process(buffer),
            Node::Biquad(n) => n.process(buffer),
            Node::Dynamics(n) => n.process(buffer),
            Node::Delay(n) => n.process(buffer),
            Node::Flanger(n) => n.process(buffer),
            Node::Phaser(n) => n.process(buffer),
            Node::Waveshaper(n) => n.process(buffer),
            Node::Passthrough(_) => {}
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Node::Gain(_) => "gain",
            Node::Pan(_) => "pan",
            Node::Fade(_) => "fade",
            Node::Reverb(_) => "reverb",
            Node::Biquad(_) => "biquad",
            Node::Dynamics(_) => "dynamics",
            Node::Delay(_) => "delay",
            Node::Flanger(_) => "flanger",
            Node::Phaser(_) => "phaser",
            Node::Waveshaper(_) => "waveshaper",
            Node::Passthrough(kind) => kind.tag(),
        }
    }
}

/// Position of a node within its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// A linear run of nodes with one input and one output.
///
/// Every node counts against the owning [`GraphContext`] until the chain
/// is torn down, explicitly or on drop. Teardown happens exactly once.
#[derive(Debug)]
pub struct Chain {
    nodes: Vec<Node>,
    live: Arc<AtomicUsize>,
    torn_down: bool,
}

impl Chain {
    fn new(live: Arc<AtomicUsize>) -> Self {
        Chain {
            nodes: Vec::new(),
            live,
            torn_down: false,
        }
    }

    fn push(&mut self, node: Node) {
        self.live.fetch_add(1, Ordering::AcqRel);
        self.nodes.push(node);
    }

    pub fn input(&self) -> NodeId {
        NodeId(0)
    }

    pub fn output(&self) -> NodeId {
        NodeId(self.nodes.len().saturating_sub(1))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The first reverb stage, if any.
    pub fn reverb_mut(&mut self) -> Option<&mut ReverbMix> {
        self.nodes.iter_mut().find_map(|n| match n {
            Node::Reverb(r) => Some(r),
            _ => None,
        })
    }

    pub fn has_reverb(&self) -> bool {
        self.nodes.iter().any(|n| matches!(n, Node::Reverb(_)))
    }

    /// Run `buffer` through every node from input to output.
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for node in &mut self.nodes {
            node.process(buffer);
        }
    }

    /// Disconnect and release every node.
    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let count = self.nodes.len();
        self.nodes.clear();
        self.live.fetch_sub(count, Ordering::AcqRel);
        trace!(nodes = count, "chain torn down");
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        self.release();
    }
}

/// Realize a node list. An empty list gives a single unity gain so there
/// is always something to connect to. Any bad node fails the whole build,
/// and nodes realized before the failure are torn down.
#[instrument(level = "debug", skip_all, fields(nodes = specs.len()))]
pub fn build_chain(specs: &[NodeSpec], ctx: &GraphContext) -> Result<Chain, GraphError> {
    let mut chain = Chain::new(ctx.live_counter());
    if specs.is_empty() {
        chain.push(Node::Gain(Gain::new(1.0)));
        return Ok(chain);
    }
    for spec in specs {
        realize(spec, ctx, &mut chain)?;
    }
    debug!(stages = chain.len(), "chain built");
    Ok(chain)
}

fn invalid(kind: NodeKind, reason: impl Into<String>) -> GraphError {
    GraphError::InvalidParameter {
        node: kind.tag(),
        reason: reason.into(),
    }
}

fn finite(kind: NodeKind, name: &str, value: f64) -> Result<f64, GraphError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(kind, format!("{name} must be finite, got {value}")))
    }
}

fn all_finite(kind: NodeKind, params: &[(&str, f32)]) -> Result<(), GraphError> {
    for &(name, value) in params {
        finite(kind, name, value as f64)?;
    }
    Ok(())
}

fn seconds_to_frames(kind: NodeKind, name: &str, seconds: f64, sample_rate: f64) -> Result<usize, GraphError> {
    let seconds = finite(kind, name, seconds)?;
    if seconds < 0.0 {
        return Err(invalid(kind, format!("{name} must not be negative, got {seconds}")));
    }
    Ok((seconds * sample_rate).round() as usize)
}

fn realize(spec: &NodeSpec, ctx: &GraphContext, chain: &mut Chain) -> Result<(), GraphError> {
    let sr = ctx.sample_rate();
    let kind = spec.kind();
    if !(sr > 0.0) {
        return Err(invalid(kind, format!("sample rate must be > 0, got {sr}")));
    }

    match spec {
        NodeSpec::Gain { value } => {
            finite(kind, "value", *value as f64)?;
            chain.push(Node::Gain(Gain::new(*value)));
        }
        NodeSpec::Pan { value } => {
            finite(kind, "value", *value as f64)?;
            chain.push(Node::Pan(Pan::new(*value)));
        }
        NodeSpec::Reverb { amount } => {
            finite(kind, "amount", *amount as f64)?;
            chain.push(Node::Reverb(ReverbMix::new(
                *amount,
                sr,
                ctx.impulses().clone(),
            )));
        }
        NodeSpec::FadeIn { duration, offset } => {
            let frames = seconds_to_frames(kind, "duration", *duration, sr)?;
            let offset = seconds_to_frames(kind, "offset", *offset, sr)?;
            chain.push(Node::Fade(Fade::In { frames, offset }));
        }
        NodeSpec::FadeOut {
            start,
            duration,
            offset,
        } => {
            let start = seconds_to_frames(kind, "start", *start, sr)?;
            let frames = seconds_to_frames(kind, "duration", *duration, sr)?;
            let offset = seconds_to_frames(kind, "offset", *offset, sr)?;
            chain.push(Node::Fade(Fade::Out { start, frames, offset }));
        }
        NodeSpec::Eq(params) => {
            for (name, band) in [
                ("low", &params.low),
                ("lowMid", &params.low_mid),
                ("mid", &params.mid),
                ("highMid", &params.high_mid),
                ("high", &params.high),
            ] {
                all_finite(kind, &[(name, band.frequency), (name, band.gain), (name, band.q)])?;
                if band.frequency <= 0.0 {
                    return Err(invalid(
                        kind,
                        format!("{name} frequency must be > 0 Hz, got {}", band.frequency),
                    ));
                }
            }
            for band in eq_bands(params, sr) {
                chain.push(Node::Biquad(band));
            }
        }
        NodeSpec::Compressor(p) => {
            all_finite(
                kind,
                &[
                    ("threshold", p.threshold),
                    ("knee", p.knee),
                    ("ratio", p.ratio),
                    ("attack", p.attack),
                    ("release", p.release),
                    ("makeupGain", p.makeup_gain),
                ],
            )?;
            chain.push(Node::Dynamics(Dynamics::new(
                sr,
                p.threshold as f64,
                p.knee as f64,
                p.ratio as f64,
                p.attack as f64,
                p.release as f64,
            )));
            chain.push(Node::Gain(Gain::new(db_to_linear(p.makeup_gain as f64) as f32)));
        }
        NodeSpec::Limiter { threshold } => {
            finite(kind, "threshold", *threshold as f64)?;
            chain.push(Node::Dynamics(Dynamics::limiter(sr, *threshold as f64)));
        }
        NodeSpec::Gate { .. } | NodeSpec::Bitcrush { .. } => {
            chain.push(Node::Passthrough(kind));
        }
        NodeSpec::Delay(p) => {
            all_finite(
                kind,
                &[
                    ("feedback", p.feedback),
                    ("mix", p.mix),
                    ("filterFrequency", p.filter_frequency),
                ],
            )?;
            let time = finite(kind, "time", p.time as f64)?;
            if !(0.0..=MAX_DELAY_SECONDS).contains(&time) {
                return Err(invalid(
                    kind,
                    format!("time must be within 0..={MAX_DELAY_SECONDS} s, got {time}"),
                ));
            }
            chain.push(Node::Delay(Delay::new(
                sr,
                time,
                p.feedback as f64,
                p.mix as f64,
                p.filter_frequency as f64,
            )));
        }
        NodeSpec::Flanger(p) => {
            all_finite(
                kind,
                &[
                    ("rate", p.rate),
                    ("depth", p.depth),
                    ("delay", p.delay),
                    ("feedback", p.feedback),
                    ("mix", p.mix),
                ],
            )?;
            chain.push(Node::Flanger(Flanger::new(
                sr,
                p.rate as f64,
                p.depth as f64,
                p.delay as f64,
                p.feedback as f64,
                p.mix as f64,
            )));
        }
        NodeSpec::Phaser(p) => {
            all_finite(
                kind,
                &[
                    ("rate", p.rate),
                    ("depth", p.depth),
                    ("frequency", p.frequency),
                    ("feedback", p.feedback),
                    ("q", p.q),
                    ("mix", p.mix),
                ],
            )?;
            if p.stages == 0 || p.stages > MAX_STAGES {
                return Err(invalid(
                    kind,
                    format!("stages must be within 1..={MAX_STAGES}, got {}", p.stages),
                ));
            }
            chain.push(Node::Phaser(Phaser::new(sr, p)));
        }
        NodeSpec::Distortion(p) => shaper(CurveKind::Distortion, kind, p, sr, chain)?,
        NodeSpec::Overdrive(p) => shaper(CurveKind::Overdrive, kind, p, sr, chain)?,
        NodeSpec::Fuzz(p) => shaper(CurveKind::Fuzz, kind, p, sr, chain)?,
        NodeSpec::SoftClip(p) => shaper(CurveKind::SoftClip, kind, p, sr, chain)?,
        NodeSpec::HardClip(p) => shaper(CurveKind::HardClip, kind, p, sr, chain)?,
        NodeSpec::Saturation(p) => shaper(CurveKind::Saturation, kind, p, sr, chain)?,
    }
    Ok(())
}

/// Waveshaper, tone low-pass, output gain.
fn shaper(
    curve: CurveKind,
    kind: NodeKind,
    params: &ShaperParams,
    sample_rate: f64,
    chain: &mut Chain,
) -> Result<(), GraphError> {
    all_finite(
        kind,
        &[
            ("amount", params.amount),
            ("threshold", params.threshold),
            ("output", params.output),
            ("blend", params.blend),
        ],
    )?;
    let tone = finite(kind, "tone", params.tone as f64)?;
    if tone <= 0.0 {
        return Err(invalid(kind, format!("tone must be > 0 Hz, got {tone}")));
    }
    chain.push(Node::Waveshaper(Waveshaper::new(make_curve(curve, params))));
    chain.push(Node::Biquad(StereoBiquad::new(
        FilterType::Lowpass,
        sample_rate,
        tone,
        0.707,
        0.0,
    )));
    chain.push(Node::Gain(Gain::new(params.output)));
    Ok(())
}
