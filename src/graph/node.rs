//! Declarative node descriptions.
//!
//! A [`NodeSpec`] is what callers write (or deserialize); the chain builder
//! turns each one into one or more realized processing stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Every node type the builder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Gain,
    Pan,
    Reverb,
    FadeIn,
    FadeOut,
    Eq,
    Compressor,
    Limiter,
    Gate,
    Delay,
    Flanger,
    Phaser,
    Distortion,
    Overdrive,
    Fuzz,
    SoftClip,
    HardClip,
    Saturation,
    Bitcrush,
}

impl NodeKind {
    pub const ALL: [NodeKind; 19] = [
        NodeKind::Gain,
        NodeKind::Pan,
        NodeKind::Reverb,
        NodeKind::FadeIn,
        NodeKind::FadeOut,
        NodeKind::Eq,
        NodeKind::Compressor,
        NodeKind::Limiter,
        NodeKind::Gate,
        NodeKind::Delay,
        NodeKind::Flanger,
        NodeKind::Phaser,
        NodeKind::Distortion,
        NodeKind::Overdrive,
        NodeKind::Fuzz,
        NodeKind::SoftClip,
        NodeKind::HardClip,
        NodeKind::Saturation,
        NodeKind::Bitcrush,
    ];

    /// The `"type"` tag used in serialized node lists.
    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::Gain => "gain",
            NodeKind::Pan => "pan",
            NodeKind::Reverb => "reverb",
            NodeKind::FadeIn => "fadeIn",
            NodeKind::FadeOut => "fadeOut",
            NodeKind::Eq => "eq",
            NodeKind::Compressor => "compressor",
            NodeKind::Limiter => "limiter",
            NodeKind::Gate => "gate",
            NodeKind::Delay => "delay",
            NodeKind::Flanger => "flanger",
            NodeKind::Phaser => "phaser",
            NodeKind::Distortion => "distortion",
            NodeKind::Overdrive => "overdrive",
            NodeKind::Fuzz => "fuzz",
            NodeKind::SoftClip => "softClip",
            NodeKind::HardClip => "hardClip",
            NodeKind::Saturation => "saturation",
            NodeKind::Bitcrush => "bitcrush",
        }
    }

    pub fn is_waveshaper(self) -> bool {
        matches!(
            self,
            NodeKind::Distortion
                | NodeKind::Overdrive
                | NodeKind::Fuzz
                | NodeKind::SoftClip
                | NodeKind::HardClip
                | NodeKind::Saturation
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for NodeKind {
    type Err = GraphError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|k| k.tag() == tag)
            .ok_or_else(|| GraphError::UnknownNodeType {
                tag: tag.to_string(),
            })
    }
}

// ── Node descriptions ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeSpec {
    /// Linear gain.
    Gain {
        #[serde(default = "one")]
        value: f32,
    },
    /// Stereo position, -1 (left) to 1 (right).
    Pan {
        #[serde(default)]
        value: f32,
    },
    /// Procedural convolution reverb, amount 0–100.
    Reverb { amount: f32 },
    /// Linear ramp from silence over `duration` seconds. `offset` seconds
    /// of the ramp have already elapsed when the stage starts.
    FadeIn {
        duration: f64,
        #[serde(default)]
        offset: f64,
    },
    /// Linear ramp to silence starting at `start` seconds, over `duration`.
    FadeOut {
        start: f64,
        duration: f64,
        #[serde(default)]
        offset: f64,
    },
    Eq(EqParams),
    Compressor(CompressorParams),
    Limiter {
        #[serde(default = "limiter_threshold")]
        threshold: f32,
    },
    /// Not implemented; realized as an explicit passthrough.
    Gate {
        #[serde(default)]
        threshold: f32,
    },
    Delay(DelayParams),
    Flanger(FlangerParams),
    Phaser(PhaserParams),
    Distortion(ShaperParams),
    Overdrive(ShaperParams),
    Fuzz(ShaperParams),
    SoftClip(ShaperParams),
    HardClip(ShaperParams),
    Saturation(ShaperParams),
    /// Not implemented; realized as an explicit passthrough.
    Bitcrush {
        #[serde(default = "bitcrush_bits")]
        bits: u32,
    },
}

fn one() -> f32 {
    1.0
}

fn limiter_threshold() -> f32 {
    -1.0
}

fn bitcrush_bits() -> u32 {
    8
}

impl NodeSpec {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeSpec::Gain { .. } => NodeKind::Gain,
            NodeSpec::Pan { .. } => NodeKind::Pan,
            NodeSpec::Reverb { .. } => NodeKind::Reverb,
            NodeSpec::FadeIn { .. } => NodeKind::FadeIn,
            NodeSpec::FadeOut { .. } => NodeKind::FadeOut,
            NodeSpec::Eq(_) => NodeKind::Eq,
            NodeSpec::Compressor(_) => NodeKind::Compressor,
            NodeSpec::Limiter { .. } => NodeKind::Limiter,
            NodeSpec::Gate { .. } => NodeKind::Gate,
            NodeSpec::Delay(_) => NodeKind::Delay,
            NodeSpec::Flanger(_) => NodeKind::Flanger,
            NodeSpec::Phaser(_) => NodeKind::Phaser,
            NodeSpec::Distortion(_) => NodeKind::Distortion,
            NodeSpec::Overdrive(_) => NodeKind::Overdrive,
            NodeSpec::Fuzz(_) => NodeKind::Fuzz,
            NodeSpec::SoftClip(_) => NodeKind::SoftClip,
            NodeSpec::HardClip(_) => NodeKind::HardClip,
            NodeSpec::Saturation(_) => NodeKind::Saturation,
            NodeSpec::Bitcrush { .. } => NodeKind::Bitcrush,
        }
    }

    /// Parse one node description, distinguishing an unknown `"type"` from
    /// a known type with malformed parameters.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, GraphError> {
        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| GraphError::InvalidNode {
                tag: String::new(),
                reason: "missing \"type\" field".into(),
            })?;
        let kind: NodeKind = tag.parse()?;
        serde_json::from_value(value.clone()).map_err(|e| GraphError::InvalidNode {
            tag: kind.tag().to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse a JSON array of node descriptions. Any bad entry rejects the
    /// whole list.
    pub fn list_from_json(source: &str) -> Result<Vec<Self>, GraphError> {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(source).map_err(|e| GraphError::InvalidNode {
                tag: String::new(),
                reason: e.to_string(),
            })?;
        values.iter().map(NodeSpec::from_json).collect()
    }

    pub fn gain(value: f32) -> Self {
        NodeSpec::Gain { value }
    }

    pub fn pan(value: f32) -> Self {
        NodeSpec::Pan { value }
    }

    pub fn reverb(amount: f32) -> Self {
        NodeSpec::Reverb { amount }
    }
}

// ── Parameters ──────────────────────────────────────────────

/// One EQ band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    pub frequency: f32,
    #[serde(default)]
    pub gain: f32,
    #[serde(default = "default_q")]
    pub q: f32,
}

fn default_q() -> f32 {
    0.707
}

/// Fixed five-band EQ: low shelf, three peaking bands, high shelf.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EqParams {
    pub low: EqBand,
    pub low_mid: EqBand,
    pub mid: EqBand,
    pub high_mid: EqBand,
    pub high: EqBand,
}

impl Default for EqParams {
    fn default() -> Self {
        let band = |frequency| EqBand {
            frequency,
            gain: 0.0,
            q: 0.707,
        };
        EqParams {
            low: band(100.0),
            low_mid: EqBand { q: 1.0, ..band(400.0) },
            mid: EqBand { q: 1.0, ..band(1000.0) },
            high_mid: EqBand { q: 1.0, ..band(3000.0) },
            high: band(8000.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressorParams {
    /// dB
    pub threshold: f32,
    /// dB
    pub knee: f32,
    pub ratio: f32,
    /// seconds
    pub attack: f32,
    /// seconds
    pub release: f32,
    /// dB
    pub makeup_gain: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        CompressorParams {
            threshold: -24.0,
            knee: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
            makeup_gain: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelayParams {
    /// seconds
    pub time: f32,
    pub feedback: f32,
    pub mix: f32,
    /// Low-pass cutoff inside the feedback loop, Hz.
    pub filter_frequency: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        DelayParams {
            time: 0.25,
            feedback: 0.3,
            mix: 0.3,
            filter_frequency: 5000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlangerParams {
    /// LFO rate, Hz.
    pub rate: f32,
    /// Modulation depth, seconds.
    pub depth: f32,
    /// Centre delay, seconds.
    pub delay: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for FlangerParams {
    fn default() -> Self {
        FlangerParams {
            rate: 0.25,
            depth: 0.002,
            delay: 0.005,
            feedback: 0.5,
            mix: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhaserParams {
    /// LFO rate, Hz.
    pub rate: f32,
    /// Frequency swing around `frequency`, Hz.
    pub depth: f32,
    /// Centre frequency of the all-pass stages, Hz.
    pub frequency: f32,
    pub stages: u32,
    pub feedback: f32,
    pub q: f32,
    pub mix: f32,
}

impl Default for PhaserParams {
    fn default() -> Self {
        PhaserParams {
            rate: 0.5,
            depth: 800.0,
            frequency: 1000.0,
            stages: 4,
            feedback: 0.3,
            q: 0.7,
            mix: 0.5,
        }
    }
}

/// Shared parameters for the waveshaping family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShaperParams {
    /// Drive amount 0–100.
    pub amount: f32,
    /// Clip threshold for the clipping curves, 0–1.
    pub threshold: f32,
    /// Tone low-pass cutoff, Hz.
    pub tone: f32,
    /// Output gain, linear.
    pub output: f32,
    /// Even-harmonic blend for saturation, 0–1.
    pub blend: f32,
}

impl Default for ShaperParams {
    fn default() -> Self {
        ShaperParams {
            amount: 50.0,
            threshold: 0.7,
            tone: 8000.0,
            output: 1.0,
            blend: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_tag_round_trips_through_from_str() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.tag().parse::<NodeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = NodeSpec::from_json(&json!({ "type": "chorus", "rate": 1.0 })).unwrap_err();
        assert!(matches!(err, GraphError::UnknownNodeType { ref tag } if tag == "chorus"));
    }

    #[test]
    fn malformed_known_tag_is_invalid_node() {
        let err = NodeSpec::from_json(&json!({ "type": "reverb", "amount": "lots" })).unwrap_err();
        assert!(matches!(err, GraphError::InvalidNode { ref tag, .. } if tag == "reverb"));
    }

    #[test]
    fn missing_type_is_invalid_node() {
        let err = NodeSpec::from_json(&json!({ "amount": 3 })).unwrap_err();
        assert!(matches!(err, GraphError::InvalidNode { .. }));
    }

    #[test]
    fn defaults_fill_missing_parameters() {
        let spec = NodeSpec::from_json(&json!({ "type": "hardClip", "threshold": 0.5 })).unwrap();
        match spec {
            NodeSpec::HardClip(p) => {
                assert_eq!(p.threshold, 0.5);
                assert_eq!(p.output, 1.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        let spec = NodeSpec::from_json(&json!({ "type": "eq", "mid": { "frequency": 1200, "gain": -3 } }))
            .unwrap();
        match spec {
            NodeSpec::Eq(p) => {
                assert_eq!(p.mid.frequency, 1200.0);
                assert_eq!(p.mid.q, 0.707);
                assert_eq!(p.low.frequency, 100.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn one_bad_entry_rejects_the_list() {
        let list = r#"[{ "type": "gain", "value": 0.5 }, { "type": "wobble" }]"#;
        assert!(matches!(
            NodeSpec::list_from_json(list),
            Err(GraphError::UnknownNodeType { .. })
        ));
        let ok = NodeSpec::list_from_json(r#"[{ "type": "gain" }, { "type": "bitcrush" }]"#).unwrap();
        assert_eq!(ok, vec![NodeSpec::gain(1.0), NodeSpec::Bitcrush { bits: 8 }]);
    }
}
