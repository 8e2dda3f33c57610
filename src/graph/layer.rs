//! Clip, track and master layers.
//!
//! A layer owns one chain and a bus. Children are rendered first; their
//! buses are summed into the parent's bus by timeline position and the
//! result runs through the parent's chain. Clips feed tracks and tracks
//! feed the master.

use tracing::trace;

use crate::dsp::buffer::Bus;
use crate::error::GraphError;

use super::GraphContext;
use super::chain::{Chain, build_chain};
use super::node::NodeSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerLevel {
    Clip,
    Track,
    Master,
}

/// Declarative form of a layer tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub level: LayerLevel,
    pub effects: Vec<NodeSpec>,
    pub offset: usize,
    pub frames: usize,
    pub children: Vec<LayerSpec>,
}

impl LayerSpec {
    pub fn new(level: LayerLevel, effects: Vec<NodeSpec>, offset: usize, frames: usize) -> Self {
        LayerSpec {
            level,
            effects,
            offset,
            frames,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: LayerSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug)]
pub struct Layer {
    pub level: LayerLevel,
    pub chain: Chain,
    pub bus: Bus,
    pub children: Vec<Layer>,
}

impl Layer {
    pub fn children_mut(&mut self) -> &mut [Layer] {
        &mut self.children
    }

    /// Nodes in this layer and every layer below it.
    pub fn node_count(&self) -> usize {
        self.chain.len() + self.children.iter().map(Layer::node_count).sum::<usize>()
    }

    /// Render the whole subtree into this layer's bus.
    pub fn process(&mut self) {
        for child in &mut self.children {
            child.process();
        }
        self.mix_and_run();
    }

    /// Sum the children's buses in order, then run the chain. Anything
    /// already on this layer's bus is kept.
    pub fn mix_and_run(&mut self) {
        for child in &self.children {
            self.bus.mix_from(&child.bus);
        }
        self.chain.process(&mut self.bus.buffer);
        trace!(level = ?self.level, frames = self.bus.buffer.len(), "layer mixed");
    }

    /// Tear down the subtree, children first.
    pub fn teardown(self) {
        for child in self.children {
            child.teardown();
        }
        self.chain.teardown();
    }
}

/// Realize a layer tree, children before parents. On failure everything
/// built so far is torn down as it drops.
pub fn build_layer(spec: &LayerSpec, ctx: &GraphContext) -> Result<Layer, GraphError> {
    let children = spec
        .children
        .iter()
        .map(|c| build_layer(c, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    let chain = build_chain(&spec.effects, ctx)?;
    Ok(Layer {
        level: spec.level,
        chain,
        bus: Bus::new(spec.offset, spec.frames),
        children,
    })
}
