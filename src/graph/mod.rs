//! Signal graph: declarative node lists realized into chains, nested into
//! clip, track and master layers.

pub mod chain;
pub mod effects;
pub mod impulse;
pub mod layer;
pub mod node;

pub use chain::{Chain, Node, NodeId, build_chain};
pub use impulse::{ImpulseCache, ImpulseResponse};
pub use layer::{Layer, LayerLevel, LayerSpec, build_layer};
pub use node::{NodeKind, NodeSpec};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::CacheMode;

/// Everything a chain build needs from the render that owns it.
///
/// Chains built from the same context share one live-node counter, so the
/// owner can verify that every node it created was torn down.
#[derive(Debug, Clone)]
pub struct GraphContext {
    sample_rate: f64,
    impulses: ImpulseCache,
    live: Arc<AtomicUsize>,
}

impl GraphContext {
    pub fn new(sample_rate: f64, seed: u64, cache_mode: CacheMode) -> Self {
        GraphContext {
            sample_rate,
            impulses: ImpulseCache::new(cache_mode, seed),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn impulses(&self) -> &ImpulseCache {
        &self.impulses
    }

    /// Nodes built from this context and not yet torn down.
    pub fn live_nodes(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn live_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live)
    }
}
