//! # Hub configuration.
//!
//! Provides [`TramConfig`], the settings shared by a hub and all of its
//! sub-channels.
//!
//! Config is used in two ways:
//! 1. **Hub creation**: `EventTram::new(config)`
//! 2. **Standalone channels**: `RawChannel::new(name, config)` / `Channel::new(name, config)`
//!
//! ## Sentinel values
//! - `fault_capacity = 0` → clamped to 1 by the fault bus
//!
//! # Example
//! ```
//! use eventtram::{BroadcastOptions, BroadcastStrategy, MemoryNetwork, TramConfig};
//!
//! let network = MemoryNetwork::new();
//! let cfg = TramConfig::default()
//!     .with_throw_immediately(true)
//!     .with_strategy(BroadcastStrategy::factory(network, "app", BroadcastOptions::default()));
//!
//! assert!(cfg.throw_immediately);
//! ```

use std::sync::Arc;

use crate::strategies::{LocalFactory, StrategyFactory};

/// Configuration for a hub and its channels.
///
/// ## Field semantics
/// - `throw_immediately`: how subscriber failures surface (see below)
/// - `strategy`: builds the notify strategy of every channel
/// - `fault_capacity`: fault bus ring buffer size (min 1)
///
/// ## Notes
/// All fields are public for flexibility; the `with_*` helpers chain.
#[derive(Clone)]
pub struct TramConfig {
    /// How subscriber failures surface.
    ///
    /// - `false` (default): every subscriber runs; failures are reported on a
    ///   later tick to the fault bus and the log
    /// - `true`: `publish_sync` returns the first failure and skips the rest;
    ///   a deferred publication stops running its remaining subscribers
    pub throw_immediately: bool,

    /// Factory for the notify strategy of each channel, called with the channel name.
    ///
    /// Defaults to [`LocalFactory`].
    pub strategy: Arc<dyn StrategyFactory>,

    /// Capacity of the fault bus.
    ///
    /// Receivers lagging behind more than `fault_capacity` faults skip older ones.
    pub fault_capacity: usize,
}

impl TramConfig {
    pub fn with_throw_immediately(mut self, throw_immediately: bool) -> Self {
        self.throw_immediately = throw_immediately;
        self
    }

    pub fn with_strategy<F: StrategyFactory>(mut self, factory: F) -> Self {
        self.strategy = Arc::new(factory);
        self
    }

    pub fn with_fault_capacity(mut self, capacity: usize) -> Self {
        self.fault_capacity = capacity;
        self
    }
}

impl Default for TramConfig {
    /// Provides a default configuration:
    /// - `throw_immediately = false`
    /// - `strategy = LocalFactory`
    /// - `fault_capacity = 256`
    fn default() -> Self {
        Self {
            throw_immediately: false,
            strategy: Arc::new(LocalFactory),
            fault_capacity: 256,
        }
    }
}

impl std::fmt::Debug for TramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TramConfig")
            .field("throw_immediately", &self.throw_immediately)
            .field("strategy", &"<dyn StrategyFactory>")
            .field("fault_capacity", &self.fault_capacity)
            .finish()
    }
}
