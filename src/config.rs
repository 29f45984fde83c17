//! Runtime configuration.
//!
//! [`RuntimeConfig`] collects every tunable of an [`crate::AppDomain`]: the initial heap size,
//! the scheduler's per-thread step budget, the collection interval, operand specialization,
//! the assembly load timeout and the call depth limit.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use dotrun::{config::RuntimeConfig, emulation::StepBudget};
//!
//! let config = RuntimeConfig::new()
//!     .with_initial_heap_size(4096)
//!     .with_step_budget(StepBudget::Steps(100))
//!     .with_gc_interval(10)
//!     .with_load_timeout(Duration::from_secs(2));
//!
//! assert_eq!(config.initial_heap_size, 4096);
//! assert!(config.specialize_opcodes);
//! ```

use std::time::Duration;

use crate::emulation::StepBudget;

/// Default payload size of a fresh heap in bytes.
pub const DEFAULT_HEAP_SIZE: usize = 1024;

/// Default maximum number of frames on one thread.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Default maximum element count of a managed array.
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Tunables of an AppDomain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Payload bytes of the initial heap; the buffer is 8 bytes larger.
    ///
    /// Default: 1024
    pub initial_heap_size: usize,

    /// How long a thread may run per scheduler slot.
    ///
    /// Default: [`StepBudget::Unbounded`]
    pub step_budget: StepBudget,

    /// Run the collector every `gc_interval` ticks; 0 disables collection.
    ///
    /// Default: 1
    pub gc_interval: u64,

    /// Cache operand kinds of polymorphic instructions.
    ///
    /// Default: `true`
    pub specialize_opcodes: bool,

    /// How long [`crate::AppDomain::run_to_completion`] waits for an assembly load while every
    /// thread is blocked.
    ///
    /// Default: 10 seconds
    pub load_timeout: Duration,

    /// Maximum number of frames on one thread.
    ///
    /// Default: 1024
    pub max_call_depth: usize,

    /// Maximum element count of a `newarr` array.
    ///
    /// Default: 16777216
    pub max_array_length: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            initial_heap_size: DEFAULT_HEAP_SIZE,
            step_budget: StepBudget::Unbounded,
            gc_interval: 1,
            specialize_opcodes: true,
            load_timeout: Duration::from_secs(10),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
        }
    }
}

impl RuntimeConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload size of the initial heap.
    #[must_use]
    pub fn with_initial_heap_size(mut self, size: usize) -> Self {
        self.initial_heap_size = size;
        self
    }

    /// Sets the per-slot step budget of the scheduler.
    #[must_use]
    pub fn with_step_budget(mut self, budget: StepBudget) -> Self {
        self.step_budget = budget;
        self
    }

    /// Sets the collection interval in ticks; 0 disables collection.
    #[must_use]
    pub fn with_gc_interval(mut self, interval: u64) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Enables or disables operand specialization.
    #[must_use]
    pub fn with_specialize_opcodes(mut self, enabled: bool) -> Self {
        self.specialize_opcodes = enabled;
        self
    }

    /// Sets the assembly load timeout.
    #[must_use]
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Sets the call depth limit.
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Sets the maximum element count of `newarr` arrays.
    #[must_use]
    pub fn with_max_array_length(mut self, length: usize) -> Self {
        self.max_array_length = length;
        self
    }
}
