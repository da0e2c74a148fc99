//! Emulation limits.

/// Execution limits of one emulator.
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `max_instructions` | 10 000 000 |
/// | `max_call_depth` | 512 |
/// | `max_heap_objects` | 1 000 000 |
///
/// A limit of 0 disables the check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulationLimits {
    /// Maximum instructions to execute across all frames.
    pub max_instructions: u64,

    /// Maximum call stack depth.
    pub max_call_depth: usize,

    /// Maximum number of heap allocations.
    pub max_heap_objects: usize,
}

impl Default for EmulationLimits {
    fn default() -> Self {
        Self {
            max_instructions: 10_000_000,
            max_call_depth: 512,
            max_heap_objects: 1_000_000,
        }
    }
}

impl EmulationLimits {
    /// Creates new limits with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum instruction count.
    #[must_use]
    pub fn with_max_instructions(mut self, max: u64) -> Self {
        self.max_instructions = max;
        self
    }

    /// Sets the maximum call stack depth.
    #[must_use]
    pub fn with_max_call_depth(mut self, max: usize) -> Self {
        self.max_call_depth = max;
        self
    }

    /// Sets the maximum number of heap objects.
    #[must_use]
    pub fn with_max_heap_objects(mut self, max: usize) -> Self {
        self.max_heap_objects = max;
        self
    }
}
