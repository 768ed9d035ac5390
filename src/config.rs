//! Configuration constants for the VM runtime.

// Memory
pub const DEFAULT_HEAP_SIZE: usize = 1024; // Heap capacity in cells when the CLI does not override it

// Logging
pub const DEFAULT_LOG_LEVEL: &str = "warn"; // Program output goes to stdout; keep the logger quiet by default
