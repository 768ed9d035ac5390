// VM State: operand stack, heap, symbol table, and the pc/fp/halt registers

use std::collections::HashMap;

use super::heap::Heap;
use super::stack::Stack;

/// Machine state mutated by instruction execution. Registers are plain owned
/// fields: execution is strictly sequential, so nothing here needs atomicity.
/// Reset only by constructing a fresh state.
#[derive(Debug, Clone)]
pub struct VmState {
    pub stack: Stack,
    pub heap: Heap,
    /// Variable storage for LOAD/STORE; independent of the frame mechanism.
    pub symbols: HashMap<String, i64>,
    /// Index of the next instruction to fetch.
    pub pc: usize,
    /// Stack index marking the base of the current call frame.
    pub fp: usize,
    /// Set by STOP; observed by the execution loop before each fetch.
    pub halt: bool,
}

impl VmState {
    pub fn new(heap_size: usize) -> Self {
        VmState {
            stack: Stack::new(),
            heap: Heap::with_capacity(heap_size),
            symbols: HashMap::new(),
            pc: 0,
            fp: 0,
            halt: false,
        }
    }
}
