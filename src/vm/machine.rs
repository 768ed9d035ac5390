// Execution loop: fetch-decode-dispatch until halt, fault, or end of program

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};

use super::error::{FaultReport, VmFault};
use super::executor::io_ops::TokenReader;
use super::executor::{Flow, arithmetic_ops, control_ops, io_ops, stack_ops};
use super::instruction::Instruction;
use super::parser::Program;
use super::state::VmState;

/// Execution status. `Halted` and `Faulted` are terminal; no further
/// instructions execute after either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Halted,
    Faulted,
}

/// One VM instance: a loaded program, its mutable state, and the console
/// endpoints. Program and heap capacity are fixed at construction; the rest
/// is owned exclusively by this instance and mutated one instruction at a
/// time.
pub struct Machine<R, W> {
    program: Program,
    state: VmState,
    status: RunState,
    input: TokenReader<R>,
    output: W,
}

impl Machine<BufReader<Stdin>, Stdout> {
    /// A VM bound to the process console.
    pub fn new(program: Program, heap_size: usize) -> Self {
        Self::with_io(program, heap_size, BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> Machine<R, W> {
    /// A VM with injected console endpoints; tests drive in-memory buffers.
    pub fn with_io(program: Program, heap_size: usize, input: R, output: W) -> Self {
        Machine {
            program,
            state: VmState::new(heap_size),
            status: RunState::Running,
            input: TokenReader::new(input),
            output,
        }
    }

    /// Runs the loaded program until STOP, a fault, or the end of the
    /// program. Falling off the end is an implicit halt. After the run the
    /// final stack, symbol table, and status stay queryable.
    pub fn run(&mut self) -> Result<RunState, FaultReport> {
        while self.status == RunState::Running && self.state.pc < self.program.len() {
            let instruction = self.program.instructions[self.state.pc].clone();
            if let Instruction::Label(name) = &instruction {
                log::trace!(target: "vm", "pc={} {name}:", self.state.pc);
                self.state.pc += 1;
                continue;
            }
            log::debug!(target: "vm", "pc={} {instruction}", self.state.pc);
            match self.dispatch(&instruction) {
                Ok(Flow::Advance) => self.state.pc += 1,
                Ok(Flow::Jump(target)) => self.state.pc = target,
                Err(fault) => {
                    self.status = RunState::Faulted;
                    let report = FaultReport {
                        fault,
                        opcode: instruction.opcode(),
                        pc: self.state.pc,
                        fp: self.state.fp,
                        stack_depth: self.state.stack.len(),
                    };
                    log::error!(target: "vm", "{report}");
                    return Err(report);
                }
            }
            if self.state.halt {
                self.status = RunState::Halted;
            }
        }
        if self.status == RunState::Running {
            self.status = RunState::Halted; // implicit end-of-program halt
        }
        self.output.flush().ok();
        Ok(self.status)
    }

    /// Routes one instruction to the unit that owns it. Exactly one handler
    /// per opcode; unknown opcodes cannot reach this point because decoding
    /// rejects them at load.
    fn dispatch(&mut self, instruction: &Instruction) -> Result<Flow, VmFault> {
        use Instruction::*;
        let program_len = self.program.len();
        let state = &mut self.state;
        let flow = match instruction {
            Label(_) => Flow::Advance,

            // Stack/Heap Memory Unit
            Push(value) => {
                stack_ops::push(state, *value);
                Flow::Advance
            }
            Pop => step(stack_ops::pop(state))?,
            Dup => step(stack_ops::dup(state))?,
            Swap => step(stack_ops::swap(state))?,
            Store(name) => step(stack_ops::store(state, name))?,
            Load(name) => step(stack_ops::load(state, name))?,
            PushInd => step(stack_ops::push_indirect(state))?,
            StoreInd => step(stack_ops::store_indirect(state))?,
            PushOff(offset) => step(stack_ops::push_offset(state, *offset))?,
            StoreOff(offset) => step(stack_ops::store_offset(state, *offset))?,
            AddSp(count) => step(stack_ops::add_sp(state, *count))?,
            Malloc => step(stack_ops::malloc(state))?,

            // Arithmetic/Logic Unit
            Add => step(arithmetic_ops::add(&mut state.stack))?,
            Sub => step(arithmetic_ops::sub(&mut state.stack))?,
            Times => step(arithmetic_ops::times(&mut state.stack))?,
            Div => step(arithmetic_ops::div(&mut state.stack))?,
            Mod => step(arithmetic_ops::modulo(&mut state.stack))?,
            Lshift(amount) => step(arithmetic_ops::lshift(&mut state.stack, *amount))?,
            Rshift(amount) => step(arithmetic_ops::rshift(&mut state.stack, *amount))?,
            Not => step(arithmetic_ops::not(&mut state.stack))?,
            And => step(arithmetic_ops::and(&mut state.stack))?,
            Or => step(arithmetic_ops::or(&mut state.stack))?,
            Xor => step(arithmetic_ops::xor(&mut state.stack))?,
            Nand => step(arithmetic_ops::nand(&mut state.stack))?,
            BitNot => step(arithmetic_ops::bit_not(&mut state.stack))?,
            BitAnd => step(arithmetic_ops::bit_and(&mut state.stack))?,
            BitOr => step(arithmetic_ops::bit_or(&mut state.stack))?,
            BitXor => step(arithmetic_ops::bit_xor(&mut state.stack))?,
            BitNand => step(arithmetic_ops::bit_nand(&mut state.stack))?,
            Greater => step(arithmetic_ops::greater(&mut state.stack))?,
            Less => step(arithmetic_ops::less(&mut state.stack))?,
            Equal => step(arithmetic_ops::equal(&mut state.stack))?,
            IsNil => step(arithmetic_ops::is_nil(&mut state.stack))?,
            IsPos => step(arithmetic_ops::is_pos(&mut state.stack))?,
            IsNeg => step(arithmetic_ops::is_neg(&mut state.stack))?,
            Cmp => step(arithmetic_ops::cmp(&mut state.stack))?,

            // Register/Control Unit
            PushSp => {
                control_ops::push_sp(state);
                Flow::Advance
            }
            PopSp => step(control_ops::pop_sp(state))?,
            PushFbr => {
                control_ops::push_fbr(state);
                Flow::Advance
            }
            PopFbr => step(control_ops::pop_fbr(state))?,
            Link => {
                control_ops::link(state);
                Flow::Advance
            }
            Stop => {
                control_ops::stop(state);
                Flow::Advance
            }
            Jump(target) => control_ops::jump(*target),
            JumpC(target) => control_ops::jump_cond(state, *target)?,
            JumpInd => control_ops::jump_indirect(state, program_len)?,
            Jsr(target) => control_ops::jsr(state, *target),
            JsrInd => control_ops::jsr_indirect(state, program_len)?,
            Skip => control_ops::skip(state)?,

            // I/O Unit
            Print => step(io_ops::print(&state.stack, &mut self.output))?,
            PrintLn => step(io_ops::print_line(&state.stack, &mut self.output))?,
            PrintC => step(io_ops::print_char(&state.stack, &mut self.output))?,
            Read => step(io_ops::read(&mut state.stack, &mut self.input))?,
            ReadC => step(io_ops::read_char(&mut state.stack, &mut self.input))?,
            ReadF => step(io_ops::read_float(&mut state.stack, &mut self.input))?,
            Dump => step(io_ops::dump(&state.stack, &mut self.output))?,
        };
        Ok(flow)
    }

    /// Final stack contents, bottom to top.
    pub fn stack(&self) -> &[i64] {
        self.state.stack.view()
    }

    pub fn symbols(&self) -> &HashMap<String, i64> {
        &self.state.symbols
    }

    pub fn status(&self) -> RunState {
        self.status
    }

    pub fn state(&self) -> &VmState {
        &self.state
    }

    pub fn output(&self) -> &W {
        &self.output
    }
}

fn step(result: Result<(), VmFault>) -> Result<Flow, VmFault> {
    result.map(|_| Flow::Advance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::parser::parse_program;
    use std::io::Cursor;

    type TestMachine = Machine<Cursor<&'static str>, Vec<u8>>;

    fn machine(source: &str, input: &'static str) -> TestMachine {
        let program = parse_program(source).expect("test program should parse");
        Machine::with_io(program, 16, Cursor::new(input), Vec::new())
    }

    fn output_of(m: &TestMachine) -> &str {
        std::str::from_utf8(&m.output).unwrap()
    }

    #[test]
    fn test_push_add_leaves_sum() {
        let mut m = machine("PUSH 2\nPUSH 3\nADD", "");
        assert_eq!(m.run().unwrap(), RunState::Halted);
        assert_eq!(m.stack(), &[5]);
    }

    #[test]
    fn test_sub_preserves_source_order() {
        let mut m = machine("PUSH 10\nPUSH 3\nSUB", "");
        m.run().unwrap();
        assert_eq!(m.stack(), &[7]);
    }

    #[test]
    fn test_add_print_stop() {
        let mut m = machine("PUSH 5\nPUSH 3\nADD\nPRINT\nSTOP", "");
        assert_eq!(m.run().unwrap(), RunState::Halted);
        assert_eq!(output_of(&m), "8");
        assert_eq!(m.stack(), &[8]);
        assert_eq!(m.status(), RunState::Halted);
    }

    #[test]
    fn test_stop_prevents_later_instructions() {
        let mut m = machine("STOP\nPUSH 1", "");
        assert_eq!(m.run().unwrap(), RunState::Halted);
        assert_eq!(m.stack(), &[] as &[i64]);
    }

    #[test]
    fn test_labelless_numeric_jumpind() {
        let source = "PUSH 4\nJUMPIND\nPUSH 99\nPRINT\nPUSH 123\nPRINT";
        let mut m = machine(source, "");
        assert_eq!(m.run().unwrap(), RunState::Halted);
        assert_eq!(output_of(&m), "123");
        assert_eq!(m.stack(), &[123]);
    }

    #[test]
    fn test_jumpind_out_of_bounds_faults() {
        let mut m = machine("PUSH 99\nJUMPIND", "");
        let report = m.run().unwrap_err();
        assert_eq!(report.fault, VmFault::InvalidJumpTarget(99));
        assert_eq!(report.opcode, "JUMPIND");
        assert_eq!(report.pc, 1);
        assert_eq!(m.status(), RunState::Faulted);
    }

    #[test]
    fn test_label_loop_with_jumpc() {
        let source = "PUSH 2\nloop:\nPUSH 1\nSUB\nDUP\nJUMPC loop\nSTOP";
        let mut m = machine(source, "");
        assert_eq!(m.run().unwrap(), RunState::Halted);
        assert_eq!(m.stack(), &[0]);
    }

    #[test]
    fn test_jsr_and_jumpind_return() {
        // Subroutine doubles its argument, return address rides on top
        let source = "\
PUSH 10
JSR double
PRINT
STOP
double:
SWAP
PUSH 2
TIMES
SWAP
JUMPIND
";
        let mut m = machine(source, "");
        assert_eq!(m.run().unwrap(), RunState::Halted);
        assert_eq!(output_of(&m), "20");
        assert_eq!(m.stack(), &[20]);
    }

    #[test]
    fn test_malloc_addresses_are_monotonic() {
        let source = "PUSH 3\nMALLOC\nPUSH 2\nMALLOC";
        let mut m = machine(source, "");
        m.run().unwrap();
        assert_eq!(m.stack(), &[1, 5]); // second user address = 1 + 3 + 1
        assert_eq!(m.state().heap.pointer(), 7);
    }

    #[test]
    fn test_malloc_overflow_leaves_heap_pointer() {
        let program = parse_program("PUSH 10\nMALLOC").unwrap();
        let mut m = Machine::with_io(program, 4, Cursor::new(""), Vec::new());
        let report = m.run().unwrap_err();
        assert_eq!(report.fault, VmFault::HeapOverflow);
        assert_eq!(m.state().heap.pointer(), 0);
    }

    #[test]
    fn test_pushoff_after_link_reads_zero() {
        let mut m = machine("LINK\nPUSHOFF 2", "");
        m.run().unwrap();
        // saved fp, two zero-filled slots, then the pushed copy
        assert_eq!(m.stack(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_storeoff_pushoff_roundtrip() {
        let source = "LINK\nPUSH 7\nSTOREOFF 2\nPUSHOFF 2";
        let mut m = machine(source, "");
        m.run().unwrap();
        assert_eq!(m.stack(), &[0, 0, 7, 7]);
    }

    #[test]
    fn test_addsp_underflow_commits_nothing() {
        let mut m = machine("PUSH 1\nADDSP -5", "");
        let report = m.run().unwrap_err();
        assert_eq!(report.fault, VmFault::StackUnderflow);
        assert_eq!(report.opcode, "ADDSP");
        assert_eq!(m.stack(), &[1]);
    }

    #[test]
    fn test_division_by_zero_faults() {
        let mut m = machine("PUSH 1\nPUSH 0\nDIV", "");
        let report = m.run().unwrap_err();
        assert_eq!(report.fault, VmFault::DivisionByZero);
        assert_eq!(report.opcode, "DIV");
    }

    #[test]
    fn test_store_load_symbol_table() {
        let mut m = machine("PUSH 42\nSTORE x\nLOAD x", "");
        m.run().unwrap();
        assert_eq!(m.stack(), &[42]);
        assert_eq!(m.symbols().get("x"), Some(&42));
    }

    #[test]
    fn test_load_unbound_variable_faults() {
        let mut m = machine("LOAD nothing", "");
        let report = m.run().unwrap_err();
        assert_eq!(
            report.fault,
            VmFault::UndefinedVariable("nothing".to_string())
        );
    }

    #[test]
    fn test_read_add_println() {
        let mut m = machine("READ\nREAD\nADD\nPRINTLN", "4 5\n");
        m.run().unwrap();
        assert_eq!(output_of(&m), "9\n");
        assert_eq!(m.stack(), &[9]);
    }

    #[test]
    fn test_readc_and_readf() {
        let mut m = machine("READC\nREADF", "A 3.9\n");
        m.run().unwrap();
        assert_eq!(m.stack(), &[65, 3]);
    }

    #[test]
    fn test_read_past_end_of_input_faults() {
        let mut m = machine("READ", "");
        let report = m.run().unwrap_err();
        assert_eq!(report.fault, VmFault::EndOfInput);
        assert_eq!(report.opcode, "READ");
    }

    #[test]
    fn test_printc_writes_characters() {
        let mut m = machine("PUSH 72\nPRINTC\nPUSH 105\nPRINTC", "");
        m.run().unwrap();
        assert_eq!(output_of(&m), "Hi");
    }

    #[test]
    fn test_dump_is_diagnostic_only() {
        let mut m = machine("PUSH 1\nPUSH 2\nDUMP", "");
        m.run().unwrap();
        assert_eq!(output_of(&m), "Stack: [1, 2]\n");
        assert_eq!(m.stack(), &[1, 2]);
    }

    #[test]
    fn test_skip_jumps_over_instructions() {
        let mut m = machine("PUSH 1\nSKIP\nPUSH 99\nPUSH 5", "");
        m.run().unwrap();
        assert_eq!(m.stack(), &[5]);
    }

    #[test]
    fn test_skip_past_end_halts_normally() {
        let mut m = machine("PUSH 10\nSKIP", "");
        assert_eq!(m.run().unwrap(), RunState::Halted);
    }

    #[test]
    fn test_frame_release_with_pushsp_popsp() {
        // Save the stack size, grow three locals, then release them in bulk
        let source = "PUSH 7\nPUSH 8\nPUSHSP\nADDSP 3\nPUSHOFF 2\nPOPSP";
        let mut m = machine(source, "");
        m.run().unwrap();
        assert_eq!(m.stack(), &[7, 8]);
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let source = "READ\nPUSH 3\nTIMES\nPRINTLN\nDUMP";
        let mut first = machine(source, "14\n");
        let mut second = machine(source, "14\n");
        first.run().unwrap();
        second.run().unwrap();
        assert_eq!(output_of(&first), output_of(&second));
        assert_eq!(first.stack(), second.stack());
    }

    #[test]
    fn test_empty_program_halts_immediately() {
        let mut m = machine("", "");
        assert_eq!(m.run().unwrap(), RunState::Halted);
        assert_eq!(m.stack(), &[] as &[i64]);
    }
}
