use std::fmt;

/// Decoded form of one program line. Jump targets are resolved to absolute
/// instruction indices at load, whether they were written as labels or as
/// raw numeric indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// A label-definition line; occupies an instruction index, never executed.
    Label(String),
    // Stack ops
    Push(i64),
    Pop,
    Dup,
    Swap,
    Store(String),
    Load(String),
    PushInd,
    StoreInd,
    PushOff(i64),
    StoreOff(i64),
    AddSp(i64),
    Malloc,
    // Arithmetic/logic ops
    Add,
    Sub,
    Times,
    Div,
    Mod,
    Lshift(u32),
    Rshift(u32),
    Not,
    And,
    Or,
    Xor,
    Nand,
    BitNot,
    BitAnd,
    BitOr,
    BitXor,
    BitNand,
    Greater,
    Less,
    Equal,
    IsNil,
    IsPos,
    IsNeg,
    Cmp,
    // Register/control ops
    PushSp,
    PopSp,
    PushFbr,
    PopFbr,
    Link,
    Stop,
    Jump(usize),
    JumpC(usize),
    JumpInd,
    Jsr(usize),
    JsrInd,
    Skip,
    // I/O ops
    Print,
    PrintLn,
    PrintC,
    Read,
    ReadC,
    ReadF,
    Dump,
}

impl Instruction {
    /// Canonical mnemonic, used in fault reports and trace logs.
    pub fn opcode(&self) -> &'static str {
        use Instruction::*;
        match self {
            Label(_) => "LABEL",
            Push(_) => "PUSH",
            Pop => "POP",
            Dup => "DUP",
            Swap => "SWAP",
            Store(_) => "STORE",
            Load(_) => "LOAD",
            PushInd => "PUSHIND",
            StoreInd => "STOREIND",
            PushOff(_) => "PUSHOFF",
            StoreOff(_) => "STOREOFF",
            AddSp(_) => "ADDSP",
            Malloc => "MALLOC",
            Add => "ADD",
            Sub => "SUB",
            Times => "TIMES",
            Div => "DIV",
            Mod => "MOD",
            Lshift(_) => "LSHIFT",
            Rshift(_) => "RSHIFT",
            Not => "NOT",
            And => "AND",
            Or => "OR",
            Xor => "XOR",
            Nand => "NAND",
            BitNot => "BITNOT",
            BitAnd => "BITAND",
            BitOr => "BITOR",
            BitXor => "BITXOR",
            BitNand => "BITNAND",
            Greater => "GREATER",
            Less => "LESS",
            Equal => "EQUAL",
            IsNil => "ISNIL",
            IsPos => "ISPOS",
            IsNeg => "ISNEG",
            Cmp => "CMP",
            PushSp => "PUSHSP",
            PopSp => "POPSP",
            PushFbr => "PUSHFBR",
            PopFbr => "POPFBR",
            Link => "LINK",
            Stop => "STOP",
            Jump(_) => "JUMP",
            JumpC(_) => "JUMPC",
            JumpInd => "JUMPIND",
            Jsr(_) => "JSR",
            JsrInd => "JSRIND",
            Skip => "SKIP",
            Print => "PRINT",
            PrintLn => "PRINTLN",
            PrintC => "PRINTC",
            Read => "READ",
            ReadC => "READC",
            ReadF => "READF",
            Dump => "DUMP",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match self {
            Label(name) => write!(f, "{name}:"),
            Push(value) => write!(f, "PUSH {value}"),
            Store(name) => write!(f, "STORE {name}"),
            Load(name) => write!(f, "LOAD {name}"),
            PushOff(offset) => write!(f, "PUSHOFF {offset}"),
            StoreOff(offset) => write!(f, "STOREOFF {offset}"),
            AddSp(count) => write!(f, "ADDSP {count}"),
            Lshift(amount) => write!(f, "LSHIFT {amount}"),
            Rshift(amount) => write!(f, "RSHIFT {amount}"),
            Jump(target) => write!(f, "JUMP {target}"),
            JumpC(target) => write!(f, "JUMPC {target}"),
            Jsr(target) => write!(f, "JSR {target}"),
            other => f.write_str(other.opcode()),
        }
    }
}
