// VM Program Parser: decodes instruction lines, collects labels, resolves jump targets

use std::collections::HashMap;

use super::error::ParseError;
use super::instruction::Instruction;

/// Result of loading a program listing. Label lines are kept in the
/// instruction sequence (the execution loop skips them), so the indices in
/// `labels` and the indices JUMPIND sees are positions in the same list.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<String, usize>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Cuts off anything after a comment marker and trims the remainder.
fn strip_comment(line: &str) -> &str {
    let mut end = line.len();
    for marker in [";", "#", "//"] {
        if let Some(pos) = line.find(marker) {
            end = end.min(pos);
        }
    }
    line[..end].trim()
}

/// Returns the label name iff the entire line is `<identifier>:`. A colon
/// anywhere else never makes a label.
fn label_name(line: &str) -> Option<&str> {
    let name = line.strip_suffix(':')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(name)
}

/// Parses a program listing into an instruction sequence.
///
/// Two passes, so that forward label references resolve: the first collects
/// label definitions and instruction indices, the second decodes instruction
/// lines and resolves every static jump target against the label map exactly
/// once. Blank lines and comment-only lines occupy no instruction index.
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    // First pass: collect labels and count instruction entries
    let mut labels = HashMap::new();
    let mut index = 0;
    for (line_no, raw) in source.lines().enumerate() {
        let line = line_no + 1;
        let content = strip_comment(raw);
        if content.is_empty() {
            continue;
        }
        if let Some(name) = label_name(content) {
            if labels.contains_key(name) {
                return Err(ParseError::DuplicateLabel {
                    line,
                    label: name.to_string(),
                });
            }
            labels.insert(name.to_string(), index);
        }
        index += 1;
    }
    let total = index;

    // Second pass: decode instructions, resolving jump targets via the map
    let mut instructions = Vec::with_capacity(total);
    for (line_no, raw) in source.lines().enumerate() {
        let line = line_no + 1;
        let content = strip_comment(raw);
        if content.is_empty() {
            continue;
        }
        if let Some(name) = label_name(content) {
            instructions.push(Instruction::Label(name.to_string()));
            continue;
        }

        let parts: Vec<&str> = content.split_whitespace().collect();
        let opcode = parts[0].to_ascii_uppercase();
        let operand = parts.get(1).copied();

        let instruction = match opcode.as_str() {
            // Stack ops
            "PUSH" => Instruction::Push(parse_int(&opcode, operand, line)?),
            "POP" => Instruction::Pop,
            "DUP" => Instruction::Dup,
            "SWAP" => Instruction::Swap,
            "STORE" => Instruction::Store(parse_name(&opcode, operand, line)?),
            "LOAD" => Instruction::Load(parse_name(&opcode, operand, line)?),
            "PUSHIND" => Instruction::PushInd,
            "STOREIND" => Instruction::StoreInd,
            "PUSHOFF" => Instruction::PushOff(parse_int(&opcode, operand, line)?),
            "STOREOFF" => Instruction::StoreOff(parse_int(&opcode, operand, line)?),
            "ADDSP" => Instruction::AddSp(parse_int(&opcode, operand, line)?),
            "MALLOC" => Instruction::Malloc,
            // Arithmetic/logic ops
            "ADD" => Instruction::Add,
            "SUB" => Instruction::Sub,
            "TIMES" => Instruction::Times,
            "DIV" => Instruction::Div,
            "MOD" => Instruction::Mod,
            "LSHIFT" => Instruction::Lshift(parse_shift(&opcode, operand, line)?),
            "RSHIFT" => Instruction::Rshift(parse_shift(&opcode, operand, line)?),
            "NOT" => Instruction::Not,
            "AND" => Instruction::And,
            "OR" => Instruction::Or,
            "XOR" => Instruction::Xor,
            "NAND" => Instruction::Nand,
            "BITNOT" => Instruction::BitNot,
            "BITAND" => Instruction::BitAnd,
            "BITOR" => Instruction::BitOr,
            "BITXOR" => Instruction::BitXor,
            "BITNAND" => Instruction::BitNand,
            "GREATER" => Instruction::Greater,
            "LESS" => Instruction::Less,
            "EQUAL" => Instruction::Equal,
            "ISNIL" => Instruction::IsNil,
            "ISPOS" => Instruction::IsPos,
            "ISNEG" => Instruction::IsNeg,
            "CMP" => Instruction::Cmp,
            // Register/control ops
            "PUSHSP" => Instruction::PushSp,
            "POPSP" => Instruction::PopSp,
            "PUSHFBR" => Instruction::PushFbr,
            "POPFBR" => Instruction::PopFbr,
            "LINK" => Instruction::Link,
            "STOP" => Instruction::Stop,
            "JUMP" => Instruction::Jump(resolve_target(&opcode, operand, &labels, total, line)?),
            "JUMPC" => Instruction::JumpC(resolve_target(&opcode, operand, &labels, total, line)?),
            "JUMPIND" => Instruction::JumpInd,
            "JSR" => Instruction::Jsr(resolve_target(&opcode, operand, &labels, total, line)?),
            "JSRIND" => Instruction::JsrInd,
            "SKIP" => Instruction::Skip,
            // I/O ops
            "PRINT" => Instruction::Print,
            "PRINTLN" => Instruction::PrintLn,
            "PRINTC" => Instruction::PrintC,
            "READ" => Instruction::Read,
            "READC" => Instruction::ReadC,
            "READF" => Instruction::ReadF,
            "DUMP" => Instruction::Dump,
            _ => {
                return Err(ParseError::UnknownInstruction {
                    line,
                    opcode: parts[0].to_string(),
                });
            }
        };
        instructions.push(instruction);
    }

    log::debug!(
        target: "parser",
        "loaded {} instructions, {} labels",
        instructions.len(),
        labels.len()
    );

    Ok(Program {
        instructions,
        labels,
    })
}

// Helper: parse a required signed integer operand
fn parse_int(opcode: &str, operand: Option<&str>, line: usize) -> Result<i64, ParseError> {
    let token = operand.ok_or_else(|| ParseError::MissingOperand {
        line,
        opcode: opcode.to_string(),
    })?;
    token.parse().map_err(|_| ParseError::MalformedOperand {
        line,
        opcode: opcode.to_string(),
        token: token.to_string(),
    })
}

// Helper: parse a shift amount (unsigned)
fn parse_shift(opcode: &str, operand: Option<&str>, line: usize) -> Result<u32, ParseError> {
    let token = operand.ok_or_else(|| ParseError::MissingOperand {
        line,
        opcode: opcode.to_string(),
    })?;
    token.parse().map_err(|_| ParseError::MalformedOperand {
        line,
        opcode: opcode.to_string(),
        token: token.to_string(),
    })
}

// Helper: a required variable-name operand
fn parse_name(opcode: &str, operand: Option<&str>, line: usize) -> Result<String, ParseError> {
    operand
        .map(str::to_string)
        .ok_or_else(|| ParseError::MissingOperand {
            line,
            opcode: opcode.to_string(),
        })
}

/// Resolves a static jump target: a symbolic label through the label map, or
/// a raw numeric instruction index (legacy addressing), bounds-checked here
/// so execution never re-scans the program.
fn resolve_target(
    opcode: &str,
    operand: Option<&str>,
    labels: &HashMap<String, usize>,
    total: usize,
    line: usize,
) -> Result<usize, ParseError> {
    let token = operand.ok_or_else(|| ParseError::MissingOperand {
        line,
        opcode: opcode.to_string(),
    })?;
    if let Ok(target) = token.parse::<i64>() {
        if target < 0 || target as usize >= total {
            return Err(ParseError::JumpOutOfRange { line, target });
        }
        return Ok(target as usize);
    }
    labels
        .get(token)
        .copied()
        .ok_or_else(|| ParseError::UnresolvedLabel {
            line,
            label: token.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_program() {
        let source = "\
start:          ; label definition
    PUSH 1      ; push a value
    PUSH 2
    ADD
    JUMPC start
";
        let program = parse_program(source).unwrap();
        assert_eq!(program.len(), 5);
        assert_eq!(*program.labels.get("start").unwrap(), 0);
        assert_eq!(program.instructions[0], Instruction::Label("start".to_string()));
        assert_eq!(program.instructions[1], Instruction::Push(1));
        assert_eq!(program.instructions[4], Instruction::JumpC(0));
    }

    #[test]
    fn test_blank_and_comment_lines_occupy_no_index() {
        let source = "\
# heading comment

PUSH 1
// another comment
PUSH 2  ; trailing
";
        let program = parse_program(source).unwrap();
        assert_eq!(
            program.instructions,
            vec![Instruction::Push(1), Instruction::Push(2)]
        );
    }

    #[test]
    fn test_forward_label_reference() {
        let source = "JUMP end\nPUSH 1\nend:\nSTOP";
        let program = parse_program(source).unwrap();
        assert_eq!(program.instructions[0], Instruction::Jump(2));
    }

    #[test]
    fn test_opcodes_are_case_insensitive() {
        let program = parse_program("push 3\nadd").unwrap();
        assert_eq!(
            program.instructions,
            vec![Instruction::Push(3), Instruction::Add]
        );
    }

    #[test]
    fn test_numeric_jump_target() {
        let program = parse_program("JUMP 2\nPUSH 1\nSTOP").unwrap();
        assert_eq!(program.instructions[0], Instruction::Jump(2));
    }

    #[test]
    fn test_numeric_jump_target_out_of_range() {
        assert_eq!(
            parse_program("JUMP 3\nPUSH 1\nSTOP"),
            Err(ParseError::JumpOutOfRange { line: 1, target: 3 })
        );
        assert!(matches!(
            parse_program("PUSH 1\nJUMP -1"),
            Err(ParseError::JumpOutOfRange { target: -1, .. })
        ));
    }

    #[test]
    fn test_unresolved_label() {
        assert_eq!(
            parse_program("PUSH 1\nJUMP nowhere"),
            Err(ParseError::UnresolvedLabel {
                line: 2,
                label: "nowhere".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_label() {
        let source = "here:\nPUSH 1\nhere:\nSTOP";
        assert_eq!(
            parse_program(source),
            Err(ParseError::DuplicateLabel {
                line: 3,
                label: "here".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_operand() {
        assert_eq!(
            parse_program("PUSH abc"),
            Err(ParseError::MalformedOperand {
                line: 1,
                opcode: "PUSH".to_string(),
                token: "abc".to_string()
            })
        );
        // Shift amounts must be non-negative
        assert!(matches!(
            parse_program("LSHIFT -2"),
            Err(ParseError::MalformedOperand { .. })
        ));
    }

    #[test]
    fn test_missing_operand() {
        assert_eq!(
            parse_program("PUSH"),
            Err(ParseError::MissingOperand {
                line: 1,
                opcode: "PUSH".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_instruction() {
        assert_eq!(
            parse_program("FROB 1"),
            Err(ParseError::UnknownInstruction {
                line: 1,
                opcode: "FROB".to_string()
            })
        );
    }

    #[test]
    fn test_colon_in_operand_is_not_a_label() {
        // The whole trimmed line must match `identifier:` to count as one
        let program = parse_program("STORE x:");
        assert!(program.is_ok());
        assert_eq!(
            program.unwrap().instructions[0],
            Instruction::Store("x:".to_string())
        );
    }

    #[test]
    fn test_label_must_be_alone_on_its_line() {
        // `loop: PUSH 1` is not a label line; `loop:` is not an opcode either
        assert!(matches!(
            parse_program("loop: PUSH 1"),
            Err(ParseError::UnknownInstruction { .. })
        ));
    }
}
