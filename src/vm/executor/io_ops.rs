// I/O Unit: console reads and prints bridging the VM to the terminal

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::vm::error::VmFault;
use crate::vm::stack::Stack;

/// Whitespace-delimited token reader over a buffered input stream. Each
/// READ-family instruction consumes exactly one token; a read blocks the
/// whole execution loop until input arrives.
pub struct TokenReader<R> {
    inner: R,
    pending: VecDeque<String>,
}

impl<R: BufRead> TokenReader<R> {
    pub fn new(inner: R) -> Self {
        TokenReader {
            inner,
            pending: VecDeque::new(),
        }
    }

    pub fn next_token(&mut self) -> Result<String, VmFault> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }
            let mut line = String::new();
            let read = self
                .inner
                .read_line(&mut line)
                .map_err(|_| VmFault::IoError)?;
            if read == 0 {
                return Err(VmFault::EndOfInput);
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_string));
        }
    }
}

/// Writes the top of the stack without popping; flushed so a prompt is
/// visible before a blocking read.
pub fn print<W: Write>(stack: &Stack, out: &mut W) -> Result<(), VmFault> {
    let value = stack.peek()?;
    write!(out, "{value}").map_err(|_| VmFault::IoError)?;
    out.flush().map_err(|_| VmFault::IoError)
}

pub fn print_line<W: Write>(stack: &Stack, out: &mut W) -> Result<(), VmFault> {
    let value = stack.peek()?;
    writeln!(out, "{value}").map_err(|_| VmFault::IoError)
}

/// Writes the top of the stack interpreted as a character.
pub fn print_char<W: Write>(stack: &Stack, out: &mut W) -> Result<(), VmFault> {
    let value = stack.peek()?;
    let c = u32::try_from(value)
        .ok()
        .and_then(char::from_u32)
        .ok_or(VmFault::InvalidCharacter(value))?;
    write!(out, "{c}").map_err(|_| VmFault::IoError)?;
    out.flush().map_err(|_| VmFault::IoError)
}

/// Reads one token and pushes it as an integer.
pub fn read<R: BufRead>(stack: &mut Stack, input: &mut TokenReader<R>) -> Result<(), VmFault> {
    let token = input.next_token()?;
    let value: i64 = token.parse().map_err(|_| VmFault::MalformedInput)?;
    log::debug!(target: "io", "READ {value}");
    stack.push(value);
    Ok(())
}

/// Reads one token and pushes its first character's code point.
pub fn read_char<R: BufRead>(stack: &mut Stack, input: &mut TokenReader<R>) -> Result<(), VmFault> {
    let token = input.next_token()?;
    let c = token.chars().next().ok_or(VmFault::MalformedInput)?;
    log::debug!(target: "io", "READC {c:?}");
    stack.push(c as i64);
    Ok(())
}

/// Reads one token as a float and pushes it truncated toward zero.
pub fn read_float<R: BufRead>(stack: &mut Stack, input: &mut TokenReader<R>) -> Result<(), VmFault> {
    let token = input.next_token()?;
    let value: f64 = token.parse().map_err(|_| VmFault::MalformedInput)?;
    log::debug!(target: "io", "READF {value}");
    stack.push(value as i64);
    Ok(())
}

/// Diagnostic rendering of the full stack, bottom to top.
pub fn dump<W: Write>(stack: &Stack, out: &mut W) -> Result<(), VmFault> {
    writeln!(out, "Stack: {:?}", stack.view()).map_err(|_| VmFault::IoError)
}
