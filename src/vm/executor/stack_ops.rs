// Stack/Heap Memory Unit: push/pop, symbol table moves, indirect and
// frame-relative addressing, heap allocation

use crate::vm::error::VmFault;
use crate::vm::state::VmState;

pub fn push(state: &mut VmState, value: i64) {
    state.stack.push(value);
}

pub fn pop(state: &mut VmState) -> Result<(), VmFault> {
    state.stack.pop().map(|_| ())
}

pub fn dup(state: &mut VmState) -> Result<(), VmFault> {
    state.stack.dup()
}

pub fn swap(state: &mut VmState) -> Result<(), VmFault> {
    state.stack.swap()
}

/// Moves the top of the stack into the symbol table.
pub fn store(state: &mut VmState, name: &str) -> Result<(), VmFault> {
    let value = state.stack.pop()?;
    state.symbols.insert(name.to_string(), value);
    Ok(())
}

/// Pushes a variable's value from the symbol table.
pub fn load(state: &mut VmState, name: &str) -> Result<(), VmFault> {
    let value = *state
        .symbols
        .get(name)
        .ok_or_else(|| VmFault::UndefinedVariable(name.to_string()))?;
    state.stack.push(value);
    Ok(())
}

/// Pops an offset `m` and pushes the value at position `len - 1 - m`,
/// counted from the top after the pop.
pub fn push_indirect(state: &mut VmState) -> Result<(), VmFault> {
    let offset = state.stack.pop()?;
    let position = state.stack.len() as i64 - 1 - offset;
    if position < 0 || position >= state.stack.len() as i64 {
        return Err(VmFault::InvalidAddress(position));
    }
    let value = state.stack.get(position as usize)?;
    state.stack.push(value);
    Ok(())
}

/// Pops a value, then an offset `m`, and overwrites position `len - 1 - m`
/// (counted after both pops).
pub fn store_indirect(state: &mut VmState) -> Result<(), VmFault> {
    let value = state.stack.pop()?;
    let offset = state.stack.pop()?;
    let position = state.stack.len() as i64 - 1 - offset;
    if position < 0 || position >= state.stack.len() as i64 {
        return Err(VmFault::InvalidAddress(position));
    }
    state.stack.set(position as usize, value)
}

/// Reads the stack at the absolute position `fp + offset` and pushes it.
/// The stack is zero-filled through that position first, so locals are
/// allocated lazily without an explicit frame-size instruction.
pub fn push_offset(state: &mut VmState, offset: i64) -> Result<(), VmFault> {
    let address = state.fp as i64 + offset;
    if address < 0 {
        return Err(VmFault::InvalidAddress(address));
    }
    let address = address as usize;
    state.stack.grow_to(address + 1);
    let value = state.stack.get(address)?;
    state.stack.push(value);
    Ok(())
}

/// Pops a value and writes it at the absolute position `fp + offset`,
/// zero-filling the stack through that position first.
pub fn store_offset(state: &mut VmState, offset: i64) -> Result<(), VmFault> {
    let value = state.stack.pop()?;
    let address = state.fp as i64 + offset;
    if address < 0 {
        return Err(VmFault::InvalidAddress(address));
    }
    let address = address as usize;
    state.stack.grow_to(address + 1);
    state.stack.set(address, value)
}

/// Grows the stack by `count` zero slots, or shrinks it by `|count|` when
/// negative. A shrink past the bottom faults and commits nothing.
pub fn add_sp(state: &mut VmState, count: i64) -> Result<(), VmFault> {
    if count >= 0 {
        for _ in 0..count {
            state.stack.push(0);
        }
        return Ok(());
    }
    let remove = count.unsigned_abs() as usize;
    if remove > state.stack.len() {
        return Err(VmFault::StackUnderflow);
    }
    state.stack.truncate(state.stack.len() - remove);
    Ok(())
}

/// Pops a requested size, reserves `size + 1` heap cells, and pushes the
/// user address.
pub fn malloc(state: &mut VmState) -> Result<(), VmFault> {
    let requested = state.stack.pop()?;
    let user_address = state.heap.alloc(requested)?;
    log::debug!(target: "vm", "MALLOC {requested} -> address {user_address}");
    state.stack.push(user_address);
    Ok(())
}
