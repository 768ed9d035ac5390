// Arithmetic/Logic Unit: pops operands, pushes one result, no other side effects

use crate::vm::error::VmFault;
use crate::vm::stack::Stack;

/// Pops `a` (the rightmost source operand) then `b` (the leftmost) and
/// pushes `f(b, a)`, so non-commutative operations keep source order.
fn binary(
    stack: &mut Stack,
    f: impl FnOnce(i64, i64) -> Result<i64, VmFault>,
) -> Result<(), VmFault> {
    let a = stack.pop()?;
    let b = stack.pop()?;
    stack.push(f(b, a)?);
    Ok(())
}

fn unary(stack: &mut Stack, f: impl FnOnce(i64) -> i64) -> Result<(), VmFault> {
    let value = stack.pop()?;
    stack.push(f(value));
    Ok(())
}

pub fn add(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(b.wrapping_add(a)))
}

pub fn sub(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(b.wrapping_sub(a)))
}

pub fn times(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(b.wrapping_mul(a)))
}

pub fn div(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| {
        if a == 0 {
            Err(VmFault::DivisionByZero)
        } else {
            Ok(b.wrapping_div(a))
        }
    })
}

pub fn modulo(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| {
        if a == 0 {
            Err(VmFault::DivisionByZero)
        } else {
            Ok(b.wrapping_rem(a))
        }
    })
}

// Shift amounts are immediate operands, not popped; masked to the word width
pub fn lshift(stack: &mut Stack, amount: u32) -> Result<(), VmFault> {
    unary(stack, |v| v.wrapping_shl(amount))
}

/// Arithmetic right shift (sign-propagating).
pub fn rshift(stack: &mut Stack, amount: u32) -> Result<(), VmFault> {
    unary(stack, |v| v.wrapping_shr(amount))
}

pub fn not(stack: &mut Stack) -> Result<(), VmFault> {
    unary(stack, |v| i64::from(v == 0))
}

pub fn and(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(i64::from(b != 0 && a != 0)))
}

pub fn or(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(i64::from(b != 0 || a != 0)))
}

pub fn xor(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(i64::from((b != 0) != (a != 0))))
}

pub fn nand(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(i64::from(!(b != 0 && a != 0))))
}

pub fn bit_not(stack: &mut Stack) -> Result<(), VmFault> {
    unary(stack, |v| !v)
}

pub fn bit_and(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(b & a))
}

pub fn bit_or(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(b | a))
}

pub fn bit_xor(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(b ^ a))
}

pub fn bit_nand(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(!(b & a)))
}

pub fn greater(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(i64::from(b > a)))
}

pub fn less(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(i64::from(b < a)))
}

pub fn equal(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| Ok(i64::from(b == a)))
}

pub fn is_nil(stack: &mut Stack) -> Result<(), VmFault> {
    unary(stack, |v| i64::from(v == 0))
}

pub fn is_pos(stack: &mut Stack) -> Result<(), VmFault> {
    unary(stack, |v| i64::from(v > 0))
}

pub fn is_neg(stack: &mut Stack) -> Result<(), VmFault> {
    unary(stack, |v| i64::from(v < 0))
}

/// Three-way comparison: -1, 0, or 1 for `b` less than, equal to, or
/// greater than `a`.
pub fn cmp(stack: &mut Stack) -> Result<(), VmFault> {
    binary(stack, |b, a| {
        Ok(match b.cmp(&a) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        })
    })
}
