//! 64-bit arithmetic on 8-byte little-endian operands.
//!
//! Overflowing operations leave their operands on the stack and push a false flag,
//! successful ones replace the operands with the result followed by a true flag.

use crate::error::Error;
use crate::num::{ScriptNum, read_le32, read_le64};
use crate::opcode::{
    OP_ADD64, OP_DIV64, OP_GREATERTHAN64, OP_GREATERTHANOREQUAL64, OP_LESSTHAN64,
    OP_LESSTHANOREQUAL64, OP_MUL64, OP_SUB64,
};
use crate::stack::Stack;

fn le64_at(stack: &Stack, i: usize) -> Result<i64, Error> {
    read_le64(stack.top(i)?).ok_or(Error::Expected8Bytes)
}

fn push_le64(stack: &mut Stack, value: i64) {
    stack.push(value.to_le_bytes().to_vec());
}

/// Binary operators: (a b -- out 1 | a b 0), comparisons: (a b -- bool)
pub(super) fn binary(stack: &mut Stack, opcode: u8) -> Result<(), Error> {
    stack.require(2)?;

    let b = le64_at(stack, 0)?;
    let a = le64_at(stack, 1)?;

    let compare = |stack: &mut Stack, result: bool| -> Result<(), Error> {
        stack.drop(2)?;
        stack.push_bool(result);
        Ok(())
    };

    let result = match opcode {
        OP_ADD64 => a.checked_add(b),
        OP_SUB64 => a.checked_sub(b),
        OP_MUL64 => a.checked_mul(b),
        OP_DIV64 => return div(stack, a, b),
        OP_LESSTHAN64 => return compare(stack, a < b),
        OP_LESSTHANOREQUAL64 => return compare(stack, a <= b),
        OP_GREATERTHAN64 => return compare(stack, a > b),
        OP_GREATERTHANOREQUAL64 => return compare(stack, a >= b),
        _ => return Err(Error::BadOpcode),
    };

    match result {
        Some(value) => {
            stack.drop(2)?;
            push_le64(stack, value);
            stack.push_bool(true);
        }
        None => stack.push_bool(false),
    }

    Ok(())
}

/// OP_DIV64: (a b -- r q 1 | a b 0), with the remainder always in `0..|b|`.
fn div(stack: &mut Stack, a: i64, b: i64) -> Result<(), Error> {
    if b == 0 || (b == -1 && a == i64::MIN) {
        stack.push_bool(false);
        return Ok(());
    }

    let mut r = a % b;
    let mut q = a / b;
    if r < 0 && b > 0 {
        r += b;
        q -= 1;
    } else if r < 0 && b < 0 {
        r -= b;
        q += 1;
    }

    stack.drop(2)?;
    push_le64(stack, r);
    push_le64(stack, q);
    stack.push_bool(true);

    Ok(())
}

/// OP_NEG64: (a -- -a 1 | a 0)
pub(super) fn neg(stack: &mut Stack) -> Result<(), Error> {
    stack.require(1)?;

    let a = le64_at(stack, 0)?;
    match a.checked_neg() {
        Some(value) => {
            stack.drop(1)?;
            push_le64(stack, value);
            stack.push_bool(true);
        }
        None => stack.push_bool(false),
    }

    Ok(())
}

/// OP_SCRIPTNUMTOLE64
pub(super) fn script_num_to_le64(stack: &mut Stack) -> Result<(), Error> {
    let num = stack.pop_num()?;
    push_le64(stack, num.value());
    Ok(())
}

/// OP_LE64TOSCRIPTNUM, fails when the result would not fit a regular numeric operand.
pub(super) fn le64_to_script_num(stack: &mut Stack) -> Result<(), Error> {
    stack.require(1)?;

    let encoded = ScriptNum::from(le64_at(stack, 0)?).encode();
    if encoded.len() > ScriptNum::DEFAULT_MAX_SIZE {
        return Err(Error::Arithmetic64);
    }

    stack.drop(1)?;
    stack.push(encoded);
    Ok(())
}

/// OP_LE32TOLE64, zero-extending the unsigned 4-byte operand.
pub(super) fn le32_to_le64(stack: &mut Stack) -> Result<(), Error> {
    stack.require(1)?;

    let num = read_le32(stack.top(0)?).ok_or(Error::Arithmetic64)?;
    stack.drop(1)?;
    push_le64(stack, i64::from(num as u32));
    Ok(())
}
