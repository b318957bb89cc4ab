//! Splice, bitwise and shift operations, enabled in Elements in every script version.

use crate::constants::MAX_SCRIPT_ELEMENT_SIZE;
use crate::error::Error;
use crate::stack::{Stack, StackError};

/// OP_CAT: (x1 x2 -- x1x2)
pub(super) fn cat(stack: &mut Stack) -> Result<(), Error> {
    stack.require(2)?;

    if stack.top(1)?.len() + stack.top(0)?.len() > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(Error::InvalidStackOperation);
    }

    let tail = stack.pop()?;
    stack.top_mut(0)?.extend_from_slice(&tail);

    Ok(())
}

/// OP_SUBSTR and OP_SUBSTR_LAZY: (in begin size -- out)
///
/// The lazy variant clamps out of range arguments instead of failing.
pub(super) fn substr(stack: &mut Stack, lazy: bool) -> Result<(), Error> {
    stack.require(3)?;

    let data_len = stack.top(2)?.len() as i64;
    let mut start = stack.num_at(1)?.value();
    let mut length = stack.num_at(0)?.value();

    if lazy {
        start = start.max(0);
        length = length.clamp(0, MAX_SCRIPT_ELEMENT_SIZE as i64);

        if start >= data_len {
            stack.drop(3)?;
            stack.push(Vec::new());
            return Ok(());
        }

        if start + length > data_len {
            length = data_len - start;
        }
    }

    if length < 0 || start < 0 || start >= data_len || start + length > data_len {
        return Err(Error::InvalidStackOperation);
    }

    stack.drop(2)?;
    let data = stack.pop()?;
    stack.push(data[start as usize..(start + length) as usize].to_vec());

    Ok(())
}

/// OP_LEFT keeps the first `n` bytes, OP_RIGHT drops them: (in n -- out)
pub(super) fn left_right(stack: &mut Stack, left: bool) -> Result<(), Error> {
    stack.require(2)?;

    let n = stack.num_at(0)?.value();
    if n < 0 {
        return Err(Error::Unknown);
    }

    stack.drop(1)?;
    let data = stack.pop()?;
    let n = usize::try_from(n).unwrap_or(usize::MAX).min(data.len());

    stack.push(if left {
        data[..n].to_vec()
    } else {
        data[n..].to_vec()
    });

    Ok(())
}

/// OP_LSHIFT: shifts a little-endian bit string towards the more significant end.
pub(super) fn lshift(stack: &mut Stack) -> Result<(), Error> {
    stack.require(2)?;

    let shift = stack.num_at(0)?.value();
    if shift < 0 {
        return Err(Error::InvalidStackOperation);
    }

    let full_bytes = (shift / 8) as usize;
    let bits = (shift % 8) as u32;
    let data_len = stack.top(1)?.len();

    if data_len + full_bytes + usize::from(bits != 0) > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(Error::InvalidStackOperation);
    }

    stack.drop(1)?;
    let data = stack.pop()?;

    let mut out = Vec::with_capacity(data_len + full_bytes + 1);
    out.resize(full_bytes, 0);
    out.extend_from_slice(&data);
    out.push(0);

    let mut carry = 0u16;
    for byte in out.iter_mut() {
        carry = (u16::from(*byte) << bits) | (carry >> 8);
        *byte = carry as u8;
    }

    trim_trailing_zeros(&mut out);
    stack.push(out);

    Ok(())
}

/// OP_RSHIFT: shifts a little-endian bit string towards the less significant end.
pub(super) fn rshift(stack: &mut Stack) -> Result<(), Error> {
    stack.require(2)?;

    let shift = stack.num_at(0)?.value();
    if shift < 0 {
        return Err(Error::Unknown);
    }

    let full_bytes = (shift / 8) as usize;
    let bits = (shift % 8) as u32;

    stack.drop(1)?;
    let data = stack.pop()?;

    if full_bytes >= data.len() {
        stack.push(Vec::new());
        return Ok(());
    }

    let mut out = data[full_bytes..].to_vec();
    let mut carry = 0u16;
    for byte in out.iter_mut().rev() {
        carry = (u16::from(*byte) << (8 - bits)) | ((carry << 8) & 0xff00);
        *byte = (carry >> 8) as u8;
    }

    trim_trailing_zeros(&mut out);
    stack.push(out);

    Ok(())
}

fn trim_trailing_zeros(data: &mut Vec<u8>) {
    while data.last() == Some(&0) {
        data.pop();
    }
}

/// OP_INVERT: flips every bit of the top item.
pub(super) fn invert(stack: &mut Stack) -> Result<(), Error> {
    stack.top_mut(0)?.iter_mut().for_each(|b| *b = !*b);
    Ok(())
}

/// OP_AND, OP_OR and OP_XOR on two items of equal size.
pub(super) fn bitwise(stack: &mut Stack, op: impl Fn(u8, u8) -> u8) -> Result<(), Error> {
    stack.require(2)?;

    if stack.top(0)?.len() != stack.top(1)?.len() {
        return Err(StackError::InvalidOperation.into());
    }

    let x2 = stack.pop()?;
    let x1 = stack.top_mut(0)?;
    for (a, b) in x1.iter_mut().zip(x2) {
        *a = op(*a, b);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(items: &[&[u8]]) -> Stack {
        items.iter().map(|i| i.to_vec()).collect::<Vec<_>>().into()
    }

    #[test]
    fn cat_respects_element_size() {
        let mut s = stack(&[b"ab", b"cd"]);
        cat(&mut s).unwrap();
        assert_eq!(s, stack(&[b"abcd"]));

        let big = vec![0u8; 300];
        let mut s = stack(&[&big, &big]);
        assert_eq!(cat(&mut s), Err(Error::InvalidStackOperation));
    }

    #[test]
    fn substr_strict_and_lazy() {
        let mut s = stack(&[b"hello", &[1], &[3]]);
        substr(&mut s, false).unwrap();
        assert_eq!(s, stack(&[b"ell"]));

        let mut s = stack(&[b"hello", &[3], &[3]]);
        assert_eq!(substr(&mut s, false), Err(Error::InvalidStackOperation));

        let mut s = stack(&[b"hello", &[3], &[3]]);
        substr(&mut s, true).unwrap();
        assert_eq!(s, stack(&[b"lo"]));

        // Negative start clamps to zero.
        let mut s = stack(&[b"hello", &[0x81], &[2]]);
        substr(&mut s, true).unwrap();
        assert_eq!(s, stack(&[b"he"]));

        let mut s = stack(&[b"hello", &[5], &[1]]);
        substr(&mut s, true).unwrap();
        assert_eq!(s, stack(&[b""]));
    }

    #[test]
    fn left_and_right() {
        let mut s = stack(&[b"hello", &[2]]);
        left_right(&mut s, true).unwrap();
        assert_eq!(s, stack(&[b"he"]));

        let mut s = stack(&[b"hello", &[2]]);
        left_right(&mut s, false).unwrap();
        assert_eq!(s, stack(&[b"llo"]));

        let mut s = stack(&[b"hello", &[9]]);
        left_right(&mut s, true).unwrap();
        assert_eq!(s, stack(&[b"hello"]));

        let mut s = stack(&[b"hello", &[9]]);
        left_right(&mut s, false).unwrap();
        assert_eq!(s, stack(&[b""]));

        let mut s = stack(&[b"hello", &[0x81]]);
        assert_eq!(left_right(&mut s, true), Err(Error::Unknown));
    }

    #[test]
    fn shifts_are_little_endian() {
        let mut s = stack(&[&[0x01], &[9]]);
        lshift(&mut s).unwrap();
        assert_eq!(s, stack(&[&[0x00, 0x02]]));

        let mut s = stack(&[&[0x80], &[1]]);
        lshift(&mut s).unwrap();
        assert_eq!(s, stack(&[&[0x00, 0x01]]));

        let mut s = stack(&[&[0x00, 0x01], &[1]]);
        rshift(&mut s).unwrap();
        assert_eq!(s, stack(&[&[0x80]]));

        let mut s = stack(&[&[0x00, 0x02], &[9]]);
        rshift(&mut s).unwrap();
        assert_eq!(s, stack(&[&[0x01]]));

        let mut s = stack(&[&[0xff], &[8]]);
        rshift(&mut s).unwrap();
        assert_eq!(s, stack(&[b""]));

        let mut s = stack(&[&[0xff], &[0x81]]);
        assert_eq!(lshift(&mut s), Err(Error::InvalidStackOperation));
        let mut s = stack(&[&[0xff], &[0x81]]);
        assert_eq!(rshift(&mut s), Err(Error::Unknown));
    }

    #[test]
    fn bitwise_requires_equal_sizes() {
        let mut s = stack(&[&[0b1100], &[0b1010]]);
        bitwise(&mut s, |a, b| a ^ b).unwrap();
        assert_eq!(s, stack(&[&[0b0110]]));

        let mut s = stack(&[&[1, 2], &[1]]);
        assert_eq!(bitwise(&mut s, |a, b| a & b), Err(Error::InvalidStackOperation));

        let mut s = stack(&[&[0x0f, 0xf0]]);
        invert(&mut s).unwrap();
        assert_eq!(s, stack(&[&[0xf0, 0x0f]]));
    }
}
