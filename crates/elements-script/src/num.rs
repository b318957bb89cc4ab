//! Script numbers and the fixed-width integers used by the 64-bit opcodes.

use std::ops::{Add, Neg, Sub};

/// Script number error type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum NumError {
    #[error("script number exceeds {0} bytes")]
    Overflow(usize),
    #[error("non-minimally encoded script number")]
    NotMinimallyEncoded,
}

/// Signed integer with the little-endian sign-magnitude encoding of script stack items.
///
/// Operands are limited to [`ScriptNum::DEFAULT_MAX_SIZE`] bytes when read from the stack,
/// but results of arithmetic are allowed to grow beyond that range. The inner value is
/// therefore kept as `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ScriptNum(i64);

impl<T: Into<i64>> From<T> for ScriptNum {
    fn from(value: T) -> Self {
        Self(value.into())
    }
}

impl ScriptNum {
    /// Default operand size of numeric opcodes.
    pub const DEFAULT_MAX_SIZE: usize = 4;

    /// Operand size accepted by CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY.
    pub const LOCKTIME_MAX_SIZE: usize = 5;

    /// Decodes a stack item, rejecting items longer than `max_size` and, when
    /// `require_minimal` is set, items carrying redundant padding.
    pub fn decode(data: &[u8], require_minimal: bool, max_size: usize) -> Result<Self, NumError> {
        if data.len() > max_size {
            return Err(NumError::Overflow(max_size));
        }

        if require_minimal && !is_minimally_encoded(data) {
            return Err(NumError::NotMinimallyEncoded);
        }

        let Some((&last, _)) = data.split_last() else {
            return Ok(Self(0));
        };

        let magnitude = data
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, &byte)| acc | (u64::from(byte) << (8 * i)));

        if last & 0x80 != 0 {
            let sign_bit = 0x80u64 << (8 * (data.len() - 1));
            Ok(Self(-((magnitude & !sign_bit) as i64)))
        } else {
            Ok(Self(magnitude as i64))
        }
    }

    /// Minimal encoding of the number.
    pub fn encode(&self) -> Vec<u8> {
        if self.0 == 0 {
            return Vec::new();
        }

        let negative = self.0 < 0;
        let mut magnitude = self.0.unsigned_abs();
        let mut out = Vec::with_capacity(9);

        while magnitude > 0 {
            out.push((magnitude & 0xff) as u8);
            magnitude >>= 8;
        }

        // The most significant byte carries the sign, add one more byte if it is taken.
        let last = out.len() - 1;
        if out[last] & 0x80 != 0 {
            out.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            out[last] |= 0x80;
        }

        out
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// The value saturated into the `i32` range.
    pub fn to_i32(&self) -> i32 {
        self.0.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.wrapping_abs())
    }
}

/// Returns `false` if the encoding has a redundant most significant byte.
pub fn is_minimally_encoded(data: &[u8]) -> bool {
    match data {
        [] => true,
        [.., last] if last & 0x7f != 0 => true,
        // A zero (or bare sign) byte is only needed when the byte before it has the high bit set.
        [.., before, _] => before & 0x80 != 0,
        [_] => false,
    }
}

impl Add for ScriptNum {
    type Output = Result<Self, NumError>;

    fn add(self, rhs: Self) -> Self::Output {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(NumError::Overflow(8))
    }
}

impl Sub for ScriptNum {
    type Output = Result<Self, NumError>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(NumError::Overflow(8))
    }
}

impl Neg for ScriptNum {
    type Output = Result<Self, NumError>;

    fn neg(self) -> Self::Output {
        self.0.checked_neg().map(Self).ok_or(NumError::Overflow(8))
    }
}

/// Reads an exactly 8-byte little-endian signed integer.
pub fn read_le64(data: &[u8]) -> Option<i64> {
    <[u8; 8]>::try_from(data).ok().map(i64::from_le_bytes)
}

/// Reads an exactly 4-byte little-endian signed integer.
pub fn read_le32(data: &[u8]) -> Option<i32> {
    <[u8; 4]>::try_from(data).ok().map(i32::from_le_bytes)
}
