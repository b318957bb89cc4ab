use crate::VerifyFlags;
use crate::num::{NumError, ScriptNum};
use std::fmt::Display;
use std::ops::{Deref, DerefMut};

/// Stack error type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum StackError {
    #[error("invalid stack operation")]
    InvalidOperation,
    #[error(transparent)]
    Num(#[from] NumError),
}

type Result<T> = std::result::Result<T, StackError>;

/// Main stack and alt stack of one script evaluation.
///
/// Every accessor checks the depth first and reports [`StackError::InvalidOperation`]
/// instead of panicking, so a malformed script can never abort the evaluator.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Stack {
    items: Vec<Vec<u8>>,
    require_minimal: bool,
}

impl Display for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            if item.is_empty() {
                write!(f, "<>")?;
            } else {
                write!(f, "{}", hex::encode(item))?;
            }
        }
        write!(f, "]")
    }
}

impl Deref for Stack {
    type Target = Vec<Vec<u8>>;

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl DerefMut for Stack {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.items
    }
}

impl From<Vec<Vec<u8>>> for Stack {
    fn from(items: Vec<Vec<u8>>) -> Self {
        Self {
            items,
            require_minimal: false,
        }
    }
}

impl Stack {
    pub fn new(items: Vec<Vec<u8>>, require_minimal: bool) -> Self {
        Self {
            items,
            require_minimal,
        }
    }

    /// Empty stack whose numeric reads follow the MINIMALDATA flag.
    pub fn with_flags(flags: &VerifyFlags) -> Self {
        Self::new(Vec::new(), flags.verify_minimaldata())
    }

    pub fn set_require_minimal(&mut self, require_minimal: bool) {
        self.require_minimal = require_minimal;
    }

    pub fn into_inner(self) -> Vec<Vec<u8>> {
        self.items
    }

    /// Ensure there are at least `n` elements on the stack.
    #[inline]
    pub fn require(&self, n: usize) -> Result<()> {
        if self.items.len() < n {
            return Err(StackError::InvalidOperation);
        }
        Ok(())
    }

    /// Returns the element `i` positions below the top, `top(0)` being the top itself.
    #[inline]
    pub fn top(&self, i: usize) -> Result<&Vec<u8>> {
        self.require(i + 1)?;
        Ok(&self.items[self.items.len() - 1 - i])
    }

    #[inline]
    pub fn top_mut(&mut self, i: usize) -> Result<&mut Vec<u8>> {
        self.require(i + 1)?;
        let pos = self.items.len() - 1 - i;
        Ok(&mut self.items[pos])
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Vec<u8>> {
        self.items.pop().ok_or(StackError::InvalidOperation)
    }

    #[inline]
    pub fn push(&mut self, item: Vec<u8>) {
        self.items.push(item);
    }

    /// Decodes the element `i` positions below the top as a default-sized script number.
    #[inline]
    pub fn num_at(&self, i: usize) -> Result<ScriptNum> {
        self.num_at_with_max_size(i, ScriptNum::DEFAULT_MAX_SIZE)
    }

    #[inline]
    pub fn num_at_with_max_size(&self, i: usize, max_size: usize) -> Result<ScriptNum> {
        Ok(ScriptNum::decode(
            self.top(i)?,
            self.require_minimal,
            max_size,
        )?)
    }

    #[inline]
    pub fn pop_num(&mut self) -> Result<ScriptNum> {
        let num = self.num_at(0)?;
        self.items.pop();
        Ok(num)
    }

    #[inline]
    pub fn peek_bool(&self) -> Result<bool> {
        Ok(cast_to_bool(self.top(0)?))
    }

    #[inline]
    pub fn pop_bool(&mut self) -> Result<bool> {
        Ok(cast_to_bool(&self.pop()?))
    }

    /// Removes and returns the element `i` positions below the top.
    #[inline]
    pub fn remove(&mut self, i: usize) -> Result<Vec<u8>> {
        self.require(i + 1)?;
        let pos = self.items.len() - 1 - i;
        Ok(self.items.remove(pos))
    }

    /// Removes the top `n` items.
    #[inline]
    pub fn drop(&mut self, n: usize) -> Result<()> {
        self.require(n)?;
        self.items.truncate(self.items.len() - n);
        Ok(())
    }

    /// Copies the top `n` items, preserving their order.
    ///
    /// dup(2): [x1 x2] -> [x1 x2 x1 x2]
    #[inline]
    pub fn dup(&mut self, n: usize) -> Result<()> {
        self.require(n)?;
        let from = self.items.len() - n;
        self.items.extend_from_within(from..);
        Ok(())
    }

    /// Copies the `n` items sitting below the top `n` items.
    ///
    /// over(2): [x1 x2 x3 x4] -> [x1 x2 x3 x4 x1 x2]
    #[inline]
    pub fn over(&mut self, n: usize) -> Result<()> {
        self.require(2 * n)?;
        let from = self.items.len() - 2 * n;
        self.items.extend_from_within(from..from + n);
        Ok(())
    }

    /// Moves the third group of `n` items to the top.
    ///
    /// rot(1): [x1 x2 x3] -> [x2 x3 x1]
    #[inline]
    pub fn rot(&mut self, n: usize) -> Result<()> {
        self.require(3 * n)?;
        let from = self.items.len() - 3 * n;
        self.items[from..].rotate_left(n);
        Ok(())
    }

    /// Exchanges the top group of `n` items with the group below it.
    ///
    /// swap(2): [x1 x2 x3 x4] -> [x3 x4 x1 x2]
    #[inline]
    pub fn swap(&mut self, n: usize) -> Result<()> {
        self.require(2 * n)?;
        let from = self.items.len() - 2 * n;
        self.items[from..].rotate_left(n);
        Ok(())
    }

    /// Removes the second-to-top item.
    #[inline]
    pub fn nip(&mut self) -> Result<()> {
        self.remove(1).map(|_| ())
    }

    /// Copies the top item below the second-to-top item.
    ///
    /// tuck: [x1 x2] -> [x2 x1 x2]
    #[inline]
    pub fn tuck(&mut self) -> Result<()> {
        self.require(2)?;
        let top = self.top(0)?.clone();
        let pos = self.items.len() - 2;
        self.items.insert(pos, top);
        Ok(())
    }

    #[inline]
    pub fn push_num(&mut self, num: impl Into<ScriptNum>) {
        self.items.push(num.into().encode());
    }

    #[inline]
    pub fn push_bool(&mut self, value: bool) {
        self.items.push(if value { vec![1] } else { Vec::new() });
    }
}

/// Converts a stack item to a boolean.
///
/// Any non-zero byte makes the item true, except a lone sign bit in the last byte (negative zero).
pub fn cast_to_bool(data: &[u8]) -> bool {
    match data.split_last() {
        Some((&last, rest)) => rest.iter().any(|&b| b != 0) || (last & 0x7f) != 0,
        None => false,
    }
}
