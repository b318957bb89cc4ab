//! Streaming SHA256 opcodes.
//!
//! A context lives on the stack as `midstate (32) || pending bytes (0..64) || total bits (8, BE)`.

use crate::error::Error;
use crate::stack::Stack;
use bitcoin::hashes::{Hash, HashEngine, sha256};

const MIDSTATE_SIZE: usize = 32;
const COUNTER_SIZE: usize = 8;
const BLOCK_SIZE: u64 = 64;
const MAX_HASHED_BYTES: u64 = (1 << 61) - 1;

struct Sha256Context {
    engine: sha256::HashEngine,
    /// Bytes fed since the last full block.
    pending: Vec<u8>,
    total: u64,
}

impl Sha256Context {
    fn new() -> Self {
        Self {
            engine: sha256::HashEngine::default(),
            pending: Vec::new(),
            total: 0,
        }
    }

    fn load(item: &[u8]) -> Result<Self, Error> {
        let min = MIDSTATE_SIZE + COUNTER_SIZE;
        if item.len() < min || item.len() >= min + BLOCK_SIZE as usize {
            return Err(Error::Sha2ContextLoad);
        }

        let (midstate, rest) = item.split_at(MIDSTATE_SIZE);
        let (pending, counter) = rest.split_at(rest.len() - COUNTER_SIZE);

        let mut bits = [0u8; COUNTER_SIZE];
        bits.copy_from_slice(counter);
        let bits = u64::from_be_bytes(bits);

        if bits % 8 != 0 {
            return Err(Error::Sha2ContextLoad);
        }
        let total = bits / 8;
        if total % BLOCK_SIZE != pending.len() as u64 {
            return Err(Error::Sha2ContextLoad);
        }

        let mut state = [0u8; MIDSTATE_SIZE];
        state.copy_from_slice(midstate);
        let hashed_blocks =
            usize::try_from(total - pending.len() as u64).map_err(|_| Error::Sha2ContextLoad)?;

        let mut engine = sha256::HashEngine::from_midstate(
            sha256::Midstate::from_byte_array(state),
            hashed_blocks,
        );
        engine.input(pending);

        Ok(Self {
            engine,
            pending: pending.to_vec(),
            total,
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        let total = self
            .total
            .checked_add(data.len() as u64)
            .filter(|&total| total <= MAX_HASHED_BYTES)
            .ok_or(Error::Sha2ContextWrite)?;

        self.engine.input(data);
        self.pending.extend_from_slice(data);
        let keep = (total % BLOCK_SIZE) as usize;
        self.pending.drain(..self.pending.len() - keep);
        self.total = total;

        Ok(())
    }

    fn save(&self) -> Vec<u8> {
        let mut item = Vec::with_capacity(MIDSTATE_SIZE + self.pending.len() + COUNTER_SIZE);
        item.extend_from_slice(&self.engine.midstate().to_byte_array());
        item.extend_from_slice(&self.pending);
        item.extend_from_slice(&(self.total * 8).to_be_bytes());
        item
    }

    fn finalize(self) -> [u8; 32] {
        sha256::Hash::from_engine(self.engine).to_byte_array()
    }
}

/// OP_SHA256INITIALIZE: (in -- ctx)
pub(super) fn initialize(stack: &mut Stack) -> Result<(), Error> {
    stack.require(1)?;

    let data = stack.pop()?;
    let mut ctx = Sha256Context::new();
    ctx.write(&data)?;
    stack.push(ctx.save());

    Ok(())
}

/// OP_SHA256UPDATE: (ctx in -- ctx)
pub(super) fn update(stack: &mut Stack) -> Result<(), Error> {
    stack.require(2)?;

    let mut ctx = Sha256Context::load(stack.top(1)?)?;
    ctx.write(stack.top(0)?)?;

    stack.drop(2)?;
    stack.push(ctx.save());

    Ok(())
}

/// OP_SHA256FINALIZE: (ctx in -- hash)
pub(super) fn finalize(stack: &mut Stack) -> Result<(), Error> {
    stack.require(2)?;

    let mut ctx = Sha256Context::load(stack.top(1)?)?;
    ctx.write(stack.top(0)?)?;

    stack.drop(2)?;
    stack.push(ctx.finalize().to_vec());

    Ok(())
}
