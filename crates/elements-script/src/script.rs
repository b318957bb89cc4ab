//! Raw script parsing with consensus semantics.

use crate::constants::MAX_PUBKEYS_PER_MULTISIG;
use crate::opcode::{
    OP_0, OP_1, OP_16, OP_CHECKMULTISIG, OP_CHECKMULTISIGVERIFY, OP_CHECKSIG, OP_CHECKSIGVERIFY,
    OP_CODESEPARATOR, OP_EQUAL, OP_HASH160, OP_INVALIDOPCODE, OP_PUSHDATA1, OP_PUSHDATA2,
    OP_PUSHDATA4,
};

/// One decoded opcode together with its push payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op<'a> {
    /// Offset of the opcode byte.
    pub pos: usize,
    pub opcode: u8,
    /// Payload of a push opcode, empty otherwise.
    pub data: &'a [u8],
}

/// Returned when a push runs past the end of the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("truncated push at offset {0}")]
pub struct TruncatedPush(pub usize);

/// Iterator over the opcodes of a script.
///
/// After a [`TruncatedPush`] the iterator is exhausted and [`Instructions::pc`] stays where
/// the parser stopped reading, which the legacy sighash serializer depends on.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    script: &'a [u8],
    pc: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(script: &'a [u8]) -> Self {
        Self {
            script,
            pc: 0,
            failed: false,
        }
    }

    /// Offset of the next opcode to decode.
    pub fn pc(&self) -> usize {
        self.pc
    }

    fn read_len(&mut self, width: usize) -> Option<usize> {
        let bytes = self.script.get(self.pc..self.pc + width)?;
        self.pc += width;
        Some(
            bytes
                .iter()
                .rev()
                .fold(0usize, |acc, &b| (acc << 8) | usize::from(b)),
        )
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Op<'a>, TruncatedPush>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.script.len() {
            return None;
        }

        let pos = self.pc;
        let opcode = self.script[pos];
        self.pc += 1;

        if opcode > OP_PUSHDATA4 {
            return Some(Ok(Op {
                pos,
                opcode,
                data: &[],
            }));
        }

        let len = match opcode {
            OP_PUSHDATA1 => self.read_len(1),
            OP_PUSHDATA2 => self.read_len(2),
            OP_PUSHDATA4 => self.read_len(4),
            direct => Some(usize::from(direct)),
        };

        let data = len.and_then(|len| {
            let end = self.pc.checked_add(len)?;
            self.script.get(self.pc..end)
        });

        match data {
            Some(data) => {
                self.pc += data.len();
                Some(Ok(Op { pos, opcode, data }))
            }
            None => {
                self.failed = true;
                Some(Err(TruncatedPush(pos)))
            }
        }
    }
}

/// Decodes OP_1..OP_16 (and OP_0) into the small integer it pushes.
pub fn decode_op_n(opcode: u8) -> Option<u8> {
    match opcode {
        OP_0 => Some(0),
        OP_1..=OP_16 => Some(opcode - OP_1 + 1),
        _ => None,
    }
}

/// Whether `data` pushed with `opcode` uses the shortest possible encoding.
pub fn check_minimal_push(data: &[u8], opcode: u8) -> bool {
    match data {
        // Should have used OP_0.
        [] => opcode == OP_0,
        // Should have used OP_1 .. OP_16.
        [b] if (1..=16).contains(b) => false,
        // Should have used OP_1NEGATE.
        [0x81] => false,
        _ if data.len() <= 75 => usize::from(opcode) == data.len(),
        _ if data.len() <= 255 => opcode == OP_PUSHDATA1,
        _ if data.len() <= 65535 => opcode == OP_PUSHDATA2,
        _ => true,
    }
}

/// Serializes `data` as a single push, as `CScript() << data` would.
pub fn push_data(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5);
    let len = data.len();
    if len < usize::from(OP_PUSHDATA1) {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// Removes every occurrence of `pattern` that starts on an opcode boundary, returning
/// the number of removed occurrences.
pub fn find_and_delete(script: &mut Vec<u8>, pattern: &[u8]) -> usize {
    if pattern.is_empty() {
        return 0;
    }

    let mut found = 0;
    let mut result = Vec::with_capacity(script.len());
    let mut kept_from = 0;
    let mut iter = Instructions::new(script);

    loop {
        let mut pc = iter.pc();
        result.extend_from_slice(&script[kept_from..pc]);
        while script[pc..].starts_with(pattern) {
            pc += pattern.len();
            found += 1;
        }
        kept_from = pc;

        iter = Instructions {
            script,
            pc,
            failed: false,
        };
        match iter.next() {
            Some(Ok(_)) => {}
            _ => break,
        }
    }

    if found > 0 {
        result.extend_from_slice(&script[kept_from..]);
        *script = result;
    }

    found
}

/// Whether every opcode is a push (OP_1NEGATE, OP_RESERVED and OP_1..OP_16 included).
pub fn is_push_only(script: &[u8]) -> bool {
    Instructions::new(script).all(|op| matches!(op, Ok(op) if op.opcode <= OP_16))
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`.
pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// Splits a witness program into its version and program bytes.
///
/// A witness program is a one-byte version push followed by a single direct push of
/// 2 to 40 bytes, and nothing else.
pub fn witness_program(script: &[u8]) -> Option<(u8, &[u8])> {
    if !(4..=42).contains(&script.len()) {
        return None;
    }
    let version = match script[0] {
        OP_0 => 0,
        op @ OP_1..=OP_16 => op - OP_1 + 1,
        _ => return None,
    };
    (usize::from(script[1]) + 2 == script.len()).then(|| (version, &script[2..]))
}

/// Legacy sigop counting.
///
/// With `accurate` set, a CHECKMULTISIG preceded by OP_1..OP_16 counts that many keys
/// instead of the maximum.
pub fn sigop_count(script: &[u8], accurate: bool) -> usize {
    let mut count = 0;
    let mut last_opcode = OP_INVALIDOPCODE;

    for op in Instructions::new(script) {
        let Ok(op) = op else { break };
        match op.opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                count += match decode_op_n(last_opcode) {
                    Some(n) if accurate && last_opcode >= OP_1 => usize::from(n),
                    _ => MAX_PUBKEYS_PER_MULTISIG as usize,
                };
            }
            _ => {}
        }
        last_opcode = op.opcode;
    }

    count
}

/// Script code with every OP_CODESEPARATOR removed, as committed to by the legacy sighash.
///
/// The returned length prefix counts the separators the way the consensus serializer does,
/// which differs from `bytes.len()` only for scripts with a truncated trailing push.
pub(crate) fn strip_codeseparators(script: &[u8]) -> (usize, Vec<u8>) {
    let mut separators = 0;
    let mut out = Vec::with_capacity(script.len());
    let mut segment_start = 0;
    let mut iter = Instructions::new(script);

    while let Some(Ok(op)) = iter.next() {
        if op.opcode == OP_CODESEPARATOR {
            separators += 1;
            out.extend_from_slice(&script[segment_start..op.pos]);
            segment_start = iter.pc();
        }
    }

    if segment_start < script.len() {
        out.extend_from_slice(&script[segment_start..iter.pc().max(segment_start)]);
    }

    (script.len() - separators, out)
}
