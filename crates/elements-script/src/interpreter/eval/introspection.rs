//! Transaction introspection opcodes of Elements tapscript.
//!
//! Confidential fields are pushed as two items, the payload first and the one-byte
//! prefix on top, so scripts can branch on the prefix before touching the payload.

use crate::constants::MAX_SERIALIZED_SIZE;
use crate::error::Error;
use crate::opcode::{
    OP_INSPECTINPUTASSET, OP_INSPECTINPUTISSUANCE, OP_INSPECTINPUTOUTPOINT,
    OP_INSPECTINPUTSCRIPTPUBKEY, OP_INSPECTINPUTSEQUENCE, OP_INSPECTINPUTVALUE,
    OP_INSPECTLOCKTIME, OP_INSPECTNUMINPUTS, OP_INSPECTNUMOUTPUTS, OP_INSPECTOUTPUTASSET,
    OP_INSPECTOUTPUTNONCE, OP_INSPECTOUTPUTSCRIPTPUBKEY, OP_INSPECTOUTPUTVALUE,
    OP_INSPECTVERSION, OP_TXWEIGHT,
};
use crate::script::witness_program;
use crate::sighash::PrecomputedTransactionData;
use crate::signature_checker::SignatureChecker;
use crate::stack::Stack;
use crate::transaction::{Asset, Transaction, Value};
use bitcoin::hashes::{Hash, sha256};

fn push_asset(stack: &mut Stack, asset: &Asset) -> Result<(), Error> {
    // Consensus rules never let a null asset into a transaction.
    let commitment = asset.commitment();
    let Some((&prefix, payload)) = commitment.split_first() else {
        return Err(Error::Unknown);
    };
    stack.push(payload.to_vec());
    stack.push(vec![prefix]);
    Ok(())
}

fn push_value(stack: &mut Stack, value: &Value) {
    match value {
        Value::Null => {
            stack.push(vec![0; 8]);
            stack.push(vec![0x01]);
        }
        Value::Explicit(amount) => {
            stack.push(amount.to_le_bytes().to_vec());
            stack.push(vec![0x01]);
        }
        Value::Confidential(commitment) => {
            stack.push(commitment[1..].to_vec());
            stack.push(vec![commitment[0]]);
        }
    }
}

/// Witness programs are pushed as program and version, anything else as its SHA256 and -1.
fn push_script_pubkey(stack: &mut Stack, script_pubkey: &[u8], hash: &sha256::Hash) {
    match witness_program(script_pubkey) {
        Some((version, program)) => {
            stack.push(program.to_vec());
            stack.push_num(version);
        }
        None => {
            stack.push(hash.to_byte_array().to_vec());
            stack.push_num(-1);
        }
    }
}

/// Transaction and Taproot digests, or [`Error::IntrospectContextUnavailable`].
fn context<SC: SignatureChecker + ?Sized>(
    checker: &SC,
) -> Result<(&Transaction, &PrecomputedTransactionData), Error> {
    match (checker.transaction(), checker.precomputed()) {
        (Some(tx), Some(cache)) if cache.taproot_ready() => Ok((tx, cache)),
        _ => Err(Error::IntrospectContextUnavailable),
    }
}

/// Pops the index operand of the input and output inspection opcodes.
fn pop_index(stack: &mut Stack) -> Result<i32, Error> {
    let index = stack.num_at(0)?.to_i32();
    stack.pop()?;
    Ok(index)
}

fn check_bounds(index: i32, len: usize) -> Result<usize, Error> {
    usize::try_from(index)
        .ok()
        .filter(|&index| index < len)
        .ok_or(Error::IntrospectIndexOutOfBounds)
}

/// (index -- fields...) for the OP_INSPECTINPUT* family.
pub(super) fn inspect_input<SC: SignatureChecker + ?Sized>(
    stack: &mut Stack,
    opcode: u8,
    checker: &SC,
) -> Result<(), Error> {
    let index = pop_index(stack)?;
    let (tx, cache) = context(checker)?;
    let index = check_bounds(index, tx.input.len())?;

    let input = &tx.input[index];
    let spent_output = cache.spent_output(index).ok_or(Error::Unknown)?;

    match opcode {
        OP_INSPECTINPUTOUTPOINT => {
            stack.push(input.previous_output.txid.to_byte_array().to_vec());
            stack.push(input.previous_output.vout.to_le_bytes().to_vec());
            stack.push(vec![input.outpoint_flag()]);
        }
        OP_INSPECTINPUTASSET => push_asset(stack, &spent_output.asset)?,
        OP_INSPECTINPUTVALUE => push_value(stack, &spent_output.value),
        OP_INSPECTINPUTSCRIPTPUBKEY => {
            let hash = cache.spent_script_pubkey_hash(index).ok_or(Error::Unknown)?;
            push_script_pubkey(stack, spent_output.script_pubkey.as_bytes(), hash);
        }
        OP_INSPECTINPUTSEQUENCE => stack.push(input.sequence.to_le_bytes().to_vec()),
        OP_INSPECTINPUTISSUANCE => {
            let issuance = &input.asset_issuance;
            if issuance.is_null() {
                stack.push(Vec::new());
            } else {
                // The blinding nonce ends up on top, the top is only empty without issuance.
                push_value(stack, &issuance.inflation_keys);
                push_value(stack, &issuance.amount);
                stack.push(issuance.asset_entropy.to_vec());
                stack.push(issuance.asset_blinding_nonce.to_vec());
            }
        }
        _ => return Err(Error::BadOpcode),
    }

    Ok(())
}

/// (index -- fields...) for the OP_INSPECTOUTPUT* family.
pub(super) fn inspect_output<SC: SignatureChecker + ?Sized>(
    stack: &mut Stack,
    opcode: u8,
    checker: &SC,
) -> Result<(), Error> {
    let index = pop_index(stack)?;
    let (tx, cache) = context(checker)?;
    let index = check_bounds(index, tx.output.len())?;

    let output = &tx.output[index];

    match opcode {
        OP_INSPECTOUTPUTASSET => push_asset(stack, &output.asset)?,
        OP_INSPECTOUTPUTVALUE => push_value(stack, &output.value),
        OP_INSPECTOUTPUTNONCE => stack.push(output.nonce.commitment()),
        OP_INSPECTOUTPUTSCRIPTPUBKEY => {
            let hash = cache.output_script_pubkey_hash(index).ok_or(Error::Unknown)?;
            push_script_pubkey(stack, output.script_pubkey.as_bytes(), hash);
        }
        _ => return Err(Error::BadOpcode),
    }

    Ok(())
}

/// Whole-transaction fields: version, lock time, input and output counts, weight.
pub(super) fn inspect_tx<SC: SignatureChecker + ?Sized>(
    stack: &mut Stack,
    opcode: u8,
    checker: &SC,
) -> Result<(), Error> {
    let tx = || {
        checker
            .transaction()
            .ok_or(Error::IntrospectContextUnavailable)
    };

    match opcode {
        OP_INSPECTVERSION => stack.push(tx()?.version.to_le_bytes().to_vec()),
        OP_INSPECTLOCKTIME => stack.push(tx()?.lock_time.to_le_bytes().to_vec()),
        OP_INSPECTNUMINPUTS => stack.push_num(tx()?.input.len() as i64),
        OP_INSPECTNUMOUTPUTS => stack.push_num(tx()?.output.len() as i64),
        OP_TXWEIGHT => {
            let weight = checker
                .precomputed()
                .and_then(PrecomputedTransactionData::tx_weight)
                .ok_or(Error::IntrospectContextUnavailable)?;
            stack.push(weight.to_le_bytes().to_vec());
        }
        _ => return Err(Error::BadOpcode),
    }

    Ok(())
}

/// OP_PUSHCURRENTINPUTINDEX
pub(super) fn push_current_input_index<SC: SignatureChecker + ?Sized>(
    stack: &mut Stack,
    checker: &SC,
) -> Result<(), Error> {
    let index = checker
        .input_index()
        .filter(|&index| index <= MAX_SERIALIZED_SIZE as usize)
        .ok_or(Error::IntrospectContextUnavailable)?;
    stack.push_num(index as i64);
    Ok(())
}
