//! Signature hashes of Elements transactions.
//!
//! Three schemes are in use: the legacy scheme (base scripts and P2SH), the BIP143-derived
//! segwit v0 scheme and the BIP341-derived Taproot scheme. The latter two commit to
//! per-transaction digests that are computed once in [`PrecomputedTransactionData`].

use crate::constants::{
    SIGHASH_ALL, SIGHASH_ANYONECANPAY, SIGHASH_DEFAULT, SIGHASH_INPUT_MASK, SIGHASH_NONE,
    SIGHASH_OUTPUT_MASK, SIGHASH_RANGEPROOF, SIGHASH_SINGLE, WITNESS_V1_TAPROOT_SIZE,
};
use crate::opcode::OP_1;
use crate::script::strip_codeseparators;
use crate::taproot::{TAG_TAPSIGHASH, tagged_engine};
use crate::transaction::{Transaction, TxOut, TxOutWitness, Value, serialize, write_compact_size};
use crate::{ScriptExecutionData, SigVersion, VerifyFlags};
use bitcoin::BlockHash;
use bitcoin::consensus::Encodable;
use bitcoin::hashes::{Hash, HashEngine, sha256, sha256d};

/// What a checker does when the data a signature hash needs was not precomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingDataBehavior {
    /// Abort, the caller guaranteed the data is available.
    #[default]
    AssertFail,
    /// Treat the signature as invalid.
    Fail,
}

/// Sighash settings that do not come from the script flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SighashConfig {
    /// Commit to issuances and confidential amounts in the segwit v0 digest. Disabling it
    /// produces the plain Bitcoin digest.
    pub elements_mode: bool,
}

impl Default for SighashConfig {
    fn default() -> Self {
        Self {
            elements_mode: true,
        }
    }
}

/// Errors of the Taproot signature hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SighashError {
    #[error("spent outputs or taproot digests were not precomputed")]
    MissingData,
    #[error("invalid hash type {0:#04x}")]
    InvalidHashType(u8),
    #[error("SIGHASH_SINGLE without a matching output")]
    NoMatchingOutput,
}

#[derive(Debug, Clone)]
struct SegwitV0Digests {
    hash_prevouts: sha256d::Hash,
    hash_sequence: sha256d::Hash,
    hash_issuance: sha256d::Hash,
    hash_outputs: sha256d::Hash,
    hash_rangeproofs: sha256d::Hash,
}

#[derive(Debug, Clone)]
struct TaprootDigests {
    outpoint_flags: sha256::Hash,
    spent_asset_amounts: sha256::Hash,
    issuance_rangeproofs: sha256::Hash,
    output_witnesses: sha256::Hash,
    spent_scripts: sha256::Hash,
    spent_script_pubkeys: Vec<sha256::Hash>,
    output_script_pubkeys: Vec<sha256::Hash>,
    tx_weight: u64,
}

/// Digests shared by all inputs of one transaction.
///
/// Built once before any input is verified and read-only afterwards, so a single instance
/// can back concurrent verification of every input.
#[derive(Clone)]
pub struct PrecomputedTransactionData {
    genesis_hash: BlockHash,
    spent_outputs: Vec<TxOut>,
    spent_outputs_ready: bool,
    prevouts_single_hash: sha256::Hash,
    sequences_single_hash: sha256::Hash,
    outputs_single_hash: sha256::Hash,
    issuances_single_hash: sha256::Hash,
    segwit_v0: Option<SegwitV0Digests>,
    taproot: Option<TaprootDigests>,
    tapsighash_engine: sha256::HashEngine,
}

// `sha256::HashEngine` does not implement `Debug` in the crates.io `bitcoin_hashes`.
impl core::fmt::Debug for PrecomputedTransactionData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrecomputedTransactionData")
            .field("genesis_hash", &self.genesis_hash)
            .field("spent_outputs", &self.spent_outputs)
            .field("spent_outputs_ready", &self.spent_outputs_ready)
            .field("prevouts_single_hash", &self.prevouts_single_hash)
            .field("sequences_single_hash", &self.sequences_single_hash)
            .field("outputs_single_hash", &self.outputs_single_hash)
            .field("issuances_single_hash", &self.issuances_single_hash)
            .field("segwit_v0", &self.segwit_v0)
            .field("taproot", &self.taproot)
            .finish_non_exhaustive()
    }
}

fn single_hash(f: impl FnOnce(&mut Vec<u8>)) -> sha256::Hash {
    let mut data = Vec::new();
    f(&mut data);
    sha256::Hash::hash(&data)
}

fn double_hash(f: impl FnOnce(&mut Vec<u8>)) -> sha256d::Hash {
    let mut data = Vec::new();
    f(&mut data);
    sha256d::Hash::hash(&data)
}

/// Turns a single SHA256 into the double SHA256 of the same data.
fn rehash(hash: &sha256::Hash) -> sha256d::Hash {
    sha256d::Hash::from_byte_array(sha256::Hash::hash(hash.as_ref()).to_byte_array())
}

fn put<T: Encodable + ?Sized>(data: &mut Vec<u8>, value: &T) {
    value
        .consensus_encode(data)
        .expect("Writing to Vec<u8> never fails; qed");
}

fn put_bytes(data: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(data, bytes.len() as u64).expect("Writing to Vec<u8> never fails; qed");
    data.extend_from_slice(bytes);
}

fn prevouts_single_hash(tx: &Transaction) -> sha256::Hash {
    single_hash(|data| {
        for input in &tx.input {
            put(data, &input.previous_output);
        }
    })
}

fn sequences_single_hash(tx: &Transaction) -> sha256::Hash {
    single_hash(|data| {
        for input in &tx.input {
            put(data, &input.sequence);
        }
    })
}

fn issuances_single_hash(tx: &Transaction) -> sha256::Hash {
    single_hash(|data| {
        for input in &tx.input {
            if input.asset_issuance.is_null() {
                data.push(0);
            } else {
                put(data, &input.asset_issuance);
            }
        }
    })
}

fn outputs_single_hash(tx: &Transaction) -> sha256::Hash {
    single_hash(|data| {
        for output in &tx.output {
            put(data, output);
        }
    })
}

/// Rangeproof then surjection proof of output `index`, two empty vectors if it has no witness.
fn put_output_proofs(data: &mut Vec<u8>, tx: &Transaction, index: usize) {
    match tx.output_witness(index) {
        Some(witness) => {
            put_bytes(data, &witness.rangeproof);
            put_bytes(data, &witness.surjection_proof);
        }
        None => data.extend_from_slice(&[0, 0]),
    }
}

fn rangeproofs_hash(tx: &Transaction) -> sha256d::Hash {
    double_hash(|data| {
        for index in 0..tx.output.len() {
            put_output_proofs(data, tx, index);
        }
    })
}

impl PrecomputedTransactionData {
    /// Precomputes the digests of `tx`.
    ///
    /// `spent_outputs` are the outputs being spent, one per input; they are required by the
    /// Taproot digests and ignored unless their count matches the inputs. With `force` set
    /// the segwit v0 and Taproot digests are computed even if no input seems to need them.
    pub fn new(
        tx: &Transaction,
        spent_outputs: Vec<TxOut>,
        genesis_hash: BlockHash,
        force: bool,
    ) -> Self {
        let spent_outputs_ready = !spent_outputs.is_empty() && spent_outputs.len() == tx.input.len();

        let mut uses_segwit_v0 = force;
        let mut uses_taproot = force;
        for index in 0..tx.input.len() {
            if uses_segwit_v0 && uses_taproot {
                break;
            }
            let has_witness = tx.script_witness(index).is_some_and(|w| !w.is_empty());
            if !has_witness {
                continue;
            }
            let spent_script = spent_outputs
                .get(index)
                .filter(|_| spent_outputs_ready)
                .map(|output| output.script_pubkey.as_bytes());
            match spent_script {
                // Anything that looks like a v1 program is treated as Taproot. Non-taproot
                // scripts of that shape fail verification as unexpected witnesses anyway.
                Some(script) if script.len() == 2 + WITNESS_V1_TAPROOT_SIZE && script[0] == OP_1 => {
                    uses_taproot = true
                }
                _ => uses_segwit_v0 = true,
            }
        }

        let mut tapsighash_engine = tagged_engine(TAG_TAPSIGHASH);
        tapsighash_engine.input(genesis_hash.as_byte_array());
        tapsighash_engine.input(genesis_hash.as_byte_array());

        let mut data = Self {
            genesis_hash,
            spent_outputs,
            spent_outputs_ready,
            prevouts_single_hash: sha256::Hash::all_zeros(),
            sequences_single_hash: sha256::Hash::all_zeros(),
            outputs_single_hash: sha256::Hash::all_zeros(),
            issuances_single_hash: sha256::Hash::all_zeros(),
            segwit_v0: None,
            taproot: None,
            tapsighash_engine,
        };

        if uses_segwit_v0 || uses_taproot {
            data.prevouts_single_hash = prevouts_single_hash(tx);
            data.sequences_single_hash = sequences_single_hash(tx);
            data.outputs_single_hash = outputs_single_hash(tx);
            data.issuances_single_hash = issuances_single_hash(tx);
        }

        if uses_segwit_v0 {
            data.segwit_v0 = Some(SegwitV0Digests {
                hash_prevouts: rehash(&data.prevouts_single_hash),
                hash_sequence: rehash(&data.sequences_single_hash),
                hash_issuance: rehash(&data.issuances_single_hash),
                hash_outputs: rehash(&data.outputs_single_hash),
                hash_rangeproofs: rangeproofs_hash(tx),
            });
        }

        if uses_taproot && spent_outputs_ready {
            data.taproot = Some(TaprootDigests {
                outpoint_flags: single_hash(|buf| {
                    buf.extend(tx.input.iter().map(|input| input.outpoint_flag()))
                }),
                spent_asset_amounts: single_hash(|buf| {
                    for output in &data.spent_outputs {
                        put(buf, &output.asset);
                        put(buf, &output.value);
                    }
                }),
                issuance_rangeproofs: single_hash(|buf| {
                    for witness in &tx.witness.inputs {
                        put_bytes(buf, &witness.issuance_amount_rangeproof);
                        put_bytes(buf, &witness.inflation_keys_rangeproof);
                    }
                }),
                output_witnesses: single_hash(|buf| {
                    for witness in &tx.witness.outputs {
                        put(buf, witness);
                    }
                }),
                spent_scripts: single_hash(|buf| {
                    for output in &data.spent_outputs {
                        put(buf, &output.script_pubkey);
                    }
                }),
                spent_script_pubkeys: data
                    .spent_outputs
                    .iter()
                    .map(|output| sha256::Hash::hash(output.script_pubkey.as_bytes()))
                    .collect(),
                output_script_pubkeys: tx
                    .output
                    .iter()
                    .map(|output| sha256::Hash::hash(output.script_pubkey.as_bytes()))
                    .collect(),
                tx_weight: tx.weight() as u64,
            });
        }

        data
    }

    pub fn genesis_hash(&self) -> &BlockHash {
        &self.genesis_hash
    }

    pub fn spent_outputs_ready(&self) -> bool {
        self.spent_outputs_ready
    }

    pub fn segwit_v0_ready(&self) -> bool {
        self.segwit_v0.is_some()
    }

    pub fn taproot_ready(&self) -> bool {
        self.taproot.is_some()
    }

    /// The output spent by input `index`, if spent outputs were supplied.
    pub fn spent_output(&self, index: usize) -> Option<&TxOut> {
        self.spent_outputs
            .get(index)
            .filter(|_| self.spent_outputs_ready)
    }

    /// SHA256 of the scriptPubKey spent by input `index`.
    pub fn spent_script_pubkey_hash(&self, index: usize) -> Option<&sha256::Hash> {
        self.taproot.as_ref()?.spent_script_pubkeys.get(index)
    }

    /// SHA256 of the scriptPubKey of output `index`.
    pub fn output_script_pubkey_hash(&self, index: usize) -> Option<&sha256::Hash> {
        self.taproot.as_ref()?.output_script_pubkeys.get(index)
    }

    pub fn tx_weight(&self) -> Option<u64> {
        self.taproot.as_ref().map(|taproot| taproot.tx_weight)
    }
}

/// Digest of the legacy scheme, used by base scripts and P2SH redeem scripts.
///
/// `script_code` is the executed script from the last OP_CODESEPARATOR on, with the
/// signature already removed. A SIGHASH_SINGLE without matching output yields the
/// historical constant `1`.
pub fn legacy_signature_hash(
    script_code: &[u8],
    tx: &Transaction,
    input_index: usize,
    hash_type: u32,
    flags: VerifyFlags,
) -> [u8; 32] {
    let base_type = hash_type & 0x1f;
    let anyone_can_pay = hash_type & u32::from(SIGHASH_ANYONECANPAY) != 0;
    let hash_single = base_type == u32::from(SIGHASH_SINGLE);
    let hash_none = base_type == u32::from(SIGHASH_NONE);
    let rangeproof = flags.sighash_rangeproof() && hash_type & u32::from(SIGHASH_RANGEPROOF) != 0;

    if hash_single && input_index >= tx.output.len() {
        let mut one = [0u8; 32];
        one[0] = 1;
        return one;
    }

    let mut data = Vec::new();
    put(&mut data, &tx.version);

    let num_inputs = if anyone_can_pay { 1 } else { tx.input.len() };
    put_compact_size(&mut data, num_inputs);
    for n in 0..num_inputs {
        let index = if anyone_can_pay { input_index } else { n };
        let input = &tx.input[index];
        put(&mut data, &input.previous_output);
        if index == input_index {
            let (declared_len, code) = strip_codeseparators(script_code);
            put_compact_size(&mut data, declared_len);
            data.extend_from_slice(&code);
        } else {
            // Other inputs' signatures are blanked.
            data.push(0);
        }
        if index != input_index && (hash_single || hash_none) {
            put(&mut data, &0u32);
        } else {
            put(&mut data, &input.sequence);
        }
        if !input.asset_issuance.is_null() {
            put(&mut data, &input.asset_issuance);
        }
    }

    let num_outputs = if hash_none {
        0
    } else if hash_single {
        input_index + 1
    } else {
        tx.output.len()
    };
    put_compact_size(&mut data, num_outputs);
    for index in 0..num_outputs {
        if hash_single && index != input_index {
            put(&mut data, &TxOut::default());
        } else {
            put(&mut data, &tx.output[index]);
            if rangeproof {
                put_output_proofs(&mut data, tx, index);
            }
        }
    }

    put(&mut data, &tx.lock_time);
    put(&mut data, &hash_type);

    sha256d::Hash::hash(&data).to_byte_array()
}

fn put_compact_size(data: &mut Vec<u8>, size: usize) {
    write_compact_size(data, size as u64).expect("Writing to Vec<u8> never fails; qed");
}

/// Digest of the segwit v0 scheme.
///
/// Per-transaction digests are taken from `cache` when it is ready and recomputed
/// otherwise.
#[allow(clippy::too_many_arguments)]
pub fn segwit_v0_signature_hash(
    script_code: &[u8],
    tx: &Transaction,
    input_index: usize,
    hash_type: u32,
    amount: &Value,
    flags: VerifyFlags,
    cache: Option<&PrecomputedTransactionData>,
    config: SighashConfig,
) -> [u8; 32] {
    let base_type = hash_type & 0x1f;
    let anyone_can_pay = hash_type & u32::from(SIGHASH_ANYONECANPAY) != 0;
    let single_or_none =
        base_type == u32::from(SIGHASH_SINGLE) || base_type == u32::from(SIGHASH_NONE);
    let rangeproof = flags.sighash_rangeproof() && hash_type & u32::from(SIGHASH_RANGEPROOF) != 0;
    let cached = cache.and_then(|cache| cache.segwit_v0.as_ref());

    let zero = sha256d::Hash::all_zeros();
    let mut hash_prevouts = zero;
    let mut hash_sequence = zero;
    let mut hash_issuance = zero;
    let mut hash_outputs = zero;
    let mut hash_rangeproofs = zero;

    if !anyone_can_pay {
        hash_prevouts = cached.map_or_else(|| rehash(&prevouts_single_hash(tx)), |c| c.hash_prevouts);
        hash_issuance = cached.map_or_else(|| rehash(&issuances_single_hash(tx)), |c| c.hash_issuance);
        if !single_or_none {
            hash_sequence =
                cached.map_or_else(|| rehash(&sequences_single_hash(tx)), |c| c.hash_sequence);
        }
    }

    if !single_or_none {
        hash_outputs = cached.map_or_else(|| rehash(&outputs_single_hash(tx)), |c| c.hash_outputs);
        if rangeproof {
            hash_rangeproofs = cached.map_or_else(|| rangeproofs_hash(tx), |c| c.hash_rangeproofs);
        }
    } else if base_type == u32::from(SIGHASH_SINGLE) && input_index < tx.output.len() {
        hash_outputs = sha256d::Hash::hash(&serialize(&tx.output[input_index]));
        if rangeproof {
            hash_rangeproofs = double_hash(|data| put_output_proofs(data, tx, input_index));
        }
    }

    let input = &tx.input[input_index];
    let mut data = Vec::new();
    put(&mut data, &tx.version);
    data.extend_from_slice(hash_prevouts.as_ref());
    data.extend_from_slice(hash_sequence.as_ref());
    if config.elements_mode {
        data.extend_from_slice(hash_issuance.as_ref());
    }
    put(&mut data, &input.previous_output);
    put_bytes(&mut data, script_code);
    if config.elements_mode {
        put(&mut data, amount);
    } else {
        let explicit = match amount {
            Value::Explicit(amount) => *amount,
            _ => u64::MAX,
        };
        put(&mut data, &explicit);
    }
    put(&mut data, &input.sequence);
    if !input.asset_issuance.is_null() {
        put(&mut data, &input.asset_issuance);
    }
    data.extend_from_slice(hash_outputs.as_ref());
    if rangeproof {
        data.extend_from_slice(hash_rangeproofs.as_ref());
    }
    put(&mut data, &tx.lock_time);
    put(&mut data, &hash_type);

    sha256d::Hash::hash(&data).to_byte_array()
}

/// Digest of the Taproot scheme, for key path spends and tapscript signatures.
///
/// Fills the SIGHASH_SINGLE output caches of `exec_data` on first use.
pub fn taproot_signature_hash(
    exec_data: &mut ScriptExecutionData,
    tx: &Transaction,
    input_index: usize,
    hash_type: u8,
    sig_version: SigVersion,
    cache: &PrecomputedTransactionData,
) -> Result<sha256::Hash, SighashError> {
    let (ext_flag, key_version) = match sig_version {
        SigVersion::Taproot => (0u8, None),
        SigVersion::Tapscript => (1u8, Some(0u8)),
        // Not a Schnorr signature context.
        SigVersion::Base | SigVersion::WitnessV0 => return Err(SighashError::MissingData),
    };

    let digests = match (&cache.taproot, cache.spent_outputs_ready) {
        (Some(digests), true) => digests,
        _ => return Err(SighashError::MissingData),
    };

    let output_type = if hash_type == SIGHASH_DEFAULT {
        SIGHASH_ALL
    } else {
        hash_type & SIGHASH_OUTPUT_MASK
    };
    let input_type = hash_type & SIGHASH_INPUT_MASK;
    if !(hash_type <= 0x03 || (0x81..=0x83).contains(&hash_type)) {
        return Err(SighashError::InvalidHashType(hash_type));
    }

    let mut data = Vec::new();
    data.push(hash_type);
    put(&mut data, &tx.version);
    put(&mut data, &tx.lock_time);

    if input_type != SIGHASH_ANYONECANPAY {
        for hash in [
            &digests.outpoint_flags,
            &cache.prevouts_single_hash,
            &digests.spent_asset_amounts,
            &digests.spent_scripts,
            &cache.sequences_single_hash,
            &cache.issuances_single_hash,
            &digests.issuance_rangeproofs,
        ] {
            data.extend_from_slice(hash.as_ref());
        }
    }

    if output_type == SIGHASH_ALL {
        data.extend_from_slice(cache.outputs_single_hash.as_ref());
        data.extend_from_slice(digests.output_witnesses.as_ref());
    }

    let have_annex = exec_data.annex_hash.is_some();
    data.push((ext_flag << 1) + u8::from(have_annex));

    let input = &tx.input[input_index];
    if input_type == SIGHASH_ANYONECANPAY {
        let spent = &cache.spent_outputs[input_index];
        data.push(input.outpoint_flag());
        put(&mut data, &input.previous_output);
        put(&mut data, &spent.asset);
        put(&mut data, &spent.value);
        put(&mut data, &spent.script_pubkey);
        put(&mut data, &input.sequence);
        if input.asset_issuance.is_null() {
            data.push(0);
        } else {
            put(&mut data, &input.asset_issuance);
            let issuance_proofs = single_hash(|buf| {
                if let Some(witness) = tx.input_witness(input_index) {
                    put_bytes(buf, &witness.issuance_amount_rangeproof);
                    put_bytes(buf, &witness.inflation_keys_rangeproof);
                } else {
                    buf.extend_from_slice(&[0, 0]);
                }
            });
            data.extend_from_slice(issuance_proofs.as_ref());
        }
    } else {
        put(&mut data, &(input_index as u32));
    }

    if let Some(annex_hash) = &exec_data.annex_hash {
        data.extend_from_slice(annex_hash.as_ref());
    }

    if output_type == SIGHASH_SINGLE {
        let Some(output) = tx.output.get(input_index) else {
            return Err(SighashError::NoMatchingOutput);
        };
        let output_hash = *exec_data
            .output_hash
            .get_or_insert_with(|| sha256::Hash::hash(&serialize(output)));
        data.extend_from_slice(output_hash.as_ref());

        let output_witness_hash = *exec_data.output_witness_hash.get_or_insert_with(|| {
            let null_witness = TxOutWitness::default();
            sha256::Hash::hash(&serialize(
                tx.output_witness(input_index).unwrap_or(&null_witness),
            ))
        });
        data.extend_from_slice(output_witness_hash.as_ref());
    }

    if let Some(key_version) = key_version {
        let tapleaf_hash = exec_data.tapleaf_hash.unwrap_or_else(sha256::Hash::all_zeros);
        data.extend_from_slice(tapleaf_hash.as_ref());
        data.push(key_version);
        put(&mut data, &exec_data.codeseparator_pos.unwrap_or(u32::MAX));
    }

    let mut engine = cache.tapsighash_engine.clone();
    engine.input(&data);
    Ok(sha256::Hash::from_engine(engine))
}
