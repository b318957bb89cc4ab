use super::{init_logger, script, secret_key, spending_tx, spent_output};
use crate::constants::{TAPROOT_LEAF_TAPSCRIPT, TAPROOT_LEAF_TAPSIMPLICITY};
use crate::opcode::*;
use crate::script::push_data;
use crate::sighash::{PrecomputedTransactionData, taproot_signature_hash};
use crate::simplicity::{SimplicityError, SimplicityRequest};
use crate::taproot::{tap_branch_hash, tap_leaf_hash, tap_tweak_hash};
use crate::transaction::{Transaction, Value};
use crate::{
    Error, NoSignatureCheck, ScriptExecutionData, SigVersion, TransactionSignatureChecker,
    VerifyFlags, verify_script,
};
use bitcoin::hashes::{Hash, sha256};
use bitcoin::secp256k1::{Keypair, Message, Parity, Scalar, Secp256k1, XOnlyPublicKey};
use bitcoin::{BlockHash, Witness};
use std::sync::Mutex;

pub(super) const AMOUNT: u64 = 50_000;

fn flags() -> VerifyFlags {
    VerifyFlags::P2SH | VerifyFlags::WITNESS | VerifyFlags::TAPROOT
}

pub(super) fn keypair(byte: u8) -> Keypair {
    Keypair::from_secret_key(&Secp256k1::new(), &secret_key(byte))
}

pub(super) fn p2tr(output_key: &[u8]) -> Vec<u8> {
    script(&[&[OP_1], &push_data(output_key)])
}

fn tweak_key(internal: &XOnlyPublicKey, merkle_root: &[u8; 32]) -> (Vec<u8>, Parity) {
    let tweak = tap_tweak_hash(&internal.serialize(), Some(merkle_root));
    let tweak = Scalar::from_be_bytes(tweak.to_byte_array()).unwrap();
    let (output_key, parity) = internal.add_tweak(&Secp256k1::new(), &tweak).unwrap();
    (output_key.serialize().to_vec(), parity)
}

fn control_block(leaf_version: u8, parity: Parity, internal: &XOnlyPublicKey, path: &[u8]) -> Vec<u8> {
    let mut control = vec![leaf_version | parity.to_u8()];
    control.extend_from_slice(&internal.serialize());
    control.extend_from_slice(path);
    control
}

/// Output key and single-leaf control block committing to `leaf_script`.
pub(super) fn commit(internal: &XOnlyPublicKey, leaf_version: u8, leaf_script: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let leaf_hash = tap_leaf_hash(leaf_version, leaf_script);
    let (output_key, parity) = tweak_key(internal, leaf_hash.as_byte_array());
    (output_key, control_block(leaf_version, parity, internal, &[]))
}

/// Output key and control blocks of the tree `((a, b), c)`, one per leaf in order.
fn commit_tree(internal: &XOnlyPublicKey, leaves: [(u8, &[u8]); 3]) -> (Vec<u8>, Vec<Vec<u8>>) {
    let [a, b, c] = leaves.map(|(version, script)| tap_leaf_hash(version, script).to_byte_array());
    let ab = tap_branch_hash(&a, &b).to_byte_array();
    let root = tap_branch_hash(&ab, &c).to_byte_array();
    let (output_key, parity) = tweak_key(internal, &root);

    let paths = [[b, c].concat(), [a, c].concat(), ab.to_vec()];
    let controls = leaves
        .iter()
        .zip(paths)
        .map(|((version, _), path)| control_block(*version, parity, internal, &path))
        .collect();
    (output_key, controls)
}

fn sign(
    tx: &Transaction,
    cache: &PrecomputedTransactionData,
    keypair: &Keypair,
    sig_version: SigVersion,
    mut exec_data: ScriptExecutionData,
) -> Vec<u8> {
    exec_data.annex_init = true;
    let sighash = taproot_signature_hash(&mut exec_data, tx, 0, 0x00, sig_version, cache).unwrap();
    Secp256k1::new()
        .sign_schnorr_no_aux_rand(&Message::from_digest(sighash.to_byte_array()), keypair)
        .as_ref()
        .to_vec()
}

pub(super) fn precompute(tx: &Transaction, script_pubkey: &[u8]) -> PrecomputedTransactionData {
    PrecomputedTransactionData::new(
        tx,
        vec![spent_output(script_pubkey, AMOUNT)],
        BlockHash::all_zeros(),
        true,
    )
}

fn run_taproot_test(
    tx: &Transaction,
    cache: &PrecomputedTransactionData,
    script_pubkey: &[u8],
    witness: &Witness,
    flags: VerifyFlags,
) -> Result<(), Error> {
    init_logger();
    let checker =
        TransactionSignatureChecker::new(tx, 0, Value::Explicit(AMOUNT)).with_txdata(cache);
    verify_script(&[], script_pubkey, witness, &flags, &checker)
}

#[test]
fn key_path_spend() {
    let tx = spending_tx();
    let keypair = keypair(11);
    let script_pubkey = p2tr(&keypair.x_only_public_key().0.serialize());
    let cache = precompute(&tx, &script_pubkey);

    let sig = sign(&tx, &cache, &keypair, SigVersion::Taproot, Default::default());
    let witness = Witness::from_slice(&[sig.clone()]);
    run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()).unwrap();

    let mut tampered = sig.clone();
    tampered[10] ^= 1;
    let witness = Witness::from_slice(&[tampered]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::SchnorrSig)
    );

    // An explicit SIGHASH_DEFAULT byte is not allowed.
    let mut explicit_default = sig;
    explicit_default.push(0x00);
    let witness = Witness::from_slice(&[explicit_default]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::SchnorrSigHashType)
    );

    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &Witness::new(), flags()),
        Err(Error::WitnessProgramWitnessEmpty)
    );
}

#[test]
fn key_path_spend_with_annex() {
    let tx = spending_tx();
    let keypair = keypair(11);
    let script_pubkey = p2tr(&keypair.x_only_public_key().0.serialize());
    let cache = precompute(&tx, &script_pubkey);

    let annex = vec![0x50, 0xaa, 0xbb];
    let mut prefixed = vec![annex.len() as u8];
    prefixed.extend_from_slice(&annex);
    let exec_data = ScriptExecutionData {
        annex_hash: Some(sha256::Hash::hash(&prefixed)),
        ..Default::default()
    };

    let sig = sign(&tx, &cache, &keypair, SigVersion::Taproot, exec_data);
    let witness = Witness::from_slice(&[sig.clone(), annex]);
    run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()).unwrap();

    // The signature commits to the annex.
    let witness = Witness::from_slice(&[sig, vec![0x50]]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::SchnorrSig)
    );
}

#[test]
fn taproot_rules_need_the_flag() {
    let tx = spending_tx();
    let script_pubkey = p2tr(&keypair(11).x_only_public_key().0.serialize());
    let cache = precompute(&tx, &script_pubkey);

    let witness = Witness::from_slice(&[vec![0u8; 64]]);
    run_taproot_test(
        &tx,
        &cache,
        &script_pubkey,
        &witness,
        VerifyFlags::P2SH | VerifyFlags::WITNESS,
    )
    .unwrap();
}

#[test]
fn script_path_spend() {
    let tx = spending_tx();
    let internal = keypair(12).x_only_public_key().0;
    let leaf_key = keypair(13);
    let leaf_script = script(&[
        &push_data(&leaf_key.x_only_public_key().0.serialize()),
        &[OP_CHECKSIG],
    ]);
    let (output_key, control) = commit(&internal, TAPROOT_LEAF_TAPSCRIPT, &leaf_script);
    let script_pubkey = p2tr(&output_key);
    let cache = precompute(&tx, &script_pubkey);

    let exec_data = ScriptExecutionData {
        tapleaf_hash: Some(tap_leaf_hash(TAPROOT_LEAF_TAPSCRIPT, &leaf_script)),
        ..Default::default()
    };
    let sig = sign(&tx, &cache, &leaf_key, SigVersion::Tapscript, exec_data);

    let witness = Witness::from_slice(&[sig.clone(), leaf_script.clone(), control.clone()]);
    run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()).unwrap();

    // Key path signature hash does not commit to the leaf.
    let key_path_sig = sign(&tx, &cache, &leaf_key, SigVersion::Taproot, Default::default());
    let witness = Witness::from_slice(&[key_path_sig, leaf_script.clone(), control.clone()]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::SchnorrSig)
    );

    // The empty signature fails softly and leaves false behind.
    let witness = Witness::from_slice(&[vec![], leaf_script.clone(), control.clone()]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::EvalFalse)
    );

    let mut wrong_parity = control.clone();
    wrong_parity[0] ^= 1;
    let witness = Witness::from_slice(&[sig.clone(), leaf_script.clone(), wrong_parity]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::WitnessProgramMismatch)
    );

    let mut wrong_size = control;
    wrong_size.push(0);
    let witness = Witness::from_slice(&[sig, leaf_script, wrong_size]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::TaprootWrongControlSize)
    );
}

#[test]
fn script_path_op_success() {
    let tx = spending_tx();
    let internal = keypair(12).x_only_public_key().0;
    // OP_RESERVED is an OP_SUCCESS in tapscript, even behind an OP_RETURN.
    let leaf_script = vec![OP_RETURN, OP_RESERVED];
    let (output_key, control) = commit(&internal, TAPROOT_LEAF_TAPSCRIPT, &leaf_script);
    let script_pubkey = p2tr(&output_key);
    let cache = precompute(&tx, &script_pubkey);

    let witness = Witness::from_slice(&[leaf_script, control]);
    run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()).unwrap();
    assert_eq!(
        run_taproot_test(
            &tx,
            &cache,
            &script_pubkey,
            &witness,
            flags() | VerifyFlags::DISCOURAGE_OP_SUCCESS
        ),
        Err(Error::DiscourageOpSuccess)
    );
}

#[test]
fn script_path_unknown_leaf_version() {
    let tx = spending_tx();
    let internal = keypair(12).x_only_public_key().0;
    let leaf_script = vec![OP_RETURN];
    let (output_key, control) = commit(&internal, 0xc2, &leaf_script);
    let script_pubkey = p2tr(&output_key);
    let cache = precompute(&tx, &script_pubkey);

    let witness = Witness::from_slice(&[leaf_script, control]);
    run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()).unwrap();
    assert_eq!(
        run_taproot_test(
            &tx,
            &cache,
            &script_pubkey,
            &witness,
            flags() | VerifyFlags::DISCOURAGE_UPGRADABLE_TAPROOT_VERSION
        ),
        Err(Error::DiscourageUpgradableTaprootVersion)
    );
}

#[test]
fn script_path_validation_weight() {
    let tx = spending_tx();
    let internal = keypair(12).x_only_public_key().0;
    // Every non-empty signature costs 50, the tiny witness can not pay for 3 of them.
    // Keys of unknown type pass without a signature check but are charged all the same.
    let pubkey = [0x77];
    let check = script(&[&push_data(&pubkey), &[OP_CHECKSIGVERIFY]]);
    let leaf_script = script(&[&check, &check, &check, &[OP_1]]);
    let (output_key, control) = commit(&internal, TAPROOT_LEAF_TAPSCRIPT, &leaf_script);
    let script_pubkey = p2tr(&output_key);

    let sig = vec![1u8];
    let witness = Witness::from_slice(&[
        sig.clone(),
        sig.clone(),
        sig,
        leaf_script,
        control,
    ]);
    let result = verify_script(&[], &script_pubkey, &witness, &flags(), &NoSignatureCheck);
    assert_eq!(result, Err(Error::TapscriptValidationWeight));
}

#[test]
fn simplicity_leaf() {
    let internal = keypair(12).x_only_public_key().0;
    let cmr = [0x5a; 32];
    let (output_key, control) = commit(&internal, TAPROOT_LEAF_TAPSIMPLICITY, &cmr);
    let script_pubkey = p2tr(&output_key);
    let flags = flags() | VerifyFlags::SIMPLICITY;

    let witness = Witness::from_slice(&[
        b"witness".to_vec(),
        b"program".to_vec(),
        cmr.to_vec(),
        control.clone(),
    ]);
    verify_script(&[], &script_pubkey, &witness, &flags, &NoSignatureCheck).unwrap();

    let witness = Witness::from_slice(&[b"program".to_vec(), cmr.to_vec(), control.clone()]);
    assert_eq!(
        verify_script(&[], &script_pubkey, &witness, &flags, &NoSignatureCheck),
        Err(Error::SimplicityWrongLength)
    );

    // A transaction checker without an evaluator rejects the leaf.
    let tx = spending_tx();
    let cache = precompute(&tx, &script_pubkey);
    let witness = Witness::from_slice(&[
        b"witness".to_vec(),
        b"program".to_vec(),
        cmr.to_vec(),
        control,
    ]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags),
        Err(Error::Unknown)
    );
}

#[test]
fn script_path_spend_through_merkle_path() {
    let tx = spending_tx();
    let internal = keypair(12).x_only_public_key().0;
    let leaf_key = keypair(14);
    let checksig = script(&[
        &push_data(&leaf_key.x_only_public_key().0.serialize()),
        &[OP_CHECKSIG],
    ]);
    let unspendable = vec![OP_RETURN];
    let anyone = vec![OP_1];
    let (output_key, controls) = commit_tree(
        &internal,
        [
            (TAPROOT_LEAF_TAPSCRIPT, &checksig),
            (TAPROOT_LEAF_TAPSCRIPT, &unspendable),
            (TAPROOT_LEAF_TAPSCRIPT, &anyone),
        ],
    );
    let script_pubkey = p2tr(&output_key);
    let cache = precompute(&tx, &script_pubkey);

    // Two path nodes.
    let exec_data = ScriptExecutionData {
        tapleaf_hash: Some(tap_leaf_hash(TAPROOT_LEAF_TAPSCRIPT, &checksig)),
        ..Default::default()
    };
    let sig = sign(&tx, &cache, &leaf_key, SigVersion::Tapscript, exec_data);
    let witness = Witness::from_slice(&[sig, checksig.clone(), controls[0].clone()]);
    run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()).unwrap();

    let witness = Witness::from_slice(&[unspendable, controls[1].clone()]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::OpReturn)
    );

    // One path node.
    let witness = Witness::from_slice(&[anyone.clone(), controls[2].clone()]);
    run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()).unwrap();

    // A leaf presented with the path of its neighbour.
    let witness = Witness::from_slice(&[anyone, controls[0].clone()]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::WitnessProgramMismatch)
    );

    let mut corrupted = controls[2].clone();
    corrupted[40] ^= 0x80;
    let witness = Witness::from_slice(&[vec![OP_1], corrupted]);
    assert_eq!(
        run_taproot_test(&tx, &cache, &script_pubkey, &witness, flags()),
        Err(Error::WitnessProgramMismatch)
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedRequest {
    program: Vec<u8>,
    witness: Vec<u8>,
    control_block: Vec<u8>,
    path_len: usize,
    script_cmr: [u8; 32],
    budget: i64,
}

#[test]
fn simplicity_leaf_is_handed_to_the_evaluator() {
    init_logger();

    let tx = spending_tx();
    let internal = keypair(12).x_only_public_key().0;
    let cmr = [0x5a; 32];
    let (output_key, controls) = commit_tree(
        &internal,
        [
            (TAPROOT_LEAF_TAPSCRIPT, &[OP_1]),
            (TAPROOT_LEAF_TAPSCRIPT, &[OP_RETURN]),
            (TAPROOT_LEAF_TAPSIMPLICITY, &cmr),
        ],
    );
    let control = controls[2].clone();
    assert_eq!(control.len(), 65);
    let script_pubkey = p2tr(&output_key);
    let cache = precompute(&tx, &script_pubkey);
    let flags = flags() | VerifyFlags::SIMPLICITY;

    let witness = Witness::from_slice(&[
        b"simplicity witness".to_vec(),
        b"program".to_vec(),
        cmr.to_vec(),
        control.clone(),
    ]);

    let recorded = Mutex::new(None);
    let oracle = |request: &SimplicityRequest<'_>| -> Result<(), SimplicityError> {
        *recorded.lock().unwrap() = Some(RecordedRequest {
            program: request.program.to_vec(),
            witness: request.witness.to_vec(),
            control_block: request.control_block.to_vec(),
            path_len: request.path_len,
            script_cmr: *request.script_cmr,
            budget: request.budget,
        });
        Ok(())
    };
    let checker = TransactionSignatureChecker::new(&tx, 0, Value::Explicit(AMOUNT))
        .with_txdata(&cache)
        .with_simplicity_oracle(&oracle);
    verify_script(&[], &script_pubkey, &witness, &flags, &checker).unwrap();

    // Serialized witness: count (1) + witness (1 + 18) + program (1 + 7) + cmr (1 + 32)
    // + control block (1 + 65) = 127, plus the fixed offset of 50.
    assert_eq!(
        recorded.lock().unwrap().take(),
        Some(RecordedRequest {
            program: b"program".to_vec(),
            witness: b"simplicity witness".to_vec(),
            control_block: control.clone(),
            path_len: 1,
            script_cmr: cmr,
            budget: 177,
        })
    );

    let rejecting =
        |_: &SimplicityRequest<'_>| -> Result<(), SimplicityError> { Err(SimplicityError::ExecBudget) };
    let checker = TransactionSignatureChecker::new(&tx, 0, Value::Explicit(AMOUNT))
        .with_txdata(&cache)
        .with_simplicity_oracle(&rejecting);
    assert_eq!(
        verify_script(&[], &script_pubkey, &witness, &flags, &checker),
        Err(Error::Simplicity(SimplicityError::ExecBudget))
    );

    // Without the flag the leaf is an unknown version and passes untouched.
    verify_script(
        &[],
        &script_pubkey,
        &witness,
        &(flags - VerifyFlags::SIMPLICITY),
        &checker,
    )
    .unwrap();
}
