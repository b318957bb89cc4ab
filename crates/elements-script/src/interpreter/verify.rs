use super::eval_script;
use crate::constants::{
    ANNEX_TAG, MAX_SCRIPT_ELEMENT_SIZE, MAX_STACK_SIZE, TAPROOT_CONTROL_BASE_SIZE,
    TAPROOT_CONTROL_NODE_SIZE, TAPROOT_LEAF_MASK, TAPROOT_LEAF_TAPSCRIPT,
    TAPROOT_LEAF_TAPSIMPLICITY, VALIDATION_WEIGHT_OFFSET, WITNESS_V0_KEYHASH_SIZE,
    WITNESS_V0_SCRIPTHASH_SIZE, WITNESS_V1_TAPROOT_SIZE,
};
use crate::error::Error;
use crate::opcode::{self, OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use crate::script::{Instructions, is_p2sh, is_push_only, push_data, sigop_count, witness_program};
use crate::signature_checker::SignatureChecker;
use crate::simplicity::SimplicityRequest;
use crate::stack::Stack;
use crate::taproot::{is_valid_control_size, tap_leaf_hash, verify_taproot_commitment};
use crate::transaction::{serialize, write_compact_size};
use crate::{ScriptExecutionData, SigVersion, VerifyFlags};
use bitcoin::Witness;
use bitcoin::hashes::{Hash, sha256};

/// Verifies that `script_sig` together with `witness` satisfies `script_pubkey`.
///
/// scriptSig and scriptPubKey are evaluated one after the other on the same stack rather
/// than concatenated (CVE-2010-5141). P2SH redemption and witness programs are dispatched
/// from the shape of the scripts.
///
/// # Panics
///
/// On flag combinations that are not soft forks of the flags they extend: CLEANSTACK
/// without P2SH and WITNESS, or WITNESS without P2SH.
pub fn verify_script<SC: SignatureChecker + ?Sized>(
    script_sig: &[u8],
    script_pubkey: &[u8],
    witness: &Witness,
    flags: &VerifyFlags,
    checker: &SC,
) -> Result<(), Error> {
    if flags.verify_sigpushonly() && !is_push_only(script_sig) {
        return Err(Error::SigPushOnly);
    }

    let mut stack = Stack::with_flags(flags);

    eval_script(
        &mut stack,
        script_sig,
        flags,
        checker,
        SigVersion::Base,
        &mut ScriptExecutionData::default(),
    )?;

    let stack_copy = flags.verify_p2sh().then(|| stack.clone());

    eval_script(
        &mut stack,
        script_pubkey,
        flags,
        checker,
        SigVersion::Base,
        &mut ScriptExecutionData::default(),
    )?;

    if stack.is_empty() || !stack.peek_bool()? {
        return Err(Error::EvalFalse);
    }

    let mut had_witness = false;

    // Bare witness programs.
    if flags.verify_witness() {
        if let Some((version, program)) = witness_program(script_pubkey) {
            had_witness = true;

            // The scriptSig must be exactly empty, otherwise it is malleable.
            if !script_sig.is_empty() {
                return Err(Error::WitnessMalleated);
            }

            verify_witness_program(witness, version, program, flags, checker, false)?;

            // The actual stack is obviously not clean for witness programs.
            stack.truncate(1);
        }
    }

    // Additional validation for spend-to-script-hash transactions.
    if flags.verify_p2sh() && is_p2sh(script_pubkey) {
        if !is_push_only(script_sig) {
            return Err(Error::SigPushOnly);
        }

        // Restore the stack as left by the scriptSig.
        stack = stack_copy.ok_or(Error::Unknown)?;

        // The stack can not be empty here: the P2SH `HASH <> EQUAL` scriptPubKey would
        // have failed on an empty stack.
        let redeem_script = stack.pop()?;

        eval_script(
            &mut stack,
            &redeem_script,
            flags,
            checker,
            SigVersion::Base,
            &mut ScriptExecutionData::default(),
        )?;

        if stack.is_empty() || !stack.peek_bool()? {
            return Err(Error::EvalFalse);
        }

        // P2SH witness program.
        if flags.verify_witness() {
            if let Some((version, program)) = witness_program(&redeem_script) {
                had_witness = true;

                // The scriptSig must be exactly a single push of the redeemScript.
                if script_sig != push_data(&redeem_script).as_slice() {
                    return Err(Error::WitnessMalleatedP2SH);
                }

                verify_witness_program(witness, version, program, flags, checker, true)?;

                stack.truncate(1);
            }
        }
    }

    // Only checked after P2SH and witness evaluation, both leave their inputs on the
    // stack when viewed from the scriptPubKey alone.
    if flags.verify_cleanstack() {
        assert!(
            flags.verify_p2sh() && flags.verify_witness(),
            "CLEANSTACK requires P2SH and WITNESS"
        );
        if stack.len() != 1 {
            return Err(Error::CleanStack);
        }
    }

    if flags.verify_witness() {
        // Unexpected witness data can not be detected with P2SH off.
        assert!(flags.verify_p2sh(), "WITNESS requires P2SH");
        if !had_witness && !witness.is_empty() {
            return Err(Error::WitnessUnexpected);
        }
    }

    Ok(())
}

fn verify_witness_program<SC: SignatureChecker + ?Sized>(
    witness: &Witness,
    version: u8,
    program: &[u8],
    flags: &VerifyFlags,
    checker: &SC,
    is_p2sh: bool,
) -> Result<(), Error> {
    let mut stack = witness.to_vec();
    let mut exec_data = ScriptExecutionData::default();

    match version {
        0 => match program.len() {
            WITNESS_V0_SCRIPTHASH_SIZE => {
                // P2WSH: the program is the SHA256 of the witness script.
                let exec_script = stack.pop().ok_or(Error::WitnessProgramWitnessEmpty)?;

                if sha256::Hash::hash(&exec_script).as_byte_array()[..] != program[..] {
                    tracing::debug!(program = hex::encode(program), "Witness script hash mismatch");
                    return Err(Error::WitnessProgramMismatch);
                }

                execute_witness_script(
                    stack,
                    &exec_script,
                    flags,
                    SigVersion::WitnessV0,
                    checker,
                    &mut exec_data,
                )
            }
            WITNESS_V0_KEYHASH_SIZE => {
                // P2WPKH: the program is the HASH160 of the public key.
                if stack.len() != 2 {
                    return Err(Error::WitnessProgramMismatch);
                }

                let mut exec_script = vec![OP_DUP, OP_HASH160];
                exec_script.extend(push_data(program));
                exec_script.extend([OP_EQUALVERIFY, OP_CHECKSIG]);

                execute_witness_script(
                    stack,
                    &exec_script,
                    flags,
                    SigVersion::WitnessV0,
                    checker,
                    &mut exec_data,
                )
            }
            _ => Err(Error::WitnessProgramWrongLength),
        },
        1 if program.len() == WITNESS_V1_TAPROOT_SIZE && !is_p2sh => {
            if !flags.verify_taproot() {
                return Ok(());
            }

            verify_taproot_program(witness, stack, program, flags, checker, &mut exec_data)
        }
        _ => {
            if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM) {
                return Err(Error::DiscourageUpgradableWitnessProgram);
            }
            // Other version, size and P2SH combinations pass for future soft forks.
            Ok(())
        }
    }
}

/// Taproot key path and script path spends of a 32-byte version 1 program.
fn verify_taproot_program<SC: SignatureChecker + ?Sized>(
    witness: &Witness,
    mut stack: Vec<Vec<u8>>,
    program: &[u8],
    flags: &VerifyFlags,
    checker: &SC,
    exec_data: &mut ScriptExecutionData,
) -> Result<(), Error> {
    if stack.is_empty() {
        return Err(Error::WitnessProgramWitnessEmpty);
    }

    // A last item starting with the annex tag is the annex, if there are at least two items.
    if stack.len() >= 2 && stack.last().and_then(|item| item.first()) == Some(&ANNEX_TAG) {
        let annex = stack.pop().ok_or(Error::Unknown)?;
        exec_data.annex_hash = Some(annex_hash(&annex));
    }
    exec_data.annex_init = true;

    if let [sig] = stack.as_slice() {
        // Key path spend.
        return checker.check_schnorr_signature(sig, program, SigVersion::Taproot, exec_data);
    }

    // Script path spend.
    let control = stack.pop().ok_or(Error::Unknown)?;
    let script = stack.pop().ok_or(Error::Unknown)?;

    if !is_valid_control_size(control.len()) {
        return Err(Error::TaprootWrongControlSize);
    }

    let leaf_version = control[0] & TAPROOT_LEAF_MASK;
    let tapleaf_hash = tap_leaf_hash(leaf_version, &script);

    if !verify_taproot_commitment(&control, program, &tapleaf_hash) {
        tracing::debug!(
            program = hex::encode(program),
            %tapleaf_hash,
            "Taproot commitment mismatch"
        );
        return Err(Error::WitnessProgramMismatch);
    }
    exec_data.tapleaf_hash = Some(tapleaf_hash);

    // The validation budget is derived from the whole witness, annex included.
    let budget = serialize(witness).len() as i64 + VALIDATION_WEIGHT_OFFSET;

    match leaf_version {
        TAPROOT_LEAF_TAPSCRIPT => {
            exec_data.validation_weight_left = Some(budget);
            execute_witness_script(
                stack,
                &script,
                flags,
                SigVersion::Tapscript,
                checker,
                exec_data,
            )
        }
        TAPROOT_LEAF_TAPSIMPLICITY if flags.verify_simplicity() => {
            let (Ok(script_cmr), [simplicity_witness, simplicity_program]) =
                (<&[u8; 32]>::try_from(script.as_slice()), stack.as_slice())
            else {
                return Err(Error::SimplicityWrongLength);
            };

            checker.check_simplicity(&SimplicityRequest {
                program: simplicity_program,
                witness: simplicity_witness,
                control_block: &control,
                path_len: (control.len() - TAPROOT_CONTROL_BASE_SIZE) / TAPROOT_CONTROL_NODE_SIZE,
                script_cmr,
                budget,
            })
        }
        _ => {
            if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_TAPROOT_VERSION) {
                return Err(Error::DiscourageUpgradableTaprootVersion);
            }
            Ok(())
        }
    }
}

/// SHA256 of the length-prefixed annex.
fn annex_hash(annex: &[u8]) -> sha256::Hash {
    let mut data = Vec::with_capacity(annex.len() + 9);
    write_compact_size(&mut data, annex.len() as u64)
        .expect("Writing to Vec<u8> never fails; qed");
    data.extend_from_slice(annex);
    sha256::Hash::hash(&data)
}

fn execute_witness_script<SC: SignatureChecker + ?Sized>(
    stack: Vec<Vec<u8>>,
    exec_script: &[u8],
    flags: &VerifyFlags,
    sig_version: SigVersion,
    checker: &SC,
    exec_data: &mut ScriptExecutionData,
) -> Result<(), Error> {
    let mut stack = Stack::new(stack, flags.verify_minimaldata());

    if sig_version == SigVersion::Tapscript {
        // OP_SUCCESSx overrides everything, stack element size limits included.
        for op in Instructions::new(exec_script) {
            let op = op.map_err(|_| Error::BadOpcode)?;
            if opcode::is_op_success(op.opcode) {
                if flags.contains(VerifyFlags::DISCOURAGE_OP_SUCCESS) {
                    return Err(Error::DiscourageOpSuccess);
                }
                return Ok(());
            }
        }

        // Initial stack size limit, the altstack is empty here.
        if stack.len() > MAX_STACK_SIZE {
            return Err(Error::StackSize);
        }
    }

    if stack.iter().any(|item| item.len() > MAX_SCRIPT_ELEMENT_SIZE) {
        return Err(Error::PushSize);
    }

    eval_script(&mut stack, exec_script, flags, checker, sig_version, exec_data)?;

    // Scripts inside witness implicitly require cleanstack behaviour.
    if stack.len() != 1 {
        return Err(Error::CleanStack);
    }

    if !stack.peek_bool()? {
        return Err(Error::EvalFalse);
    }

    Ok(())
}

/// Signature operations of a witness program spend, zero for anything that is not one.
pub fn count_witness_sigops(
    script_sig: &[u8],
    script_pubkey: &[u8],
    witness: &Witness,
    flags: &VerifyFlags,
) -> usize {
    if !flags.verify_witness() {
        return 0;
    }
    assert!(flags.verify_p2sh(), "WITNESS requires P2SH");

    if let Some((version, program)) = witness_program(script_pubkey) {
        return witness_sigops(version, program, witness);
    }

    if is_p2sh(script_pubkey) && is_push_only(script_sig) {
        // The redeem script is the last push of the scriptSig.
        let redeem_script = Instructions::new(script_sig)
            .map_while(Result::ok)
            .last()
            .map(|op| op.data)
            .unwrap_or_default();

        if let Some((version, program)) = witness_program(redeem_script) {
            return witness_sigops(version, program, witness);
        }
    }

    0
}

fn witness_sigops(version: u8, program: &[u8], witness: &Witness) -> usize {
    match (version, program.len()) {
        (0, WITNESS_V0_KEYHASH_SIZE) => 1,
        (0, WITNESS_V0_SCRIPTHASH_SIZE) => witness
            .last()
            .map(|script| sigop_count(script, true))
            .unwrap_or(0),
        // Future flags may count other versions.
        _ => 0,
    }
}
