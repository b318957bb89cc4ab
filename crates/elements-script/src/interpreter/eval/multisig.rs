use super::sig::{check_pubkey_encoding, check_signature_encoding};
use crate::constants::{MAX_OPS_PER_SCRIPT, MAX_PUBKEYS_PER_MULTISIG};
use crate::error::Error;
use crate::script::{find_and_delete, push_data};
use crate::signature_checker::SignatureChecker;
use crate::stack::Stack;
use crate::{SigVersion, VerifyFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MultiSigOp {
    CheckMultiSig,
    CheckMultiSigVerify,
}

/// Handles OP_CHECKMULTISIG and OP_CHECKMULTISIGVERIFY.
///
/// ([sig ...] num_of_signatures [pubkey ...] num_of_pubkeys -- bool)
#[allow(clippy::too_many_arguments)]
pub(super) fn handle_checkmultisig(
    stack: &mut Stack,
    flags: &VerifyFlags,
    script_code: &[u8],
    sig_version: SigVersion,
    checker: &(impl SignatureChecker + ?Sized),
    multisig_op: MultiSigOp,
    op_count: &mut usize,
) -> Result<(), Error> {
    let success = eval_checkmultisig(stack, flags, script_code, sig_version, checker, op_count)?;

    match multisig_op {
        MultiSigOp::CheckMultiSig => stack.push_bool(success),
        MultiSigOp::CheckMultiSigVerify if !success => return Err(Error::CheckMultiSigVerify),
        MultiSigOp::CheckMultiSigVerify => {}
    }

    Ok(())
}

/// Checks the signatures and consumes every argument including the dummy element.
fn eval_checkmultisig(
    stack: &mut Stack,
    flags: &VerifyFlags,
    script_code: &[u8],
    sig_version: SigVersion,
    checker: &(impl SignatureChecker + ?Sized),
    op_count: &mut usize,
) -> Result<bool, Error> {
    if sig_version == SigVersion::Tapscript {
        return Err(Error::TapscriptCheckMultiSig);
    }

    // Depth of the argument being read, counted from the top starting at 1.
    let mut i = 1;

    let keys_count = stack.num_at(i - 1)?.value();
    if !(0..=MAX_PUBKEYS_PER_MULTISIG).contains(&keys_count) {
        return Err(Error::PubkeyCount);
    }
    let mut keys_count = keys_count as usize;

    *op_count += keys_count;
    if *op_count > MAX_OPS_PER_SCRIPT {
        return Err(Error::OpCount);
    }

    i += 1;
    let mut ikey = i;
    // Key depth below which failed signatures must be empty under NULLFAIL.
    let mut ikey2 = keys_count + 2;
    i += keys_count;

    let sigs_count = stack.num_at(i - 1)?.value();
    if sigs_count < 0 || sigs_count as usize > keys_count {
        return Err(Error::SigCount);
    }
    let mut sigs_count = sigs_count as usize;

    i += 1;
    let mut isig = i;
    i += sigs_count;
    stack.require(i)?;

    // Signatures can not sign themselves, drop them from a legacy script code.
    let mut script_code = script_code.to_vec();
    if sig_version == SigVersion::Base {
        for k in 0..sigs_count {
            let sig = stack.top(isig + k - 1)?;
            let found = find_and_delete(&mut script_code, &push_data(sig));
            if found > 0 && flags.verify_const_scriptcode() {
                return Err(Error::SigFindAndDelete);
            }
        }
    }

    let mut success = true;
    while success && sigs_count > 0 {
        let sig = stack.top(isig - 1)?;
        let pubkey = stack.top(ikey - 1)?;

        // Encoding is only checked for the pairs actually compared.
        check_signature_encoding(sig, flags)?;
        check_pubkey_encoding(pubkey, flags, sig_version)?;

        if checker.check_ecdsa_signature(sig, pubkey, &script_code, sig_version, *flags) {
            isig += 1;
            sigs_count -= 1;
        }
        ikey += 1;
        keys_count -= 1;

        // Not enough keys left for the remaining signatures.
        if sigs_count > keys_count {
            success = false;
        }
    }

    // Pop every argument but the dummy, checking NULLFAIL on the signatures.
    while i > 1 {
        i -= 1;
        if !success && flags.verify_nullfail() && ikey2 == 0 && !stack.top(0)?.is_empty() {
            return Err(Error::NullFail);
        }
        ikey2 = ikey2.saturating_sub(1);
        stack.pop()?;
    }

    // One extra element is consumed, a bug of the first implementation kept for
    // consensus. Its content is a malleability vector, hence NULLDUMMY.
    let dummy = stack.pop()?;
    if flags.verify_nulldummy() && !dummy.is_empty() {
        return Err(Error::SigNullDummy);
    }

    Ok(success)
}
