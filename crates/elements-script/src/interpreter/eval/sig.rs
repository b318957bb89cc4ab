use crate::constants::{
    COMPRESSED_PUBKEY_SIZE, CURVE_ORDER, HALF_ORDER, SIGHASH_ALL, SIGHASH_ANYONECANPAY,
    SIGHASH_RANGEPROOF, SIGHASH_SINGLE, VALIDATION_WEIGHT_PER_SIGOP_PASSED,
};
use crate::error::Error;
use crate::script::{find_and_delete, push_data};
use crate::signature_checker::{SignatureChecker, verify_ecdsa, verify_schnorr};
use crate::{ScriptExecutionData, SigVersion, VerifyFlags};
use bitcoin::hashes::{Hash, sha256};
use bitcoin::secp256k1::PublicKey;
use num_bigint::Sign;

/// Strict DER violations of an ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureEncodingError {
    #[error("DER encoded signature is too short")]
    TooShort,
    #[error("DER encoded signature is too long")]
    TooLong,
    #[error("signature does not have the expected ASN.1 sequence ID")]
    InvalidSequenceId,
    #[error("signature length")]
    InvalidDataLength,
    #[error("R integer marker")]
    InvalidIntegerIdR,
    #[error("R length is zero")]
    ZeroLengthR,
    #[error("R is negative")]
    NegativeR,
    #[error("R value has too much padding")]
    TooMuchPaddingR,
    #[error("S integer marker")]
    InvalidIntegerIdS,
    #[error("S length is zero")]
    ZeroLengthS,
    #[error("S is negative")]
    NegativeS,
    #[error("S value has too much padding")]
    TooMuchPaddingS,
}

/// Position of the S integer inside a DER signature.
struct SValue {
    offset: usize,
    len: usize,
}

/// Strict DER check of `sig`, which still carries its trailing hashtype byte.
///
/// Layout: `0x30 [total-length] 0x02 [R-length] [R] 0x02 [S-length] [S] [sighash]`,
/// see BIP 66.
fn parse_strict_der(sig: &[u8]) -> Result<SValue, SignatureEncodingError> {
    use SignatureEncodingError::*;

    match sig.len() {
        0..=8 => return Err(TooShort),
        74.. => return Err(TooLong),
        _ => {}
    }

    if sig[0] != 0x30 {
        return Err(InvalidSequenceId);
    }

    // The length covers everything but the header and the hashtype.
    if usize::from(sig[1]) != sig.len() - 3 {
        return Err(InvalidDataLength);
    }

    let len_r = usize::from(sig[3]);
    if 5 + len_r >= sig.len() {
        return Err(InvalidDataLength);
    }

    let len_s = usize::from(sig[5 + len_r]);
    if len_r + len_s + 7 != sig.len() {
        return Err(InvalidDataLength);
    }

    if sig[2] != 0x02 {
        return Err(InvalidIntegerIdR);
    }
    if len_r == 0 {
        return Err(ZeroLengthR);
    }
    if sig[4] & 0x80 != 0 {
        return Err(NegativeR);
    }
    // A leading zero is only allowed to keep R from being read as negative.
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return Err(TooMuchPaddingR);
    }

    let s_offset = len_r + 6;
    if sig[len_r + 4] != 0x02 {
        return Err(InvalidIntegerIdS);
    }
    if len_s == 0 {
        return Err(ZeroLengthS);
    }
    if sig[s_offset] & 0x80 != 0 {
        return Err(NegativeS);
    }
    if len_s > 1 && sig[s_offset] == 0x00 && sig[s_offset + 1] & 0x80 == 0 {
        return Err(TooMuchPaddingS);
    }

    Ok(SValue {
        offset: s_offset,
        len: len_s,
    })
}

/// libsecp256k1's lax DER parser reads a signature whose R or S is not below the group
/// order as all zeros. Such a signature is therefore not high S, it just never verifies.
fn check_low_s(sig: &[u8]) -> Result<(), Error> {
    let s = parse_strict_der(sig)?;
    let len_r = usize::from(sig[3]);
    let r_value = num_bigint::BigInt::from_bytes_be(Sign::Plus, &sig[4..4 + len_r]);
    let s_value =
        num_bigint::BigInt::from_bytes_be(Sign::Plus, &sig[s.offset..s.offset + s.len]);

    if r_value >= *CURVE_ORDER || s_value >= *CURVE_ORDER {
        return Ok(());
    }

    if s_value > *HALF_ORDER {
        return Err(Error::SigHighS);
    }

    Ok(())
}

fn is_defined_hashtype(sig: &[u8], flags: &VerifyFlags) -> bool {
    let Some(&last) = sig.last() else {
        return false;
    };

    let mut hash_type = last & !SIGHASH_ANYONECANPAY;
    if flags.sighash_rangeproof() {
        hash_type &= !SIGHASH_RANGEPROOF;
    }

    (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&hash_type)
}

/// Checks the encoding rules the flags impose on an ECDSA signature.
///
/// The empty signature always passes, it is the canonical way to fail a CHECK(MULTI)SIG.
/// Under [`VerifyFlags::NO_SIGHASH_BYTE`] the signature is treated as if SIGHASH_ALL
/// were appended.
pub fn check_signature_encoding(sig: &[u8], flags: &VerifyFlags) -> Result<(), Error> {
    if sig.is_empty() {
        return Ok(());
    }

    let mut owned;
    let sig = if flags.no_sighash_byte() {
        owned = Vec::with_capacity(sig.len() + 1);
        owned.extend_from_slice(sig);
        owned.push(SIGHASH_ALL);
        &owned[..]
    } else {
        sig
    };

    if flags.intersects(VerifyFlags::DERSIG | VerifyFlags::LOW_S | VerifyFlags::STRICTENC) {
        parse_strict_der(sig)?;
    }

    if flags.verify_low_s() {
        check_low_s(sig)?;
    }

    if flags.verify_strictenc() && !is_defined_hashtype(sig, flags) {
        return Err(Error::SigHashType);
    }

    Ok(())
}

/// Checks the encoding rules the flags impose on a public key.
pub fn check_pubkey_encoding(
    pubkey: &[u8],
    flags: &VerifyFlags,
    sig_version: SigVersion,
) -> Result<(), Error> {
    if flags.verify_strictenc() && !is_public_key(pubkey) {
        return Err(Error::PubkeyType);
    }

    if flags.verify_witness_pubkeytype()
        && sig_version == SigVersion::WitnessV0
        && !is_compressed_pubkey(pubkey)
    {
        return Err(Error::WitnessPubkeyType);
    }

    Ok(())
}

fn is_public_key(v: &[u8]) -> bool {
    match v.len() {
        33 => matches!(v[0], 0x02 | 0x03),
        65 => v[0] == 0x04,
        _ => false,
    }
}

pub(super) fn is_compressed_pubkey(pubkey: &[u8]) -> bool {
    pubkey.len() == COMPRESSED_PUBKEY_SIZE && matches!(pubkey[0], 0x02 | 0x03)
}

/// Deducts one passing signature from the tapscript validation budget.
pub(super) fn charge_validation_weight(exec_data: &mut ScriptExecutionData) -> Result<(), Error> {
    let Some(left) = exec_data.validation_weight_left.as_mut() else {
        return Err(Error::Unknown);
    };

    *left -= VALIDATION_WEIGHT_PER_SIGOP_PASSED;
    if *left < 0 {
        return Err(Error::TapscriptValidationWeight);
    }

    Ok(())
}

/// Evaluates one CHECKSIG, CHECKSIGVERIFY or CHECKSIGADD signature check.
///
/// `script_code` is the executed script from the last OP_CODESEPARATOR on.
pub(super) fn eval_checksig(
    sig: &[u8],
    pubkey: &[u8],
    script_code: &[u8],
    exec_data: &mut ScriptExecutionData,
    flags: &VerifyFlags,
    checker: &(impl SignatureChecker + ?Sized),
    sig_version: SigVersion,
) -> Result<bool, Error> {
    match sig_version {
        SigVersion::Base | SigVersion::WitnessV0 => {
            eval_checksig_pre_tapscript(sig, pubkey, script_code, flags, checker, sig_version)
        }
        SigVersion::Tapscript => {
            eval_checksig_tapscript(sig, pubkey, flags, checker, sig_version, exec_data)
        }
        // Key path spends have no script to execute.
        SigVersion::Taproot => Err(Error::Unknown),
    }
}

fn eval_checksig_pre_tapscript(
    sig: &[u8],
    pubkey: &[u8],
    script_code: &[u8],
    flags: &VerifyFlags,
    checker: &(impl SignatureChecker + ?Sized),
    sig_version: SigVersion,
) -> Result<bool, Error> {
    let mut script_code = script_code.to_vec();

    // A signature can not sign itself, drop it from the legacy script code.
    if sig_version == SigVersion::Base {
        let found = find_and_delete(&mut script_code, &push_data(sig));
        if found > 0 && flags.verify_const_scriptcode() {
            return Err(Error::SigFindAndDelete);
        }
    }

    check_signature_encoding(sig, flags)?;
    check_pubkey_encoding(pubkey, flags, sig_version)?;

    let success = checker.check_ecdsa_signature(sig, pubkey, &script_code, sig_version, *flags);

    if !success && flags.verify_nullfail() && !sig.is_empty() {
        return Err(Error::NullFail);
    }

    Ok(success)
}

fn eval_checksig_tapscript(
    sig: &[u8],
    pubkey: &[u8],
    flags: &VerifyFlags,
    checker: &(impl SignatureChecker + ?Sized),
    sig_version: SigVersion,
    exec_data: &mut ScriptExecutionData,
) -> Result<bool, Error> {
    // Consensus critical order: upgradable key types come before everything else, an empty
    // signature with an invalid key fails, a non-empty invalid signature fails.
    let success = !sig.is_empty();

    if success {
        // Passing with an upgradable public key version is charged as well.
        charge_validation_weight(exec_data)?;
    }

    match pubkey.len() {
        0 => return Err(Error::PubkeyType),
        32 => {
            if success {
                checker.check_schnorr_signature(sig, pubkey, sig_version, exec_data)?;
            }
        }
        _ => {
            if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_PUBKEYTYPE) {
                return Err(Error::DiscourageUpgradablePubkeyType);
            }
        }
    }

    Ok(success)
}

/// CHECKSIGFROMSTACK(VERIFY): checks `sig` of `pubkey` over the message `data` taken from
/// the stack rather than over the transaction.
pub(super) fn eval_checksig_from_stack(
    sig: &[u8],
    data: &[u8],
    pubkey: &[u8],
    exec_data: &mut ScriptExecutionData,
    flags: &VerifyFlags,
    sig_version: SigVersion,
) -> Result<bool, Error> {
    match sig_version {
        SigVersion::Base | SigVersion::WitnessV0 => {
            // Signatures from the stack never carry a hashtype byte.
            check_signature_encoding(sig, &(*flags | VerifyFlags::NO_SIGHASH_BYTE))?;
            check_pubkey_encoding(pubkey, flags, sig_version)?;

            let digest = sha256::Hash::hash(data).to_byte_array();
            let success = PublicKey::from_slice(pubkey)
                .is_ok_and(|pubkey| verify_ecdsa(sig, &pubkey, digest));

            // Can not be failed softly before tapscript.
            if !success {
                return Err(Error::CheckSigVerify);
            }

            Ok(true)
        }
        SigVersion::Tapscript => {
            let success = !sig.is_empty();
            if success {
                charge_validation_weight(exec_data)?;
            }

            match pubkey.len() {
                0 => return Err(Error::PubkeyType),
                32 => {
                    if success {
                        if sig.len() != 64 {
                            return Err(Error::SchnorrSigSize);
                        }
                        if !verify_schnorr(sig, pubkey, data) {
                            return Err(Error::SchnorrSig);
                        }
                    }
                }
                _ => {
                    if flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_PUBKEYTYPE) {
                        return Err(Error::DiscourageUpgradablePubkeyType);
                    }
                }
            }

            Ok(success)
        }
        SigVersion::Taproot => Err(Error::Unknown),
    }
}
