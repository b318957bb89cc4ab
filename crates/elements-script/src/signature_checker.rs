use crate::constants::{
    CURVE_ORDER, LOCKTIME_THRESHOLD, SEQUENCE_FINAL, SEQUENCE_LOCKTIME_DISABLE_FLAG,
    SEQUENCE_LOCKTIME_MASK, SEQUENCE_LOCKTIME_TYPE_FLAG,
};
use crate::error::Error;
use crate::num::ScriptNum;
use crate::sighash::{
    MissingDataBehavior, PrecomputedTransactionData, SighashConfig, SighashError,
    legacy_signature_hash, segwit_v0_signature_hash, taproot_signature_hash,
};
use crate::simplicity::{SimplicityOracle, SimplicityRequest};
use crate::taproot::{TAG_BIP340_CHALLENGE, tagged_engine};
use crate::transaction::{Transaction, Value};
use crate::{ScriptExecutionData, SigVersion, VerifyFlags};
use bitcoin::hashes::{Hash, HashEngine, sha256};
use bitcoin::secp256k1::constants as secp_constants;
use bitcoin::secp256k1::{
    Message, Parity, PublicKey, Scalar, Secp256k1, VerifyOnly, XOnlyPublicKey, ecdsa, schnorr,
};
use num_bigint::{BigInt, Sign};
use std::sync::LazyLock;

pub(crate) static SECP: LazyLock<Secp256k1<VerifyOnly>> = LazyLock::new(Secp256k1::verification_only);

/// Verifies an ECDSA signature without its hashtype byte, accepting lax DER and high S.
pub(crate) fn verify_ecdsa(sig: &[u8], pubkey: &PublicKey, digest: [u8; 32]) -> bool {
    let Ok(mut sig) = ecdsa::Signature::from_der_lax(sig) else {
        return false;
    };
    // libsecp256k1 only accepts low S.
    sig.normalize_s();
    SECP.verify_ecdsa(&Message::from_digest(digest), &sig, pubkey)
        .is_ok()
}

/// Verifies a BIP340 signature over a message of any length.
pub(crate) fn verify_schnorr(sig: &[u8], pubkey: &[u8], msg: &[u8]) -> bool {
    let (Ok(signature), Ok(pubkey)) = (
        schnorr::Signature::from_slice(sig),
        XOnlyPublicKey::from_slice(pubkey),
    ) else {
        return false;
    };

    match <[u8; 32]>::try_from(msg) {
        Ok(digest) => SECP
            .verify_schnorr(&signature, &Message::from_digest(digest), &pubkey)
            .is_ok(),
        Err(_) => verify_schnorr_raw(sig, &pubkey, msg),
    }
}

/// BIP340 verification spelled out on curve points, for messages libsecp256k1 only
/// accepts as 32-byte digests.
///
/// Accepts iff `R = s*G - e*P` is a point with even Y whose X coordinate is `r`, where
/// `e = H_challenge(r || P || msg) mod n`.
pub(crate) fn verify_schnorr_raw(sig: &[u8], pubkey: &XOnlyPublicKey, msg: &[u8]) -> bool {
    if sig.len() != 64 {
        return false;
    }
    let (r, s) = sig.split_at(32);

    let mut engine = tagged_engine(TAG_BIP340_CHALLENGE);
    engine.input(r);
    engine.input(&pubkey.serialize());
    engine.input(msg);
    let challenge = sha256::Hash::from_engine(engine);

    let Ok(s) = <[u8; 32]>::try_from(s) else {
        return false;
    };
    // s must be below the group order, the challenge is reduced into it.
    let (Ok(s), Ok(e)) = (
        Scalar::from_be_bytes(s),
        Scalar::from_be_bytes(reduce_mod_order(challenge.as_byte_array())),
    ) else {
        return false;
    };

    let Ok(generator) = XOnlyPublicKey::from_slice(&secp_constants::GENERATOR_X) else {
        return false;
    };

    // Multiplying by zero yields the point at infinity, which the library reports as an error.
    let s_g = generator.public_key(Parity::Even).mul_tweak(&SECP, &s).ok();
    let minus_e_p = pubkey
        .public_key(Parity::Even)
        .mul_tweak(&SECP, &e)
        .ok()
        .map(|point| point.negate(&SECP));

    let nonce = match (s_g, minus_e_p) {
        (Some(a), Some(b)) => a.combine(&b).ok(),
        (Some(point), None) | (None, Some(point)) => Some(point),
        (None, None) => None,
    };

    nonce.is_some_and(|nonce| {
        let nonce = nonce.serialize();
        nonce[0] == 0x02 && nonce[1..] == *r
    })
}

fn reduce_mod_order(bytes: &[u8; 32]) -> [u8; 32] {
    let value = BigInt::from_bytes_be(Sign::Plus, bytes) % &*CURVE_ORDER;
    let (_, value) = value.to_bytes_be();
    let mut reduced = [0u8; 32];
    reduced[32 - value.len()..].copy_from_slice(&value);
    reduced
}

/// Signature and transaction context of the input being verified.
///
/// The default method bodies describe a checker bound to no transaction: every signature
/// is invalid and all introspection data is unavailable.
pub trait SignatureChecker {
    /// `sig` carries its trailing hashtype byte, `script_code` is already stripped of the
    /// signature for base scripts.
    fn check_ecdsa_signature(
        &self,
        _sig: &[u8],
        _pubkey: &[u8],
        _script_code: &[u8],
        _sig_version: SigVersion,
        _flags: VerifyFlags,
    ) -> bool {
        false
    }

    /// `pubkey` is a 32-byte x-only key, `sig` is 64 bytes or 65 with an explicit hashtype.
    fn check_schnorr_signature(
        &self,
        _sig: &[u8],
        _pubkey: &[u8],
        _sig_version: SigVersion,
        _exec_data: &mut ScriptExecutionData,
    ) -> Result<(), Error> {
        Err(Error::Unknown)
    }

    fn check_lock_time(&self, _lock_time: ScriptNum) -> bool {
        false
    }

    fn check_sequence(&self, _sequence: ScriptNum) -> bool {
        false
    }

    fn check_simplicity(&self, _request: &SimplicityRequest<'_>) -> Result<(), Error> {
        Err(Error::Unknown)
    }

    fn transaction(&self) -> Option<&Transaction> {
        None
    }

    fn input_index(&self) -> Option<usize> {
        None
    }

    fn precomputed(&self) -> Option<&PrecomputedTransactionData> {
        None
    }
}

/// Accepts every signature and every lock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignatureCheck;

impl SignatureChecker for NoSignatureCheck {
    fn check_ecdsa_signature(
        &self,
        _sig: &[u8],
        _pubkey: &[u8],
        _script_code: &[u8],
        _sig_version: SigVersion,
        _flags: VerifyFlags,
    ) -> bool {
        true
    }

    fn check_schnorr_signature(
        &self,
        _sig: &[u8],
        _pubkey: &[u8],
        _sig_version: SigVersion,
        _exec_data: &mut ScriptExecutionData,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn check_lock_time(&self, _lock_time: ScriptNum) -> bool {
        true
    }

    fn check_sequence(&self, _sequence: ScriptNum) -> bool {
        true
    }

    fn check_simplicity(&self, _request: &SimplicityRequest<'_>) -> Result<(), Error> {
        Ok(())
    }
}

/// Checker for size estimation of not yet signed transactions.
///
/// Placeholder signatures are accepted as long as they are present.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummySignatureChecker;

impl SignatureChecker for DummySignatureChecker {
    fn check_ecdsa_signature(
        &self,
        _sig: &[u8],
        _pubkey: &[u8],
        _script_code: &[u8],
        _sig_version: SigVersion,
        _flags: VerifyFlags,
    ) -> bool {
        true
    }

    fn check_schnorr_signature(
        &self,
        sig: &[u8],
        _pubkey: &[u8],
        _sig_version: SigVersion,
        _exec_data: &mut ScriptExecutionData,
    ) -> Result<(), Error> {
        if sig.is_empty() {
            Err(Error::SchnorrSigSize)
        } else {
            Ok(())
        }
    }

    fn check_lock_time(&self, _lock_time: ScriptNum) -> bool {
        true
    }

    fn check_sequence(&self, _sequence: ScriptNum) -> bool {
        true
    }
}

/// Checks signatures of one input of a transaction.
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    amount: Value,
    txdata: Option<&'a PrecomputedTransactionData>,
    missing_data_behavior: MissingDataBehavior,
    sighash_config: SighashConfig,
    simplicity: Option<&'a dyn SimplicityOracle>,
}

impl<'a> TransactionSignatureChecker<'a> {
    /// Constructs a new instance of [`TransactionSignatureChecker`].
    ///
    /// `amount` is the value of the spent output, committed to by segwit v0 signatures.
    pub fn new(tx: &'a Transaction, input_index: usize, amount: Value) -> Self {
        Self {
            tx,
            input_index,
            amount,
            txdata: None,
            missing_data_behavior: MissingDataBehavior::AssertFail,
            sighash_config: SighashConfig::default(),
            simplicity: None,
        }
    }

    /// Uses the precomputed digests of the transaction.
    pub fn with_txdata(mut self, txdata: &'a PrecomputedTransactionData) -> Self {
        self.txdata = Some(txdata);
        self
    }

    pub fn with_missing_data_behavior(mut self, behavior: MissingDataBehavior) -> Self {
        self.missing_data_behavior = behavior;
        self
    }

    pub fn with_sighash_config(mut self, config: SighashConfig) -> Self {
        self.sighash_config = config;
        self
    }

    pub fn with_simplicity_oracle(mut self, oracle: &'a dyn SimplicityOracle) -> Self {
        self.simplicity = Some(oracle);
        self
    }

    /// Returns `false` for [`MissingDataBehavior::Fail`].
    ///
    /// # Panics
    ///
    /// Panics for [`MissingDataBehavior::AssertFail`], the caller promised the data.
    fn handle_missing_data(&self) -> bool {
        match self.missing_data_behavior {
            MissingDataBehavior::AssertFail => {
                panic!("Precomputed transaction data must be available for input {}", self.input_index)
            }
            MissingDataBehavior::Fail => {
                tracing::debug!(
                    input_index = self.input_index,
                    "Signature check failed due to missing precomputed data"
                );
                false
            }
        }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_ecdsa_signature(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        sig_version: SigVersion,
        flags: VerifyFlags,
    ) -> bool {
        let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
            return false;
        };

        let Some((&hash_type, sig)) = sig.split_last() else {
            return false;
        };

        if self.input_index >= self.tx.input.len() {
            return false;
        }

        let sighash = match sig_version {
            SigVersion::Base => legacy_signature_hash(
                script_code,
                self.tx,
                self.input_index,
                u32::from(hash_type),
                flags,
            ),
            SigVersion::WitnessV0 => {
                if self.amount.is_null() {
                    return self.handle_missing_data();
                }
                segwit_v0_signature_hash(
                    script_code,
                    self.tx,
                    self.input_index,
                    u32::from(hash_type),
                    &self.amount,
                    flags,
                    self.txdata,
                    self.sighash_config,
                )
            }
            SigVersion::Taproot | SigVersion::Tapscript => return false,
        };

        verify_ecdsa(sig, &pubkey, sighash)
    }

    fn check_schnorr_signature(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        sig_version: SigVersion,
        exec_data: &mut ScriptExecutionData,
    ) -> Result<(), Error> {
        let (sig, hash_type) = match sig.len() {
            64 => (sig, 0),
            65 => match sig.split_last() {
                Some((&0, _)) => return Err(Error::SchnorrSigHashType),
                Some((&hash_type, sig)) => (sig, hash_type),
                None => return Err(Error::SchnorrSigSize),
            },
            _ => return Err(Error::SchnorrSigSize),
        };

        let Some(txdata) = self.txdata else {
            self.handle_missing_data();
            return Err(Error::Unknown);
        };

        if self.input_index >= self.tx.input.len() {
            return Err(Error::Unknown);
        }

        let sighash = taproot_signature_hash(
            exec_data,
            self.tx,
            self.input_index,
            hash_type,
            sig_version,
            txdata,
        )
        .map_err(|err| {
            if err == SighashError::MissingData {
                self.handle_missing_data();
            }
            Error::SchnorrSigHashType
        })?;

        if !verify_schnorr(sig, pubkey, sighash.as_byte_array()) {
            return Err(Error::SchnorrSig);
        }

        Ok(())
    }

    fn check_lock_time(&self, lock_time: ScriptNum) -> bool {
        // Lock-by-blockheight and lock-by-blocktime can not be compared with each other.
        let tx_lock_time = i64::from(self.tx.lock_time);
        let lock_time = lock_time.value();
        if (tx_lock_time < LOCKTIME_THRESHOLD) != (lock_time < LOCKTIME_THRESHOLD) {
            return false;
        }

        if lock_time > tx_lock_time {
            return false;
        }

        // A final input would let the transaction in regardless of its lock time.
        self.tx
            .input
            .get(self.input_index)
            .is_some_and(|input| input.sequence != SEQUENCE_FINAL)
    }

    fn check_sequence(&self, sequence: ScriptNum) -> bool {
        let Some(input) = self.tx.input.get(self.input_index) else {
            return false;
        };

        // BIP68 relative lock times only apply from version 2 on.
        if (self.tx.version as u32) < 2 {
            return false;
        }

        if input.sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return false;
        }

        let mask = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK);
        let tx_sequence = i64::from(input.sequence) & mask;
        let sequence = sequence.value() & mask;
        let type_flag = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG);

        if (tx_sequence < type_flag) != (sequence < type_flag) {
            return false;
        }

        sequence <= tx_sequence
    }

    fn check_simplicity(&self, request: &SimplicityRequest<'_>) -> Result<(), Error> {
        let Some(txdata) = self.txdata else {
            self.handle_missing_data();
            return Err(Error::Unknown);
        };

        let Some(oracle) = self.simplicity else {
            tracing::debug!(
                input_index = self.input_index,
                "No Simplicity evaluator configured, rejecting Simplicity leaf"
            );
            return Err(Error::Unknown);
        };

        oracle
            .execute(
                self.tx,
                self.input_index,
                txdata,
                txdata.genesis_hash(),
                request,
            )
            .map_err(|err| {
                tracing::debug!(input_index = self.input_index, ?err, "Simplicity program rejected");
                Error::Simplicity(err)
            })
    }

    fn transaction(&self) -> Option<&Transaction> {
        Some(self.tx)
    }

    fn input_index(&self) -> Option<usize> {
        Some(self.input_index)
    }

    fn precomputed(&self) -> Option<&PrecomputedTransactionData> {
        self.txdata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sign_schnorr_raw;
    use crate::transaction::TxIn;
    use bitcoin::secp256k1::Keypair;

    fn tx_with(version: i32, lock_time: u32, sequence: u32) -> Transaction {
        Transaction {
            version,
            input: vec![TxIn {
                sequence,
                ..Default::default()
            }],
            lock_time,
            ..Default::default()
        }
    }

    #[test]
    fn lock_time_compares_same_kind_only() {
        let tx = tx_with(2, 1000, 0);
        let checker = TransactionSignatureChecker::new(&tx, 0, Value::Null);
        assert!(checker.check_lock_time(ScriptNum::from(999)));
        assert!(checker.check_lock_time(ScriptNum::from(1000)));
        assert!(!checker.check_lock_time(ScriptNum::from(1001)));
        assert!(!checker.check_lock_time(ScriptNum::from(LOCKTIME_THRESHOLD)));

        let final_tx = tx_with(2, 1000, SEQUENCE_FINAL);
        let checker = TransactionSignatureChecker::new(&final_tx, 0, Value::Null);
        assert!(!checker.check_lock_time(ScriptNum::from(999)));
    }

    #[test]
    fn sequence_requires_version_two_and_enabled_lock() {
        let tx = tx_with(2, 0, 10);
        let checker = TransactionSignatureChecker::new(&tx, 0, Value::Null);
        assert!(checker.check_sequence(ScriptNum::from(10)));
        assert!(!checker.check_sequence(ScriptNum::from(11)));
        // Time based operand against a height based sequence.
        assert!(!checker.check_sequence(ScriptNum::from(i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG))));

        let v1 = tx_with(1, 0, 10);
        assert!(!TransactionSignatureChecker::new(&v1, 0, Value::Null).check_sequence(ScriptNum::from(1)));

        let disabled = tx_with(2, 0, SEQUENCE_LOCKTIME_DISABLE_FLAG | 10);
        assert!(
            !TransactionSignatureChecker::new(&disabled, 0, Value::Null)
                .check_sequence(ScriptNum::from(1))
        );
    }

    #[test]
    fn schnorr_size_and_hashtype_are_checked_first() {
        let tx = tx_with(2, 0, 0);
        let checker = TransactionSignatureChecker::new(&tx, 0, Value::Null)
            .with_missing_data_behavior(MissingDataBehavior::Fail);
        let mut exec_data = ScriptExecutionData::default();
        let pubkey = [2u8; 32];

        assert_eq!(
            checker.check_schnorr_signature(&[1; 63], &pubkey, SigVersion::Taproot, &mut exec_data),
            Err(Error::SchnorrSigSize)
        );
        let mut sig = vec![1u8; 64];
        sig.push(0);
        assert_eq!(
            checker.check_schnorr_signature(&sig, &pubkey, SigVersion::Taproot, &mut exec_data),
            Err(Error::SchnorrSigHashType)
        );
        // No precomputed data under the Fail policy.
        assert_eq!(
            checker.check_schnorr_signature(&[1; 64], &pubkey, SigVersion::Taproot, &mut exec_data),
            Err(Error::Unknown)
        );
    }

    #[test]
    #[should_panic]
    fn missing_amount_panics_under_assert_fail() {
        let tx = tx_with(2, 0, 0);
        let checker = TransactionSignatureChecker::new(&tx, 0, Value::Null);
        let pubkey = hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
            .unwrap();
        checker.check_ecdsa_signature(&[0x30, 0x01], &pubkey, &[], SigVersion::WitnessV0, VerifyFlags::NONE);
    }

    #[test]
    fn missing_amount_fails_under_fail_policy() {
        let tx = tx_with(2, 0, 0);
        let checker = TransactionSignatureChecker::new(&tx, 0, Value::Null)
            .with_missing_data_behavior(MissingDataBehavior::Fail);
        let pubkey = hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
            .unwrap();
        assert!(!checker.check_ecdsa_signature(
            &[0x30, 0x01],
            &pubkey,
            &[],
            SigVersion::WitnessV0,
            VerifyFlags::NONE
        ));
    }

    fn schnorr_keypair() -> Keypair {
        Keypair::from_seckey_slice(&Secp256k1::new(), &[0x35; 32]).unwrap()
    }

    #[test]
    fn raw_schnorr_agrees_with_libsecp256k1_on_digests() {
        let secp = Secp256k1::new();
        let keypair = schnorr_keypair();
        let pubkey = keypair.x_only_public_key().0;
        let digest = [0x5a; 32];

        let sig = secp
            .sign_schnorr_no_aux_rand(&Message::from_digest(digest), &keypair)
            .as_ref()
            .to_vec();
        assert!(verify_schnorr_raw(&sig, &pubkey, &digest));
        assert!(!verify_schnorr_raw(&sig, &pubkey, &[0x5b; 32]));

        let raw = sign_schnorr_raw(&keypair, &digest);
        let raw = schnorr::Signature::from_slice(&raw).unwrap();
        secp.verify_schnorr(&raw, &Message::from_digest(digest), &pubkey)
            .unwrap();
    }

    #[test]
    fn schnorr_messages_of_any_length() {
        let keypair = schnorr_keypair();
        let pubkey = keypair.x_only_public_key().0.serialize();

        for msg in [Vec::new(), b"hello".to_vec(), vec![0x99; 100]] {
            let sig = sign_schnorr_raw(&keypair, &msg);
            assert!(verify_schnorr(&sig, &pubkey, &msg), "{} bytes", msg.len());

            let mut other = msg.clone();
            other.push(0);
            assert!(!verify_schnorr(&sig, &pubkey, &other));

            let mut tampered = sig.clone();
            tampered[63] ^= 1;
            assert!(!verify_schnorr(&tampered, &pubkey, &msg));
        }
    }

    #[test]
    fn schnorr_rejects_s_above_order() {
        let keypair = schnorr_keypair();
        let pubkey = keypair.x_only_public_key().0.serialize();
        let mut sig = sign_schnorr_raw(&keypair, b"hello");
        sig[32..].copy_from_slice(&[0xff; 32]);
        assert!(!verify_schnorr(&sig, &pubkey, b"hello"));
    }
}
