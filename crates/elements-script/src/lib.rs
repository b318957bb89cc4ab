//! # Elements Script Interpreter
//!
//! Script execution and signature verification for Elements transactions: legacy,
//! segwit v0, taproot key path and tapscript, plus the confidential-transaction,
//! introspection and 64-bit arithmetic extensions of the Elements script language.
//!
//! The entry point is [`verify_script`], which runs the unlocking script, the locking
//! script and (if any) the witness program of one input against a [`SignatureChecker`].

mod condition_stack;
pub mod constants;
mod error;
mod interpreter;
pub mod num;
pub mod opcode;
pub mod script;
pub mod sighash;
mod signature_checker;
pub mod simplicity;
mod stack;
pub mod taproot;
pub mod transaction;


use bitcoin::hashes::sha256;
use bitflags::bitflags;

pub use self::condition_stack::ConditionStack;
pub use self::error::Error;
pub use self::interpreter::{
    SignatureEncodingError, check_pubkey_encoding, check_signature_encoding, count_witness_sigops,
    eval_script, verify_script,
};
pub use self::sighash::{MissingDataBehavior, PrecomputedTransactionData, SighashConfig};
pub use self::signature_checker::{
    DummySignatureChecker, NoSignatureCheck, SignatureChecker, TransactionSignatureChecker,
};
pub use self::stack::{Stack, StackError, cast_to_bool};

bitflags! {
    /// Script verification flags.
    ///
    /// Bits 0 to 20 keep their Bitcoin Core positions, the Elements flags follow.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VerifyFlags: u32 {
        const NONE = 0;

        /// Evaluate P2SH subscripts (BIP16).
        const P2SH = 1 << 0;

        /// Passing a non-strict-DER signature or one with undefined hashtype to a checksig
        /// operation causes script failure. Evaluating a pubkey that is not (0x04 + 64 bytes)
        /// or (0x02 or 0x03 + 32 bytes) by checksig causes script failure.
        const STRICTENC = 1 << 1;

        /// Passing a non-strict-DER signature to a checksig operation causes script failure (BIP62 rule 1).
        const DERSIG = 1 << 2;

        /// Passing a non-strict-DER signature or one with S > order/2 to a checksig operation
        /// causes script failure (BIP62 rule 5).
        const LOW_S = 1 << 3;

        /// Verify dummy stack item consumed by CHECKMULTISIG is of zero-length (BIP62 rule 7).
        const NULLDUMMY = 1 << 4;

        /// Using a non-push operator in the scriptSig causes script failure (BIP62 rule 2).
        const SIGPUSHONLY = 1 << 5;

        /// Require minimal encodings for all push operations and script numbers.
        const MINIMALDATA = 1 << 6;

        /// Discourage use of NOPs reserved for upgrades (NOP1-10).
        const DISCOURAGE_UPGRADABLE_NOPS = 1 << 7;

        /// Require that only a single stack element remains after evaluation.
        const CLEANSTACK = 1 << 8;

        /// Verify CHECKLOCKTIMEVERIFY (BIP65).
        const CHECKLOCKTIMEVERIFY = 1 << 9;

        /// Support CHECKSEQUENCEVERIFY opcode (BIP112).
        const CHECKSEQUENCEVERIFY = 1 << 10;

        /// Support segregated witness.
        const WITNESS = 1 << 11;

        /// Making v1-v16 witness program non-standard.
        const DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM = 1 << 12;

        /// Segwit script only: require the argument of OP_IF/NOTIF to be exactly 0x01 or empty vector.
        const MINIMALIF = 1 << 13;

        /// Signature(s) must be empty vector if a CHECK(MULTI)SIG operation failed.
        const NULLFAIL = 1 << 14;

        /// Public keys in segregated witness scripts must be compressed.
        const WITNESS_PUBKEYTYPE = 1 << 15;

        /// Making OP_CODESEPARATOR and FindAndDelete fail any non-segwit scripts.
        const CONST_SCRIPTCODE = 1 << 16;

        /// Taproot/Tapscript validation (BIPs 341 & 342).
        const TAPROOT = 1 << 17;

        /// Making unknown Taproot leaf versions non-standard.
        const DISCOURAGE_UPGRADABLE_TAPROOT_VERSION = 1 << 18;

        /// Making unknown OP_SUCCESS non-standard.
        const DISCOURAGE_OP_SUCCESS = 1 << 19;

        /// Making unknown public key versions (in BIP 342 scripts) non-standard.
        const DISCOURAGE_UPGRADABLE_PUBKEYTYPE = 1 << 20;

        /// Allow the SIGHASH_RANGEPROOF bit in signature hash types.
        const SIGHASH_RANGEPROOF = 1 << 21;

        /// Evaluate Simplicity leaves of Taproot outputs.
        const SIMPLICITY = 1 << 22;

        /// Signatures carry no trailing hashtype byte. Only set internally by CHECKSIGFROMSTACK.
        const NO_SIGHASH_BYTE = 1 << 31;
    }
}

impl VerifyFlags {
    pub fn verify_p2sh(&self) -> bool {
        self.contains(Self::P2SH)
    }

    pub fn verify_strictenc(&self) -> bool {
        self.contains(Self::STRICTENC)
    }

    pub fn verify_dersig(&self) -> bool {
        self.contains(Self::DERSIG)
    }

    pub fn verify_low_s(&self) -> bool {
        self.contains(Self::LOW_S)
    }

    pub fn verify_nulldummy(&self) -> bool {
        self.contains(Self::NULLDUMMY)
    }

    pub fn verify_sigpushonly(&self) -> bool {
        self.contains(Self::SIGPUSHONLY)
    }

    pub fn verify_minimaldata(&self) -> bool {
        self.contains(Self::MINIMALDATA)
    }

    pub fn verify_discourage_upgradable_nops(&self) -> bool {
        self.contains(Self::DISCOURAGE_UPGRADABLE_NOPS)
    }

    pub fn verify_cleanstack(&self) -> bool {
        self.contains(Self::CLEANSTACK)
    }

    pub fn verify_checklocktimeverify(&self) -> bool {
        self.contains(Self::CHECKLOCKTIMEVERIFY)
    }

    pub fn verify_checksequenceverify(&self) -> bool {
        self.contains(Self::CHECKSEQUENCEVERIFY)
    }

    pub fn verify_witness(&self) -> bool {
        self.contains(Self::WITNESS)
    }

    pub fn verify_minimalif(&self) -> bool {
        self.contains(Self::MINIMALIF)
    }

    pub fn verify_nullfail(&self) -> bool {
        self.contains(Self::NULLFAIL)
    }

    pub fn verify_witness_pubkeytype(&self) -> bool {
        self.contains(Self::WITNESS_PUBKEYTYPE)
    }

    pub fn verify_const_scriptcode(&self) -> bool {
        self.contains(Self::CONST_SCRIPTCODE)
    }

    pub fn verify_taproot(&self) -> bool {
        self.contains(Self::TAPROOT)
    }

    pub fn verify_simplicity(&self) -> bool {
        self.contains(Self::SIMPLICITY)
    }

    pub fn sighash_rangeproof(&self) -> bool {
        self.contains(Self::SIGHASH_RANGEPROOF)
    }

    pub fn no_sighash_byte(&self) -> bool {
        self.contains(Self::NO_SIGHASH_BYTE)
    }
}

/// Represents different signature verification schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigVersion {
    /// Bare scripts and BIP16 P2SH-wrapped redeemscripts
    Base,
    /// Witness v0 (P2WPKH and P2WSH); see BIP 141
    WitnessV0,
    /// Witness v1 with 32-byte program, not BIP16 P2SH-wrapped, key path spending; see BIP 341
    Taproot,
    /// Witness v1 with 32-byte program, not BIP16 P2SH-wrapped, script path spending,
    /// leaf version 0xc4; see BIP 342
    Tapscript,
}

/// State of one script execution that lives outside of the stacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptExecutionData {
    /// The tapleaf hash of the executed script, tapscript only.
    pub tapleaf_hash: Option<sha256::Hash>,

    /// Opcode position of the last executed OP_CODESEPARATOR (or 0xFFFFFFFF if none executed).
    pub codeseparator_pos: Option<u32>,

    /// Whether the annex fields were filled in.
    pub annex_init: bool,
    /// Hash of the annex, if one is present.
    pub annex_hash: Option<sha256::Hash>,

    /// How much validation weight is left (decremented for every successful non-empty signature check)
    pub validation_weight_left: Option<i64>,

    /// Cached hash of the output at the input's index, for SIGHASH_SINGLE.
    pub output_hash: Option<sha256::Hash>,
    /// Cached hash of the witness of the output at the input's index, for SIGHASH_SINGLE.
    pub output_witness_hash: Option<sha256::Hash>,
}
