use crate::constants::{MAX_OPS_PER_SCRIPT, MAX_SCRIPT_ELEMENT_SIZE, MAX_STACK_SIZE};
use crate::interpreter::SignatureEncodingError;
use crate::num::NumError;
use crate::simplicity::SimplicityError;
use crate::stack::StackError;

/// Script error type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Generic failure, also the result of internal invariant violations.
    #[error("unknown error")]
    Unknown,
    /// The script evaluated without error but terminated with a false top stack element.
    #[error("script terminated with a false stack element")]
    EvalFalse,
    #[error("OP_RETURN was encountered")]
    OpReturn,

    // Max sizes.
    #[error("script is too big")]
    ScriptSize,
    #[error("push value size limit ({MAX_SCRIPT_ELEMENT_SIZE}) exceeded")]
    PushSize,
    #[error("operation limit ({MAX_OPS_PER_SCRIPT}) exceeded")]
    OpCount,
    // Stack and altstack combined depth is over the limit.
    #[error("stack size limit ({MAX_STACK_SIZE}) exceeded")]
    StackSize,
    #[error("signature count negative or greater than pubkey count")]
    SigCount,
    #[error("pubkey count negative or limit exceeded")]
    PubkeyCount,

    // Failed verify operations.
    #[error("script failed an OP_VERIFY operation")]
    Verify,
    #[error("script failed an OP_EQUALVERIFY operation")]
    EqualVerify,
    #[error("script failed an OP_NUMEQUALVERIFY operation")]
    NumEqualVerify,
    #[error("script failed an OP_CHECKSIGVERIFY operation")]
    CheckSigVerify,
    #[error("script failed an OP_CHECKMULTISIGVERIFY operation")]
    CheckMultiSigVerify,

    // Logical/Format/Canonical errors.
    #[error("opcode missing or not understood")]
    BadOpcode,
    #[error("attempted to use disabled opcode {}", crate::opcode::name(*.0))]
    DisabledOpcode(u8),
    #[error("operation not valid with the current stack size")]
    InvalidStackOperation,
    #[error("operation not valid with the current altstack size")]
    InvalidAltStackOperation,
    // OP_ELSE or OP_ENDIF without a matching OP_IF/OP_NOTIF, or an open conditional at
    // the end of the script.
    #[error("invalid OP_IF construction")]
    UnbalancedConditional,

    // CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY
    #[error("negative locktime")]
    NegativeLocktime,
    #[error("locktime requirement not satisfied")]
    UnsatisfiedLocktime,

    // Malleability
    #[error("signature hash type missing or not understood")]
    SigHashType,
    #[error("non-canonical DER signature: {0}")]
    SigDer(SignatureEncodingError),
    #[error("data push larger than necessary")]
    MinimalData,
    #[error("only push operators allowed in signatures")]
    SigPushOnly,
    #[error("non-canonical signature: S value is unnecessarily high")]
    SigHighS,
    #[error("dummy CHECKMULTISIG argument must be zero")]
    SigNullDummy,
    #[error("public key is neither compressed or uncompressed")]
    PubkeyType,
    #[error("stack size must be exactly one after execution")]
    CleanStack,
    #[error("OP_IF/NOTIF argument must be minimal")]
    MinimalIf,
    #[error("signature must be zero for failed CHECK(MULTI)SIG operation")]
    NullFail,

    // Softfork safeness.
    #[error("NOPx reserved for soft-fork upgrades")]
    DiscourageUpgradableNops,
    #[error("witness version reserved for soft-fork upgrades")]
    DiscourageUpgradableWitnessProgram,
    #[error("taproot version reserved for soft-fork upgrades")]
    DiscourageUpgradableTaprootVersion,
    #[error("OP_SUCCESSx reserved for soft-fork upgrades")]
    DiscourageOpSuccess,
    #[error("public key version reserved for soft-fork upgrades")]
    DiscourageUpgradablePubkeyType,

    // Segregated witness.
    #[error("witness program has incorrect length")]
    WitnessProgramWrongLength,
    #[error("witness program was passed an empty witness")]
    WitnessProgramWitnessEmpty,
    #[error("witness program hash mismatch")]
    WitnessProgramMismatch,
    #[error("witness requires empty scriptSig")]
    WitnessMalleated,
    #[error("witness requires only-redeemscript scriptSig")]
    WitnessMalleatedP2SH,
    #[error("witness provided for non-witness script")]
    WitnessUnexpected,
    #[error("using non-compressed keys in segwit")]
    WitnessPubkeyType,

    // Taproot
    #[error("invalid schnorr signature size")]
    SchnorrSigSize,
    #[error("invalid schnorr signature hash type")]
    SchnorrSigHashType,
    #[error("invalid schnorr signature")]
    SchnorrSig,
    #[error("invalid taproot control block size")]
    TaprootWrongControlSize,
    #[error("too much signature validation relative to witness weight")]
    TapscriptValidationWeight,
    #[error("OP_CHECKMULTISIG(VERIFY) is not available in tapscript")]
    TapscriptCheckMultiSig,
    #[error("OP_IF/NOTIF argument must be minimal in tapscript")]
    TapscriptMinimalIf,

    // Constant scriptCode
    #[error("using OP_CODESEPARATOR in non-witness script")]
    OpCodeSeparator,
    #[error("signature is found in scriptCode")]
    SigFindAndDelete,

    // Elements
    #[error("invalid SHA256 context item")]
    Sha2ContextLoad,
    #[error("SHA256 context would exceed the maximum message length")]
    Sha2ContextWrite,
    #[error("introspection requires transaction data that is not available")]
    IntrospectContextUnavailable,
    #[error("introspection index out of bounds")]
    IntrospectIndexOutOfBounds,
    #[error("expected an 8-byte operand")]
    Expected8Bytes,
    #[error("64-bit arithmetic conversion failed")]
    Arithmetic64,
    #[error("EC scalar multiplication or tweak verification failed")]
    EcMultVerify,

    // Simplicity
    #[error("simplicity leaf requires exactly a program, a witness and a 32-byte commitment")]
    SimplicityWrongLength,
    #[error("simplicity: {0}")]
    Simplicity(#[from] SimplicityError),

    #[error(transparent)]
    Num(#[from] NumError),
}

impl From<StackError> for Error {
    fn from(err: StackError) -> Self {
        match err {
            StackError::InvalidOperation => Self::InvalidStackOperation,
            StackError::Num(err) => Self::Num(err),
        }
    }
}

impl From<SignatureEncodingError> for Error {
    fn from(err: SignatureEncodingError) -> Self {
        Self::SigDer(err)
    }
}
