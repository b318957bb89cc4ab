pub use bitcoin::constants::MAX_SCRIPT_ELEMENT_SIZE;
use num_traits::Num;
use std::sync::LazyLock;

// pub constant for compressed public key size
pub const COMPRESSED_PUBKEY_SIZE: usize = 33;

pub const WITNESS_V0_SCRIPTHASH_SIZE: usize = 32;
pub const WITNESS_V0_KEYHASH_SIZE: usize = 20;
pub const WITNESS_V1_TAPROOT_SIZE: usize = 32;

/// Maximum script length in bytes, enforced for legacy and witness v0 scripts.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// The maximum combined height of stack and alt stack during script execution.
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of public keys per multisig.
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;

/// Maximum number of non-push operations per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;

pub const SIGHASH_DEFAULT: u8 = 0x00;
pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
/// Commit to the output rangeproofs and surjection proofs (confidential transactions).
pub const SIGHASH_RANGEPROOF: u8 = 0x40;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;
pub const SIGHASH_OUTPUT_MASK: u8 = 0x03;
pub const SIGHASH_INPUT_MASK: u8 = 0x80;

/// Threshold for nLockTime: below this value it is interpreted as block number,
/// otherwise as UNIX timestamp.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

/// Setting nSequence to this value for every input in a transaction disables nLockTime.
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Below flags apply in the context of BIP 68
/// If this flag set, CTxIn::nSequence is NOT interpreted as a relative lock-time.
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1u32 << 31;

/// If CTxIn::nSequence encodes a relative lock-time and this flag is set, the relative
/// lock-time has units of 512 seconds, otherwise it specifies blocks with a granularity of 1.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// If CTxIn::nSequence encodes a relative lock-time, this mask is applied to extract that
/// lock-time from the sequence field.
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000ffff;

/// Outpoint index flags used by the Elements transaction serialization.
pub const OUTPOINT_ISSUANCE_FLAG: u32 = 1 << 31;
pub const OUTPOINT_PEGIN_FLAG: u32 = 1 << 30;
pub const OUTPOINT_INDEX_MASK: u32 = 0x3fffffff;

/// Validation weight per passsing signature (Tapscript only, see BIP 342).
pub const VALIDATION_WEIGHT_PER_SIGOP_PASSED: i64 = 50;

/// How much weight budget is added to the witness size (Tapscript only, see BIP 342).
pub const VALIDATION_WEIGHT_OFFSET: i64 = 50;

pub const ANNEX_TAG: u8 = 0x50;

pub const TAPROOT_LEAF_MASK: u8 = 0xfe;
pub const TAPROOT_LEAF_TAPSCRIPT: u8 = 0xc4;
pub const TAPROOT_LEAF_TAPSIMPLICITY: u8 = 0xbe;

pub const TAPROOT_CONTROL_BASE_SIZE: usize = 33;
pub const TAPROOT_CONTROL_NODE_SIZE: usize = 32;
pub const TAPROOT_CONTROL_MAX_NODE_COUNT: usize = 128;
pub const TAPROOT_CONTROL_MAX_SIZE: usize =
    TAPROOT_CONTROL_BASE_SIZE + TAPROOT_CONTROL_NODE_SIZE * TAPROOT_CONTROL_MAX_NODE_COUNT;

/// Largest input index representable by `OP_PUSHCURRENTINPUTINDEX`.
pub const MAX_SERIALIZED_SIZE: u32 = 0x02000000;

/// Order of the secp256k1 group.
pub static CURVE_ORDER: LazyLock<num_bigint::BigInt> = LazyLock::new(|| {
    const N: &str = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";
    num_bigint::BigInt::from_str_radix(N, 16).expect("Static value must be valid")
});

/// Curve order divided by two, the upper bound of a canonical S value.
pub static HALF_ORDER: LazyLock<num_bigint::BigInt> = LazyLock::new(|| {
    const HALF_N: &str = "7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0";
    num_bigint::BigInt::from_str_radix(HALF_N, 16).expect("Static value must be valid")
});
