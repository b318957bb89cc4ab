//! Script evaluation and spend verification.

mod eval;
mod verify;

pub use self::eval::{
    SignatureEncodingError, check_pubkey_encoding, check_signature_encoding, eval_script,
};
pub use self::verify::{count_witness_sigops, verify_script};
