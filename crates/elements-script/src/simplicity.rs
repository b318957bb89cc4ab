//! Boundary to the Simplicity evaluator.
//!
//! Taproot leaves with version 0xbe carry a Simplicity program instead of a script. The
//! program is executed by an external engine behind [`SimplicityOracle`]; this crate only
//! builds the request and maps the outcome.

use crate::sighash::PrecomputedTransactionData;
use crate::transaction::Transaction;
use bitcoin::BlockHash;

/// Failures reported by the Simplicity evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SimplicityError {
    #[error("program data out of range")]
    DataOutOfRange,
    #[error("program data out of order")]
    DataOutOfOrder,
    #[error("program contains a fail combinator")]
    FailCode,
    #[error("program contains a reserved code")]
    ReservedCode,
    #[error("program contains a hidden node in an illegal position")]
    Hidden,
    #[error("program ended early")]
    BitstreamEof,
    #[error("program has trailing bytes")]
    BitstreamTrailingBytes,
    #[error("program has illegal padding")]
    BitstreamIllegalPadding,
    #[error("type inference failed to unify")]
    TypeInferenceUnification,
    #[error("type inference occurs check failed")]
    TypeInferenceOccursCheck,
    #[error("expression is not a program")]
    TypeInferenceNotProgram,
    #[error("witness ended early")]
    WitnessEof,
    #[error("witness has trailing bytes")]
    WitnessTrailingBytes,
    #[error("witness has illegal padding")]
    WitnessIllegalPadding,
    #[error("program has unshared subexpressions")]
    UnsharedSubexpression,
    #[error("commitment merkle root does not match the leaf")]
    Cmr,
    #[error("execution exceeded the budget")]
    ExecBudget,
    #[error("execution exceeded the memory limit")]
    ExecMemory,
    #[error("a jet failed")]
    ExecJet,
    #[error("an assertion failed")]
    ExecAssert,
    #[error("program uses anti-DoS features")]
    Antidos,
    #[error("hidden node at the root")]
    HiddenRoot,
    #[error("annotated merkle root mismatch")]
    Amr,
    #[error("program weight exceeds the budget")]
    Overweight,
}

/// Everything the evaluator needs to run one Simplicity leaf.
#[derive(Debug, Clone, Copy)]
pub struct SimplicityRequest<'a> {
    pub program: &'a [u8],
    pub witness: &'a [u8],
    /// Full control block of the spend.
    pub control_block: &'a [u8],
    /// Number of Merkle path nodes in the control block.
    pub path_len: usize,
    /// The leaf "script", the commitment Merkle root of the program.
    pub script_cmr: &'a [u8; 32],
    /// Serialized witness size plus the fixed validation weight offset.
    pub budget: i64,
}

/// External Simplicity evaluator.
///
/// Implementations must be deterministic, the outcome is consensus critical.
pub trait SimplicityOracle: Send + Sync {
    fn execute(
        &self,
        tx: &Transaction,
        input_index: usize,
        txdata: &PrecomputedTransactionData,
        genesis_hash: &BlockHash,
        request: &SimplicityRequest<'_>,
    ) -> Result<(), SimplicityError>;
}

impl<F> SimplicityOracle for F
where
    F: Fn(&SimplicityRequest<'_>) -> Result<(), SimplicityError> + Send + Sync,
{
    fn execute(
        &self,
        _tx: &Transaction,
        _input_index: usize,
        _txdata: &PrecomputedTransactionData,
        _genesis_hash: &BlockHash,
        request: &SimplicityRequest<'_>,
    ) -> Result<(), SimplicityError> {
        self(request)
    }
}
