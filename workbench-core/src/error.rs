//! Structured error types for the workbench.
//!
//! Every fallible operation returns exactly one of these kinds; the caller
//! renders the message and decides whether to retry.

use thiserror::Error;

/// Result type alias for workbench operations.
pub type WorkbenchResult<T> = Result<T, WorkbenchError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkbenchError {
    /// A seed or required input was blank after trimming
    #[error("{label} cannot be empty")]
    EmptyValue { label: String },

    /// Text that is neither base58 nor `0x`-prefixed hex for a 32-byte key
    #[error("Invalid address for {label}: '{value}'")]
    InvalidAddress { label: String, value: String },

    /// Not an integer, or outside the range of the declared width
    #[error("Invalid number for {label}: '{value}' ({reason})")]
    InvalidNumber {
        label: String,
        value: String,
        reason: String,
    },

    /// A single seed exceeds the 32-byte limit
    #[error("Seed {index} is {len} bytes; a seed may be at most {max} bytes")]
    SeedTooLong { index: usize, len: usize, max: usize },

    /// More seeds than fit alongside the bump seed
    #[error("{count} seeds given; at most {max} are allowed before the bump")]
    TooManySeeds { count: usize, max: usize },

    /// Every bump from 255 down to 0 produced an on-curve address
    #[error("Unable to find a viable program address bump for program {program_id}")]
    DerivationExhausted { program_id: String },

    /// Enum argument is not a single-key `{ variant: {} }` object naming a
    /// declared variant
    #[error("Invalid enum value for {arg}. Expected format: {{ variantName: {{}} }}")]
    InvalidEnumValue { arg: String },

    /// A supplied account value does not parse as an address
    #[error("Invalid public key for account \"{name}\": {value}")]
    InvalidAccountAddress { name: String, value: String },

    /// Required account left blank and not derivable from the IDL
    #[error("Account \"{name}\" is required but was not provided")]
    MissingAccount { name: String },

    /// A PDA seed points at an account or argument with no value yet
    #[error("PDA seed for account \"{account}\" references '{reference}' which hasn't been resolved")]
    UnresolvedSeed { account: String, reference: String },

    /// No instruction with this name in the loaded IDL
    #[error("Instruction '{name}' not found in IDL")]
    UnknownInstruction { name: String },

    /// The processed value does not fit the declared wire type
    #[error("Cannot encode {label} as {expected}: {found}")]
    TypeMismatch {
        label: String,
        expected: String,
        found: String,
    },

    /// Signing was declined or the network rejected the transaction
    #[error("Transaction submission failed: {message}")]
    Submission { message: String },

    /// Landed on chain, but program execution returned an error
    #[error("Transaction failed: {error}")]
    ExecutionFailed { signature: String, error: String },

    /// Blockhash validity window elapsed without confirmation
    #[error("Transaction {signature} expired: block height exceeded {last_valid_block_height}")]
    Expired {
        signature: String,
        last_valid_block_height: u64,
    },

    /// Sent, but the node stayed unreachable while polling, so the outcome
    /// is unknown
    #[error("Transaction {signature} was sent but its status could not be determined: {message}")]
    ConfirmationUnknown { signature: String, message: String },

    /// Transport or node error outside the confirmation loop
    #[error("RPC request failed: {message}")]
    Rpc { message: String },

    /// No suite with this id in the store
    #[error("Test suite '{id}' not found")]
    SuiteNotFound { id: String },

    /// No case with this id in the given suite
    #[error("Test case '{id}' not found in suite '{suite_id}'")]
    TestCaseNotFound { suite_id: String, id: String },

    /// IDL document is not valid JSON or does not match either layout
    #[error("Failed to parse IDL: {message}")]
    Idl { message: String },

    /// Reading, parsing or writing the suite store file failed
    #[error("Storage error at {path}: {message}")]
    Storage { path: String, message: String },

    /// Bad config file, flag or environment value
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl WorkbenchError {
    pub fn invalid_number(
        label: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        WorkbenchError::InvalidNumber {
            label: label.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    pub fn type_mismatch(
        label: impl Into<String>,
        expected: impl Into<String>,
        found: impl ToString,
    ) -> Self {
        WorkbenchError::TypeMismatch {
            label: label.into(),
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    pub fn rpc(err: impl ToString) -> Self {
        WorkbenchError::Rpc {
            message: err.to_string(),
        }
    }

    /// True for the submission/confirmation layer (rejected, failed on
    /// chain, or expired). These need a freshly assembled transaction.
    pub fn is_submission_failure(&self) -> bool {
        matches!(
            self,
            WorkbenchError::Submission { .. }
                | WorkbenchError::ExecutionFailed { .. }
                | WorkbenchError::Expired { .. }
                | WorkbenchError::ConfirmationUnknown { .. }
        )
    }

    /// Signature of a transaction that was sent, when the error carries one.
    pub fn signature(&self) -> Option<&str> {
        match self {
            WorkbenchError::ExecutionFailed { signature, .. }
            | WorkbenchError::Expired { signature, .. }
            | WorkbenchError::ConfirmationUnknown { signature, .. } => Some(signature),
            _ => None,
        }
    }
}
