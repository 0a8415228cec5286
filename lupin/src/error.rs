/// Precondition violations reported by the activity pipeline.
///
/// Library functions return `anyhow::Result`; the concrete
/// condition can be recovered with `err.downcast_ref::<LupinError>()`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LupinError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("identifier conflict: {0}")]
    IdentifierConflict(String),

    #[error("degenerate signature `{signature}`: column `{column}` has zero variance")]
    DegenerateSignature { signature: String, column: String },

    #[error("design shape violation: {0}")]
    DesignShapeViolation(String),

    #[error("incompatible precomputed model for signature `{signature}`: {reason}")]
    IncompatiblePrecomputedModel { signature: String, reason: String },

    #[error("insufficient input: {0}")]
    InsufficientInput(String),

    #[error("regression failed for signature `{signature}`, sample `{sample}`: {message}")]
    PairFitFailed {
        signature: String,
        sample: String,
        message: String,
    },
}

impl LupinError {
    pub fn type_mismatch(msg: impl Into<String>) -> anyhow::Error {
        LupinError::TypeMismatch(msg.into()).into()
    }

    pub fn identifier_conflict(msg: impl Into<String>) -> anyhow::Error {
        LupinError::IdentifierConflict(msg.into()).into()
    }

    pub fn design_shape(msg: impl Into<String>) -> anyhow::Error {
        LupinError::DesignShapeViolation(msg.into()).into()
    }

    pub fn incompatible_model(signature: &str, reason: impl Into<String>) -> anyhow::Error {
        LupinError::IncompatiblePrecomputedModel {
            signature: signature.to_string(),
            reason: reason.into(),
        }
        .into()
    }
}

/// Find the pipeline error kind behind an `anyhow::Error`
pub fn error_kind(err: &anyhow::Error) -> Option<&LupinError> {
    err.downcast_ref::<LupinError>()
}
