//! The failures raised while compiling against or executing an instruction
//! tree.

use std::path::PathBuf;

use num_bigint::BigInt;
use thiserror::Error;

use crate::library::MethodSignature;
use crate::variables::Scope;

/// Boxed cause attached to failures coming from outside the engine (chain
/// client, file system).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stores the result of executing an instruction. Returns an
/// [`ExecutionError`] upon failure.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// An error raised by the engine.
///
/// Every variant is routed through the
/// [`ExceptionHandler`](crate::exception::ExceptionHandler) by the nearest
/// enclosing filter; the kind of error never influences whether execution
/// continues.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A variable was read from the value store before being written.
    #[error("variable '{0}' is not defined")]
    UndefinedVariable(String),

    /// No registered method accepts the call's parameter types.
    #[error("no method matches the call {0}")]
    NoSuchMethod(MethodSignature),

    /// More than one registered method accepts the call's parameter types.
    #[error("call {signature} is ambiguous between {}", join_signatures(.candidates))]
    AmbiguousMethod {
        signature: MethodSignature,
        candidates: Vec<MethodSignature>,
    },

    /// The method library would become inconsistent, e.g. two methods with
    /// equal signatures.
    #[error("invalid library state: {0}")]
    InvalidLibraryState(String),

    /// Arity or type mismatch at a built-in method call site, or an operand
    /// of the wrong type handed to a filter.
    #[error("invalid parameters for '{method}': {reason}")]
    InvalidParameters { method: String, reason: String },

    /// The chain client failed to answer a query.
    #[error("query failed: {context}")]
    Query {
        context: String,
        #[source]
        source: BoxError,
    },

    /// A log entry does not fit the signature it matched.
    #[error("could not decode log entry '{event}': {reason}")]
    Decode { event: String, reason: String },

    /// The engine was configured with unusable settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A reorganization reached past every block still remembered by the
    /// block-range walker.
    #[error("chain discontinuity at block {number}: reorganization deeper than the {depth} known blocks")]
    ChainDiscontinuity { number: BigInt, depth: usize },

    /// A chain variable was read while its cursor was not set.
    #[error("'{variable}' was used outside of a {scope} scope")]
    UnsetCursor { variable: String, scope: Scope },

    /// An exporter could not write its artifact.
    #[error("could not write '{}'", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The data reader was used after being closed.
    #[error("the data reader is closed")]
    ReaderClosed,

    /// The exception handler decided to stop the run; wraps the failure that
    /// triggered the decision.
    #[error("execution aborted: {0}")]
    Aborted(Box<ExecutionError>),
}

impl ExecutionError {
    pub(crate) fn invalid_parameters(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn query(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Query {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn decode(event: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            event: event.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the exception handler already decided to stop.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

fn join_signatures(signatures: &[MethodSignature]) -> String {
    signatures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
