//! Typed failure taxonomy for recipe execution.
//!
//! Every failure surfaced by [`crate::interp::execute`] is one of four kinds:
//! program validation, input decoding, operation preconditions, or expression
//! parse/evaluation. The first failure halts execution and is returned
//! verbatim, tagged with the offending step index and operation name. Hosts
//! decide whether to retry, persist, or display.

use thiserror::Error;

/// The input payload could not be decoded into a dataframe.
#[derive(Debug, Clone, Error)]
#[error("input decode failed: {reason}")]
pub struct InputError {
    pub reason: String,
}

impl InputError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An operation's preconditions failed.
#[derive(Debug, Clone, Error)]
pub enum OpError {
    #[error("missing columns {names:?}; available columns: {available:?}")]
    MissingColumns {
        names: Vec<String>,
        available: Vec<String>,
    },
    #[error("{0}")]
    BadArgument(String),
    #[error("{0}")]
    Overflow(String),
    #[error("{0}")]
    OutOfRange(String),
    #[error("{0}")]
    TypeMismatch(String),
}

/// An expression failed to parse or evaluate.
#[derive(Debug, Clone, Error)]
pub enum ExprError {
    #[error("invalid expression syntax: {0}")]
    Syntax(String),
    #[error("expression construct not allowed: {0}")]
    Disallowed(String),
    #[error("unknown name '{0}' in expression")]
    UnknownName(String),
    #[error("function '{0}' is not allowed in expressions")]
    FunctionNotAllowed(String),
    #[error("function call failed: {name}: {message}")]
    CallFailed { name: String, message: String },
    #[error("arithmetic on null; use safe_int, safe_float, or coalesce_val")]
    NullArith,
    #[error("arithmetic failed: {0}")]
    Arithmetic(String),
}

impl ExprError {
    pub(crate) fn call_failed(name: &str, message: impl Into<String>) -> Self {
        Self::CallFailed {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Failure raised while applying a single step, before it is tagged with its
/// position in the program.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error(transparent)]
    Op(#[from] OpError),
    #[error("{source} (in expression `{expr}`)")]
    Expr { expr: String, source: ExprError },
}

impl StepError {
    pub fn expr(expr: impl Into<String>, source: ExprError) -> Self {
        Self::Expr {
            expr: expr.into(),
            source,
        }
    }

    pub(crate) fn at(self, step_index: usize, op: &'static str) -> ExecutionFailure {
        match self {
            StepError::Op(source) => ExecutionFailure::Op {
                step_index,
                op,
                source,
            },
            StepError::Expr { expr, source } => ExecutionFailure::Expr {
                step_index,
                op,
                expr,
                source,
            },
        }
    }
}

/// The typed result boundary of [`crate::interp::execute`].
#[derive(Debug, Clone, Error)]
pub enum ExecutionFailure {
    #[error("invalid program: {message}")]
    Validation {
        step_index: Option<usize>,
        message: String,
    },
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("step {step_index} ({op}): {source}")]
    Op {
        step_index: usize,
        op: &'static str,
        #[source]
        source: OpError,
    },
    #[error("step {step_index} ({op}): {source} (in expression `{expr}`)")]
    Expr {
        step_index: usize,
        op: &'static str,
        expr: String,
        #[source]
        source: ExprError,
    },
}

impl ExecutionFailure {
    pub fn validation(step_index: Option<usize>, message: impl Into<String>) -> Self {
        Self::Validation {
            step_index,
            message: message.into(),
        }
    }

    /// Stable kind discriminant used by failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::Input(_) => "InputError",
            Self::Op { .. } => "OpError",
            Self::Expr { .. } => "ExprError",
        }
    }

    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::Validation { step_index, .. } => *step_index,
            Self::Input(_) => None,
            Self::Op { step_index, .. } | Self::Expr { step_index, .. } => Some(*step_index),
        }
    }

    pub fn op_name(&self) -> Option<&'static str> {
        match self {
            Self::Op { op, .. } | Self::Expr { op, .. } => Some(op),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_tagging_preserves_kind() {
        let failure = StepError::from(OpError::BadArgument("n must be >= 1".into())).at(3, "head");
        assert_eq!(failure.kind(), "OpError");
        assert_eq!(failure.step_index(), Some(3));
        assert_eq!(failure.op_name(), Some("head"));
    }

    #[test]
    fn expr_failures_carry_source_text() {
        let failure = StepError::expr("age +", ExprError::Syntax("unexpected end".into())).at(0, "filter_expr");
        let rendered = failure.to_string();
        assert!(rendered.contains("age +"), "missing source text: {rendered}");
        assert!(rendered.contains("filter_expr"));
    }

    #[test]
    fn missing_columns_names_both_sides() {
        let err = OpError::MissingColumns {
            names: vec!["no_such".into()],
            available: vec!["line".into()],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("no_such"));
        assert!(rendered.contains("line"));
    }
}
