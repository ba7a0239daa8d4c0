//! Flow error types.

use crate::field::FieldName;
use crate::flow::FlowKind;
use crate::state::FlowStatus;
use crate::step::{FieldKind, StepId};
use thiserror::Error;

/// Errors that can occur while driving a flow.
///
/// Validation outcomes are never reported through this type; they are
/// returned as [`ValidationResult`](crate::ValidationResult) data. Only
/// [`FlowError::GateNotSatisfied`] is an expected, user-driven condition.
/// The remaining variants point at a caller bug; see [`FlowError::is_defect`].
///
/// ```
/// use ayumi_core::{FlowError, StepId};
///
/// let error = FlowError::GateNotSatisfied {
///     step: StepId::new("PasswordSet"),
///     missing: vec![],
///     failing: vec!["password".into()],
/// };
/// assert!(!error.is_defect());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FlowError {
    /// The field is not part of the flow's schema.
    #[error("Unknown field '{field}' for {kind} flow")]
    UnknownField {
        /// The rejected field name.
        field: FieldName,
        /// The flow that rejected it.
        kind: FlowKind,
    },

    /// The value does not have the kind the schema declares for the field.
    #[error("Field '{field}' expects a {expected} value")]
    FieldKindMismatch {
        /// The rejected field name.
        field: FieldName,
        /// The kind declared in the schema.
        expected: FieldKind,
    },

    /// The current step's requirements are not met yet.
    #[error("Gate not satisfied for step '{step}' (missing: {}, failing: {})", join(.missing), join(.failing))]
    GateNotSatisfied {
        /// The step that could not be left.
        step: StepId,
        /// Required fields with no value.
        missing: Vec<FieldName>,
        /// Fields with a value that does not pass its rule or the step gate.
        failing: Vec<FieldName>,
    },

    /// Finalization was requested before the terminal step was reached.
    #[error("Flow is incomplete: step '{current}' is not terminal")]
    IncompleteFlow {
        /// The step the flow is on.
        current: StepId,
    },

    /// The flow already completed or was abandoned.
    #[error("Flow already terminated ({status})")]
    FlowTerminated {
        /// The absorbing status the flow is in.
        status: FlowStatus,
    },

    /// A referenced step is not part of the flow definition.
    #[error("Step not found: {0}")]
    StepNotFound(StepId),

    /// Back navigation to a step that is not behind the current one.
    #[error("Cannot move from step '{from}' back to '{to}'")]
    InvalidTransition {
        /// The current step.
        from: StepId,
        /// The requested step.
        to: StepId,
    },

    /// The flow definition is invalid.
    #[error("Invalid flow definition: {0}")]
    Configuration(String),
}

impl FlowError {
    /// Returns `true` for errors caused by a programming mistake rather than
    /// by user input.
    ///
    /// Callers are expected to treat a defect as fatal for the flow instance
    /// and abandon it.
    pub fn is_defect(&self) -> bool {
        !matches!(self, FlowError::GateNotSatisfied { .. })
    }
}

fn join(fields: &[FieldName]) -> String {
    if fields.is_empty() {
        return "none".to_string();
    }
    fields
        .iter()
        .map(FieldName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
