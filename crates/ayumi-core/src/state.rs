//! In-memory flow state and its owning store.

use crate::catalog::FlowCatalog;
use crate::error::FlowError;
use crate::field::{FieldName, FieldValue, Payload};
use crate::flow::{FlowDefinition, FlowKind};
use crate::step::{Signal, StepId};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Lifecycle status of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStatus {
    /// The user is working through the steps.
    Active,
    /// The terminal step was passed and the payload handed off.
    Completed,
    /// The flow was dismissed and its payload discarded.
    Abandoned,
}

impl FlowStatus {
    /// Returns `true` for `Completed` and `Abandoned`.
    pub fn is_terminated(&self) -> bool {
        !matches!(self, FlowStatus::Active)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStatus::Active => write!(f, "active"),
            FlowStatus::Completed => write!(f, "completed"),
            FlowStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// The data owned by one flow session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowState {
    /// Which flow this is.
    pub kind: FlowKind,
    /// The step the user is on.
    pub current_step: StepId,
    /// Fields collected so far.
    pub payload: Payload,
    /// External facts raised for branch routing.
    pub signals: BTreeSet<Signal>,
    /// Lifecycle status.
    pub status: FlowStatus,
}

/// Owner of a single [`FlowState`].
///
/// Each flow session constructs its own store; nothing is shared between
/// concurrently active flows. Every mutation either applies fully or leaves
/// the state untouched.
///
/// ```
/// use ayumi_core::{FlowKind, FlowStateStore, FlowStatus};
///
/// let mut store = FlowStateStore::init(FlowKind::Signup)?;
/// store.set_field("email", "a@b.com")?;
/// assert_eq!(store.snapshot().text("email"), Some("a@b.com"));
///
/// store.reset();
/// assert_eq!(store.state().status, FlowStatus::Abandoned);
/// assert!(store.snapshot().is_empty());
/// # Ok::<(), ayumi_core::FlowError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FlowStateStore {
    definition: Arc<FlowDefinition>,
    state: FlowState,
}

impl FlowStateStore {
    /// Creates a store for the built-in `kind` flow with default configuration.
    pub fn init(kind: FlowKind) -> Result<Self, FlowError> {
        let definition = FlowCatalog::default().definition(kind)?;
        Ok(Self::new(Arc::new(definition)))
    }

    /// Creates a fresh store: empty payload, `Active`, on the entry step.
    pub fn new(definition: Arc<FlowDefinition>) -> Self {
        let state = FlowState {
            kind: definition.kind(),
            current_step: definition.entry().clone(),
            payload: Payload::new(),
            signals: BTreeSet::new(),
            status: FlowStatus::Active,
        };
        Self { definition, state }
    }

    /// Returns the flow definition.
    pub fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    /// Returns the current state.
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Upserts a field. Never removes fields.
    ///
    /// The value must match the kind the schema declares for the field;
    /// otherwise nothing is written.
    pub fn set_field(
        &mut self,
        name: impl Into<FieldName>,
        value: impl Into<FieldValue>,
    ) -> Result<(), FlowError> {
        self.ensure_active()?;
        let name = name.into();
        let value = value.into();
        let Some(spec) = self.definition.field(name.as_str()) else {
            return Err(FlowError::UnknownField {
                field: name,
                kind: self.state.kind,
            });
        };
        if !spec.kind.accepts(&value) {
            return Err(FlowError::FieldKindMismatch {
                field: name,
                expected: spec.kind,
            });
        }
        self.state.payload.insert(name, value);
        Ok(())
    }

    /// Records an external fact used by branch routes.
    ///
    /// When the signal reroutes the flow away from the current step, the
    /// cursor returns to the last step already passed that lies on the new
    /// route, so the cursor never sits on a step the flow no longer visits.
    pub fn raise_signal(&mut self, signal: Signal) -> Result<(), FlowError> {
        self.ensure_active()?;
        let before = self.definition.path(&self.state.signals);
        self.state.signals.insert(signal);
        let after = self.definition.path(&self.state.signals);

        let current = &self.state.current_step;
        if !after.contains(current) {
            let walked = before
                .iter()
                .position(|id| id == current)
                .map_or(0, |i| i + 1);
            // The entry is on every route.
            let rejoin = before[..walked]
                .iter()
                .rev()
                .find(|id| after.contains(*id))
                .cloned()
                .unwrap_or_else(|| self.definition.entry().clone());
            self.state.current_step = rejoin;
        }
        Ok(())
    }

    /// Moves the step cursor. The payload is left untouched.
    pub fn move_to(&mut self, step: impl Into<StepId>) -> Result<(), FlowError> {
        self.ensure_active()?;
        let step = step.into();
        if self.definition.step(step.as_str()).is_none() {
            return Err(FlowError::StepNotFound(step));
        }
        self.state.current_step = step;
        Ok(())
    }

    /// Returns a copy of the collected payload.
    pub fn snapshot(&self) -> Payload {
        self.state.payload.clone()
    }

    /// Discards the payload and marks the flow `Abandoned`.
    ///
    /// Safe to call any number of times, in any status. A completed flow
    /// stays `Completed`.
    pub fn reset(&mut self) {
        self.state.payload.clear();
        self.state.signals.clear();
        if self.state.status == FlowStatus::Active {
            self.state.status = FlowStatus::Abandoned;
        }
    }

    /// Marks the flow `Completed` and hands the payload out.
    ///
    /// Fails with [`FlowError::IncompleteFlow`] unless the current step leads
    /// to the terminal marker.
    pub fn finalize(&mut self) -> Result<Payload, FlowError> {
        self.ensure_active()?;
        if !self
            .definition
            .is_terminal_step(self.state.current_step.as_str(), &self.state.signals)
        {
            return Err(FlowError::IncompleteFlow {
                current: self.state.current_step.clone(),
            });
        }
        self.state.status = FlowStatus::Completed;
        self.state.signals.clear();
        Ok(std::mem::take(&mut self.state.payload))
    }

    fn ensure_active(&self) -> Result<(), FlowError> {
        if self.state.status.is_terminated() {
            return Err(FlowError::FlowTerminated {
                status: self.state.status,
            });
        }
        Ok(())
    }
}
