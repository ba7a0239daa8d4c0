//! Step definitions and routing.

use crate::field::{FieldName, FieldValue, Payload};
use crate::validator::ValidationRule;
use std::collections::BTreeSet;
use std::fmt;

/// Type-safe step identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepId(String);

impl StepId {
    /// Creates a new StepId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the step id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A named external fact that branch routes can test.
///
/// Signals are raised by collaborators (for example the bank-linking
/// provider reporting an existing link), never by the user's field input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signal(&'static str);

impl Signal {
    /// The user already has a linked bank account.
    pub const BANK_LINKED: Signal = Signal::new("bank_linked");

    /// Creates a new Signal.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the signal name.
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a step leads once its gate is satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Continue to the given step.
    Step(StepId),
    /// The flow is complete.
    Terminal,
    /// Pick a route depending on whether a signal is raised.
    Branch {
        /// The signal to test.
        signal: Signal,
        /// Route taken when the signal is raised.
        when_set: Box<Route>,
        /// Route taken otherwise.
        otherwise: Box<Route>,
    },
}

/// A resolved [`Route`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The next step.
    Step(StepId),
    /// The terminal marker.
    Terminal,
}

impl Route {
    /// Creates a route to the given step.
    pub fn to(step: impl Into<StepId>) -> Self {
        Route::Step(step.into())
    }

    /// Creates a branch on `signal`.
    pub fn branch(signal: Signal, when_set: Route, otherwise: Route) -> Self {
        Route::Branch {
            signal,
            when_set: Box::new(when_set),
            otherwise: Box::new(otherwise),
        }
    }

    /// Resolves the route against the raised signals.
    ///
    /// ```
    /// use ayumi_core::{Route, Signal, StepId, Target};
    /// use std::collections::BTreeSet;
    ///
    /// let route = Route::branch(Signal::BANK_LINKED, Route::Terminal, Route::to("LinkBank"));
    ///
    /// assert_eq!(route.resolve(&BTreeSet::new()), Target::Step(StepId::new("LinkBank")));
    /// assert_eq!(route.resolve(&BTreeSet::from([Signal::BANK_LINKED])), Target::Terminal);
    /// ```
    pub fn resolve(&self, signals: &BTreeSet<Signal>) -> Target {
        match self {
            Route::Step(id) => Target::Step(id.clone()),
            Route::Terminal => Target::Terminal,
            Route::Branch {
                signal,
                when_set,
                otherwise,
            } => {
                if signals.contains(signal) {
                    when_set.resolve(signals)
                } else {
                    otherwise.resolve(signals)
                }
            }
        }
    }

    /// Every target this route can reach, over all branch arms.
    pub fn targets(&self) -> Vec<Target> {
        match self {
            Route::Step(id) => vec![Target::Step(id.clone())],
            Route::Terminal => vec![Target::Terminal],
            Route::Branch {
                when_set,
                otherwise,
                ..
            } => {
                let mut targets = when_set.targets();
                targets.extend(otherwise.targets());
                targets
            }
        }
    }
}

/// Extra advancement predicate over the accumulated payload.
pub type Gate = fn(&Payload) -> bool;

/// The kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Typed text, checked against the rule when one is given.
    Text(Option<ValidationRule>),
    /// A checkbox or toggle; passes when `true`.
    Flag,
}

impl FieldKind {
    /// Returns `true` if `value` has this kind.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (FieldKind::Text(_), FieldValue::Text(_)) | (FieldKind::Flag, FieldValue::Flag(_))
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text(_) => write!(f, "text"),
            FieldKind::Flag => write!(f, "flag"),
        }
    }
}

/// Schema entry for a field collected by a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: FieldName,
    /// Value kind, and for text the rule applied on commit and when checking gates.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// A text field validated with `rule`.
    pub fn validated(name: impl Into<FieldName>, rule: ValidationRule) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text(Some(rule)),
        }
    }

    /// A text field accepted as typed.
    pub fn plain(name: impl Into<FieldName>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text(None),
        }
    }

    /// A boolean field.
    pub fn flag(name: impl Into<FieldName>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Flag,
        }
    }

    /// Returns the validation rule of a text field.
    pub fn rule(&self) -> Option<ValidationRule> {
        match self.kind {
            FieldKind::Text(rule) => rule,
            FieldKind::Flag => None,
        }
    }
}

/// One stage of a flow.
#[derive(Clone)]
pub struct StepDefinition {
    /// Step identifier, unique within the flow.
    pub id: StepId,
    /// Fields that must be present and pass their rule before leaving the step.
    pub required_fields: Vec<FieldName>,
    /// Optional predicate checked after the required fields.
    pub gate: Option<Gate>,
    /// Where the step leads.
    pub next: Route,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("required_fields", &self.required_fields)
            .field("gate", &self.gate.is_some())
            .field("next", &self.next)
            .finish()
    }
}

impl StepDefinition {
    /// Creates a step with no requirements that leads to `next`.
    pub fn new(id: impl Into<StepId>, next: Route) -> Self {
        Self {
            id: id.into(),
            required_fields: Vec::new(),
            gate: None,
            next,
        }
    }

    /// Adds required fields.
    pub fn requires<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldName>,
    {
        self.required_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Sets the extra gate predicate.
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }
}
