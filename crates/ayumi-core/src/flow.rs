//! Flow definitions: the step table and field schema of one kind of flow.

use crate::error::FlowError;
use crate::field::{FieldName, FieldValue, Payload};
use crate::step::{FieldKind, FieldSpec, Signal, StepDefinition, StepId, Target};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// The kinds of guided flow the application offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Account creation.
    Signup,
    /// Forgotten password recovery.
    PasswordReset,
    /// Post-signup profile and bank linking.
    Onboarding,
}

impl FlowKind {
    /// All flow kinds, in menu order.
    pub const ALL: [FlowKind; 3] = [
        FlowKind::Signup,
        FlowKind::PasswordReset,
        FlowKind::Onboarding,
    ];
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::Signup => write!(f, "signup"),
            FlowKind::PasswordReset => write!(f, "password_reset"),
            FlowKind::Onboarding => write!(f, "onboarding"),
        }
    }
}

/// Outcome of checking a step's gate against a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateCheck {
    /// Required fields with no value.
    pub missing: Vec<FieldName>,
    /// Fields present but failing their rule, or the step gate itself.
    pub failing: Vec<FieldName>,
    /// Whether the step's custom gate predicate rejected the payload.
    pub gate_rejected: bool,
}

impl GateCheck {
    /// Returns `true` if the step may be left.
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty() && self.failing.is_empty() && !self.gate_rejected
    }
}

/// A validated flow: steps, entry point and field schema.
///
/// Construction through [`FlowDefinition::builder`] guarantees that step ids
/// are unique, every route target exists, every step is reachable from the
/// entry and the step graph has no cycles.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    kind: FlowKind,
    entry: StepId,
    steps: Vec<StepDefinition>,
    index: HashMap<StepId, usize>,
    fields: Vec<FieldSpec>,
}

impl FlowDefinition {
    /// Creates a new flow definition builder.
    pub fn builder(kind: FlowKind) -> FlowDefinitionBuilder {
        FlowDefinitionBuilder::new(kind)
    }

    /// Returns the flow kind.
    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    /// Returns the entry step id.
    pub fn entry(&self) -> &StepId {
        &self.entry
    }

    /// Returns the steps in declaration order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Returns the field schema.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a step by id.
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    /// Looks up a field's schema entry.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name.as_str() == name)
    }

    /// Returns `true` if the field belongs to this flow.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Returns `true` if `step` leads straight to the terminal marker
    /// under the given signals.
    pub fn is_terminal_step(&self, step: &str, signals: &BTreeSet<Signal>) -> bool {
        self.step(step)
            .map(|s| s.next.resolve(signals) == Target::Terminal)
            .unwrap_or(false)
    }

    /// Returns the step ids visited from the entry to the terminal marker
    /// under the given signals.
    pub fn path(&self, signals: &BTreeSet<Signal>) -> Vec<StepId> {
        let mut path = Vec::new();
        let mut current = Some(self.entry.clone());
        // Acyclicity is checked on build, so this walk terminates.
        while let Some(id) = current {
            current = match self.step(id.as_str()).map(|s| s.next.resolve(signals)) {
                Some(Target::Step(next)) => Some(next),
                _ => None,
            };
            path.push(id);
        }
        path
    }

    /// Checks a step's requirements against a payload.
    ///
    /// A required field is missing when it has no value, or when it is a
    /// rule-less text field left blank. A present value fails when its kind
    /// differs from the schema, when it does not satisfy the field's rule, or
    /// when it is a `false` flag. The step's custom gate runs last.
    pub fn check_gate(&self, step: &StepDefinition, payload: &Payload) -> GateCheck {
        let mut check = GateCheck::default();
        for name in &step.required_fields {
            let value = payload.get(name.as_str());
            let kind = self.field(name.as_str()).map(|f| f.kind);
            match (kind, value) {
                (_, None) => check.missing.push(name.clone()),
                (Some(FieldKind::Text(None)), Some(FieldValue::Text(text)))
                    if text.trim().is_empty() =>
                {
                    check.missing.push(name.clone())
                }
                (Some(FieldKind::Text(None)), Some(FieldValue::Text(_))) => {}
                (Some(FieldKind::Text(Some(rule))), Some(FieldValue::Text(text)))
                    if rule.evaluate(name.clone(), text).passed() => {}
                (Some(FieldKind::Flag), Some(FieldValue::Flag(true))) => {}
                _ => check.failing.push(name.clone()),
            }
        }
        if let Some(gate) = step.gate {
            check.gate_rejected = !gate(payload);
        }
        check
    }
}

/// Builder for constructing [`FlowDefinition`] instances.
#[derive(Debug)]
pub struct FlowDefinitionBuilder {
    kind: FlowKind,
    entry: Option<StepId>,
    steps: Vec<StepDefinition>,
    fields: Vec<FieldSpec>,
}

impl FlowDefinitionBuilder {
    /// Creates a new empty builder.
    pub fn new(kind: FlowKind) -> Self {
        Self {
            kind,
            entry: None,
            steps: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Adds a field to the schema.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Adds a step.
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the entry step. Defaults to the first added step.
    pub fn entry(mut self, id: impl Into<StepId>) -> Self {
        self.entry = Some(id.into());
        self
    }

    /// Builds and validates the flow definition.
    pub fn build(self) -> Result<FlowDefinition, FlowError> {
        let entry = match self.entry {
            Some(entry) => entry,
            None => self
                .steps
                .first()
                .map(|s| s.id.clone())
                .ok_or_else(|| FlowError::Configuration("Flow must have at least one step".to_string()))?,
        };

        let mut seen_fields = HashSet::new();
        for spec in &self.fields {
            if !seen_fields.insert(spec.name.as_str()) {
                return Err(FlowError::Configuration(format!(
                    "Field '{}' declared twice",
                    spec.name
                )));
            }
        }

        let mut index = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.id.clone(), i).is_some() {
                return Err(FlowError::Configuration(format!(
                    "Step '{}' declared twice",
                    step.id
                )));
            }
            if let Some(field) = step
                .required_fields
                .iter()
                .find(|f| !seen_fields.contains(f.as_str()))
            {
                return Err(FlowError::Configuration(format!(
                    "Step '{}' requires undeclared field '{}'",
                    step.id, field
                )));
            }
        }

        if !index.contains_key(&entry) {
            return Err(FlowError::StepNotFound(entry));
        }
        for step in &self.steps {
            for target in step.next.targets() {
                if let Target::Step(id) = target {
                    if !index.contains_key(&id) {
                        return Err(FlowError::StepNotFound(id));
                    }
                }
            }
        }

        check_acyclic(&self.steps, &index)?;

        let reachable = reachable_from(&entry, &self.steps, &index);
        if let Some(orphan) = self.steps.iter().find(|s| !reachable.contains(&s.id)) {
            return Err(FlowError::Configuration(format!(
                "Step '{}' is unreachable from '{}'",
                orphan.id, entry
            )));
        }

        Ok(FlowDefinition {
            kind: self.kind,
            entry,
            steps: self.steps,
            index,
            fields: self.fields,
        })
    }
}

fn successors(step: &StepDefinition) -> impl Iterator<Item = StepId> {
    step.next.targets().into_iter().filter_map(|t| match t {
        Target::Step(id) => Some(id),
        Target::Terminal => None,
    })
}

fn reachable_from(
    entry: &StepId,
    steps: &[StepDefinition],
    index: &HashMap<StepId, usize>,
) -> HashSet<StepId> {
    let mut seen = HashSet::from([entry.clone()]);
    let mut queue = vec![entry.clone()];
    while let Some(id) = queue.pop() {
        for next in successors(&steps[index[&id]]) {
            if seen.insert(next.clone()) {
                queue.push(next);
            }
        }
    }
    seen
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

fn check_acyclic(
    steps: &[StepDefinition],
    index: &HashMap<StepId, usize>,
) -> Result<(), FlowError> {
    fn visit(
        i: usize,
        steps: &[StepDefinition],
        index: &HashMap<StepId, usize>,
        marks: &mut Vec<Option<Mark>>,
    ) -> Result<(), FlowError> {
        match marks[i] {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(FlowError::Configuration(format!(
                    "Cycle detected through step '{}'",
                    steps[i].id
                )))
            }
            None => {}
        }
        marks[i] = Some(Mark::Visiting);
        for next in successors(&steps[i]) {
            visit(index[&next], steps, index, marks)?;
        }
        marks[i] = Some(Mark::Done);
        Ok(())
    }

    let mut marks = vec![None; steps.len()];
    for i in 0..steps.len() {
        visit(i, steps, index, &mut marks)?;
    }
    Ok(())
}
