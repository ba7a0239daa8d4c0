//! Flow controller: the state machine driving one flow session.

use ayumi_core::{
    FieldName, FieldSpec, FlowCatalog, FlowDefinition, FlowError, FlowKind, FlowState,
    FlowStateStore, FlowStatus, GateCheck, Payload, Signal, StepDefinition, StepId, Target,
    ValidationResult,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of a successful [`FlowController::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The flow moved to the given step.
    Step(StepId),
    /// The terminal step was passed; the accumulated payload is handed out.
    Completed(Payload),
}

/// Drives one flow session from its entry step to completion or abandonment.
///
/// The controller exclusively owns its [`FlowStateStore`]; collaborators
/// only go through the operations below. Dropping a controller whose flow is
/// still active abandons it, so every exit path discards the payload.
///
/// ```
/// use ayumi::prelude::*;
///
/// let mut flow = FlowController::start(FlowKind::Signup, &FlowCatalog::default())?;
/// flow.commit_field("firstName", "A")?;
/// flow.commit_field("lastName", "B")?;
/// flow.commit_field("email", "a@b.com")?;
///
/// assert!(flow.can_advance());
/// assert_eq!(flow.advance()?, Advance::Step(StepId::new("PasswordSet")));
/// # Ok::<(), FlowError>(())
/// ```
pub struct FlowController {
    store: FlowStateStore,
    validations: HashMap<FieldName, ValidationResult>,
}

impl fmt::Debug for FlowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.store.state();
        f.debug_struct("FlowController")
            .field("kind", &state.kind)
            .field("current_step", &state.current_step)
            .field("status", &state.status)
            .field("fields", &state.payload.len())
            .finish()
    }
}

impl FlowController {
    /// Creates a controller for an arbitrary flow definition.
    pub fn new(definition: Arc<FlowDefinition>) -> Self {
        let store = FlowStateStore::new(definition);
        debug!(
            "Flow '{}' started at step '{}'",
            store.state().kind,
            store.state().current_step
        );
        Self {
            store,
            validations: HashMap::new(),
        }
    }

    /// Creates a controller for a built-in flow.
    pub fn start(kind: FlowKind, catalog: &FlowCatalog) -> Result<Self, FlowError> {
        let definition = catalog.definition(kind)?;
        Ok(Self::new(Arc::new(definition)))
    }

    /// Returns the flow kind.
    pub fn kind(&self) -> FlowKind {
        self.store.state().kind
    }

    /// Returns the lifecycle status.
    pub fn status(&self) -> FlowStatus {
        self.store.state().status
    }

    /// Returns the full flow state.
    pub fn state(&self) -> &FlowState {
        self.store.state()
    }

    /// Returns the flow definition.
    pub fn definition(&self) -> &FlowDefinition {
        self.store.definition()
    }

    /// Returns a copy of the collected payload.
    pub fn snapshot(&self) -> Payload {
        self.store.snapshot()
    }

    /// Returns the most recent validation of `field` in this session.
    ///
    /// Fields without a rule record an unchecked passing result.
    pub fn last_validation(&self, field: &str) -> Option<&ValidationResult> {
        self.validations.get(field)
    }

    /// Returns the step the navigation layer should render.
    pub fn current_step(&self) -> Result<&StepDefinition, FlowError> {
        self.ensure_active()?;
        let current = &self.store.state().current_step;
        self.store
            .definition()
            .step(current.as_str())
            .ok_or_else(|| FlowError::StepNotFound(current.clone()))
    }

    /// Validates and stores a text field.
    ///
    /// The value is stored even when it fails validation so the user keeps
    /// what they typed; the returned result drives inline feedback. Only
    /// fields with a rule are validated.
    pub fn commit_field(
        &mut self,
        name: impl Into<FieldName>,
        raw: &str,
    ) -> Result<ValidationResult, FlowError> {
        let name = name.into();
        self.store
            .set_field(name.clone(), raw)
            .map_err(|e| report(self.kind(), e))?;

        let rule = self
            .store
            .definition()
            .field(name.as_str())
            .and_then(FieldSpec::rule);
        let result = match rule {
            Some(rule) => rule.evaluate(name.clone(), raw),
            None => ValidationResult::unchecked(name.clone()),
        };
        debug!(
            "Committed '{}' in {} flow (passed: {})",
            name,
            self.kind(),
            result.passed()
        );
        self.validations.insert(name, result.clone());
        Ok(result)
    }

    /// Stores a boolean field such as a consent checkbox.
    pub fn commit_flag(&mut self, name: impl Into<FieldName>, value: bool) -> Result<(), FlowError> {
        let name = name.into();
        self.store
            .set_field(name.clone(), value)
            .map_err(|e| report(self.kind(), e))?;
        debug!("Committed '{}' = {} in {} flow", name, value, self.kind());
        Ok(())
    }

    /// Records an external fact that branch routes test.
    ///
    /// If the new route skips the current step, the flow returns to the
    /// last step passed on that route.
    pub fn raise_signal(&mut self, signal: Signal) -> Result<(), FlowError> {
        let from = self.store.state().current_step.clone();
        self.store
            .raise_signal(signal)
            .map_err(|e| report(self.kind(), e))?;
        info!("Signal '{}' raised for {} flow", signal, self.kind());

        let to = &self.store.state().current_step;
        if *to != from {
            info!("Step '{}' skipped by signal '{}', back to '{}'", from, signal, to);
        }
        Ok(())
    }

    /// Checks the current step's gate against the collected payload.
    pub fn gate_check(&self) -> Result<GateCheck, FlowError> {
        let step = self.current_step()?;
        Ok(self
            .store
            .definition()
            .check_gate(step, &self.store.state().payload))
    }

    /// Returns `true` if [`advance`](Self::advance) would succeed.
    ///
    /// Always `false` once the flow has terminated.
    pub fn can_advance(&self) -> bool {
        self.gate_check()
            .map(|check| check.is_satisfied())
            .unwrap_or(false)
    }

    /// Required fields of the current step that have no value yet.
    pub fn missing_fields(&self) -> Vec<FieldName> {
        self.gate_check()
            .map(|check| check.missing)
            .unwrap_or_default()
    }

    /// Leaves the current step.
    ///
    /// Fails with [`FlowError::GateNotSatisfied`] and changes nothing when
    /// the step's requirements are not met. Passing the terminal step
    /// completes the flow and returns the payload.
    pub fn advance(&mut self) -> Result<Advance, FlowError> {
        let (step, required, check, target) = {
            let current = self.current_step().map_err(|e| report(self.kind(), e))?;
            let state = self.store.state();
            (
                current.id.clone(),
                current.required_fields.clone(),
                self.store.definition().check_gate(current, &state.payload),
                current.next.resolve(&state.signals),
            )
        };

        if !check.is_satisfied() {
            let mut failing = check.failing;
            if check.gate_rejected {
                let rejected: Vec<FieldName> = required
                    .into_iter()
                    .filter(|f| !failing.contains(f) && !check.missing.contains(f))
                    .collect();
                failing.extend(rejected);
            }
            warn!(
                "Cannot leave step '{}' of {} flow: {} missing, {} failing",
                step,
                self.kind(),
                check.missing.len(),
                failing.len()
            );
            return Err(FlowError::GateNotSatisfied {
                step,
                missing: check.missing,
                failing,
            });
        }

        match target {
            Target::Step(next) => {
                self.store
                    .move_to(next.clone())
                    .map_err(|e| report(self.kind(), e))?;
                info!("Step '{}' completed, moving to '{}'", step, next);
                Ok(Advance::Step(next))
            }
            Target::Terminal => {
                let payload = self.store.finalize().map_err(|e| report(self.kind(), e))?;
                self.validations.clear();
                info!(
                    "{} flow completed at step '{}' with {} fields",
                    self.kind(),
                    step,
                    payload.len()
                );
                Ok(Advance::Completed(payload))
            }
        }
    }

    /// Returns to a step already passed on the current route.
    ///
    /// Fields collected for later steps are kept, so re-submitting the
    /// same values brings the user straight back to where they were.
    pub fn go_back(&mut self, to: impl Into<StepId>) -> Result<(), FlowError> {
        let to = to.into();
        let from = self.current_step().map_err(|e| report(self.kind(), e))?.id.clone();
        let state = self.store.state();
        let path = self.store.definition().path(&state.signals);
        let position = |id: &StepId| path.iter().position(|p| p == id);

        match (position(&to), position(&from)) {
            (Some(target), Some(current)) if target <= current => {}
            _ => {
                let e = if self.store.definition().step(to.as_str()).is_none() {
                    FlowError::StepNotFound(to)
                } else {
                    FlowError::InvalidTransition { from, to }
                };
                return Err(report(self.kind(), e));
            }
        }

        self.store
            .move_to(to.clone())
            .map_err(|e| report(self.kind(), e))?;
        info!("Returned from step '{}' to '{}'", from, to);
        Ok(())
    }

    /// Discards the payload and ends the flow.
    ///
    /// Idempotent and safe at any point, including before the first commit.
    /// A completed flow stays completed.
    pub fn abandon(&mut self) {
        let was_active = self.status() == FlowStatus::Active;
        self.store.reset();
        self.validations.clear();
        if was_active {
            info!(
                "{} flow abandoned at step '{}'",
                self.kind(),
                self.store.state().current_step
            );
        }
    }

    fn ensure_active(&self) -> Result<(), FlowError> {
        let status = self.status();
        if status.is_terminated() {
            return Err(FlowError::FlowTerminated { status });
        }
        Ok(())
    }
}

impl Drop for FlowController {
    fn drop(&mut self) {
        if self.status() == FlowStatus::Active {
            debug!("{} flow dropped while active", self.kind());
            self.abandon();
        }
    }
}

fn report(kind: FlowKind, e: FlowError) -> FlowError {
    if e.is_defect() {
        error!("Defect in {} flow: {}", kind, e);
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayumi_core::{FieldKind, Route, Score, ValidationRule};

    fn signup() -> FlowController {
        FlowController::start(FlowKind::Signup, &FlowCatalog::default()).expect("valid flow")
    }

    fn fill_name_email(flow: &mut FlowController) {
        flow.commit_field("firstName", "A").expect("known field");
        flow.commit_field("lastName", "B").expect("known field");
        flow.commit_field("email", "a@b.com").expect("known field");
    }

    #[test]
    fn test_commit_stores_invalid_value() {
        let mut flow = signup();
        let result = flow.commit_field("email", "not-an-email").expect("known field");
        assert!(!result.passed());
        assert_eq!(flow.snapshot().text("email"), Some("not-an-email"));
        assert_eq!(flow.last_validation("email"), Some(&result));
    }

    #[test]
    fn test_commit_unknown_field_leaves_state_unchanged() {
        let mut flow = signup();
        let before = flow.state().clone();
        let result = flow.commit_field("nickname", "x");
        assert!(matches!(result, Err(FlowError::UnknownField { .. })));
        assert_eq!(flow.state(), &before);
        assert!(flow.last_validation("nickname").is_none());
    }

    #[test]
    fn test_commit_returns_strength() {
        let mut flow = signup();
        let result = flow.commit_field("password", "abc").expect("known field");
        assert_eq!(result.score, Score::Strength(20));
    }

    #[test]
    fn test_rejected_advance_is_pure_guard() {
        let mut flow = signup();
        flow.commit_field("firstName", "A").expect("known field");
        let before = flow.state().clone();

        for _ in 0..3 {
            let err = flow.advance().expect_err("gate closed");
            assert_eq!(
                err,
                FlowError::GateNotSatisfied {
                    step: StepId::new("NameEmail"),
                    missing: vec![FieldName::new("lastName"), FieldName::new("email")],
                    failing: vec![],
                }
            );
            assert_eq!(flow.state(), &before);
        }
        assert_eq!(
            flow.missing_fields(),
            vec![FieldName::new("lastName"), FieldName::new("email")]
        );
    }

    #[test]
    fn test_go_back_keeps_later_fields() {
        let mut flow = signup();
        fill_name_email(&mut flow);
        flow.advance().expect("gate open");
        flow.commit_field("password", "Str0ng!ab").expect("known field");

        flow.go_back("NameEmail").expect("step behind");
        assert_eq!(flow.state().current_step.as_str(), "NameEmail");
        assert_eq!(flow.snapshot().text("password"), Some("Str0ng!ab"));

        flow.commit_field("email", "a@b.com").expect("known field");
        assert_eq!(flow.advance(), Ok(Advance::Step(StepId::new("PasswordSet"))));
        assert_eq!(flow.advance(), Ok(Advance::Step(StepId::new("VerifyCode"))));
    }

    #[test]
    fn test_go_back_forward_rejected() {
        let mut flow = signup();
        assert_eq!(
            flow.go_back("VerifyCode"),
            Err(FlowError::InvalidTransition {
                from: StepId::new("NameEmail"),
                to: StepId::new("VerifyCode"),
            })
        );
        assert_eq!(
            flow.go_back("Nowhere"),
            Err(FlowError::StepNotFound(StepId::new("Nowhere")))
        );
    }

    #[test]
    fn test_password_reset_mismatch_reports_fields() {
        let mut flow = FlowController::start(FlowKind::PasswordReset, &FlowCatalog::default())
            .expect("valid flow");
        flow.commit_field("email", "a@b.com").expect("known field");
        flow.advance().expect("gate open");
        flow.commit_field("resetCode", "654321").expect("known field");
        flow.advance().expect("gate open");

        flow.commit_field("password", "Str0ng!ab").expect("known field");
        flow.commit_field("confirmPassword", "Str0ng!ax").expect("known field");
        let err = flow.advance().expect_err("passwords differ");
        assert_eq!(
            err,
            FlowError::GateNotSatisfied {
                step: StepId::new("NewPassword"),
                missing: vec![],
                failing: vec![FieldName::new("password"), FieldName::new("confirmPassword")],
            }
        );

        flow.commit_field("confirmPassword", "Str0ng!ab").expect("known field");
        match flow.advance() {
            Ok(Advance::Completed(payload)) => assert_eq!(payload.len(), 4),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_terminated_flow_rejects_operations() {
        let mut flow = signup();
        flow.abandon();

        let terminated = FlowError::FlowTerminated {
            status: FlowStatus::Abandoned,
        };
        assert_eq!(flow.commit_field("email", "a@b.com"), Err(terminated.clone()));
        assert_eq!(flow.advance(), Err(terminated.clone()));
        assert_eq!(flow.current_step().map(|s| s.id.clone()), Err(terminated.clone()));
        assert_eq!(flow.raise_signal(Signal::BANK_LINKED), Err(terminated));
        assert!(!flow.can_advance());
    }

    #[test]
    fn test_informational_step_advances_immediately() {
        let definition = FlowDefinition::builder(FlowKind::Onboarding)
            .field(FieldSpec::plain("bankAccountId"))
            .step(StepDefinition::new("Welcome", Route::to("LinkBank")))
            .step(StepDefinition::new("LinkBank", Route::Terminal).requires(["bankAccountId"]))
            .build()
            .expect("valid flow");
        let mut flow = FlowController::new(Arc::new(definition));

        assert!(flow.can_advance());
        assert_eq!(flow.advance(), Ok(Advance::Step(StepId::new("LinkBank"))));
        assert!(!flow.can_advance());
    }

    #[test]
    fn test_flag_field_gate() {
        let definition = FlowDefinition::builder(FlowKind::Onboarding)
            .field(FieldSpec::flag("termsAccepted"))
            .step(StepDefinition::new("Terms", Route::Terminal).requires(["termsAccepted"]))
            .build()
            .expect("valid flow");
        let mut flow = FlowController::new(Arc::new(definition));

        flow.commit_flag("termsAccepted", false).expect("known field");
        assert!(!flow.can_advance());
        flow.commit_flag("termsAccepted", true).expect("known field");
        assert!(flow.can_advance());
    }

    #[test]
    fn test_flag_cannot_stand_in_for_text_field() {
        let mut flow = signup();
        fill_name_email(&mut flow);
        flow.advance().expect("gate open");

        let err = flow.commit_flag("password", true).expect_err("text field");
        assert_eq!(
            err,
            FlowError::FieldKindMismatch {
                field: FieldName::new("password"),
                expected: FieldKind::Text(Some(ValidationRule::PasswordStrength {
                    min_score: 60
                })),
            }
        );
        assert!(!flow.snapshot().contains("password"));
        assert!(!flow.can_advance());
        assert_eq!(
            flow.advance(),
            Err(FlowError::GateNotSatisfied {
                step: StepId::new("PasswordSet"),
                missing: vec![FieldName::new("password")],
                failing: vec![],
            })
        );

        assert!(flow.commit_flag("emailVerificationCode", true).is_err());
        assert_eq!(flow.state().current_step.as_str(), "PasswordSet");
    }

    #[test]
    fn test_text_cannot_stand_in_for_flag_field() {
        let definition = FlowDefinition::builder(FlowKind::Onboarding)
            .field(FieldSpec::flag("termsAccepted"))
            .step(StepDefinition::new("Terms", Route::Terminal).requires(["termsAccepted"]))
            .build()
            .expect("valid flow");
        let mut flow = FlowController::new(Arc::new(definition));

        assert!(matches!(
            flow.commit_field("termsAccepted", "yes"),
            Err(FlowError::FieldKindMismatch { .. })
        ));
        assert!(flow.last_validation("termsAccepted").is_none());
        assert!(!flow.can_advance());
    }

    #[test]
    fn test_commit_without_rule_is_unchecked() {
        let mut flow = signup();
        let result = flow.commit_field("firstName", "").expect("known field");
        assert_eq!(result.score, Score::Pass(true));
        assert!(result.criteria.is_empty());

        // Blank text still counts as missing at the gate.
        flow.commit_field("lastName", "B").expect("known field");
        flow.commit_field("email", "a@b.com").expect("known field");
        assert_eq!(flow.missing_fields(), vec![FieldName::new("firstName")]);
    }

    #[test]
    fn test_bank_linked_on_linking_step_returns_to_profile() {
        let mut flow = FlowController::start(FlowKind::Onboarding, &FlowCatalog::default())
            .expect("valid flow");
        flow.commit_field("phoneNumber", "5551234567").expect("known field");
        flow.commit_field("dateOfBirth", "1990-01-01").expect("known field");
        assert_eq!(flow.advance(), Ok(Advance::Step(StepId::new("LinkBank"))));

        flow.raise_signal(Signal::BANK_LINKED).expect("active");
        assert_eq!(flow.current_step().expect("active").id.as_str(), "Profile");
        assert_eq!(
            flow.go_back("LinkBank"),
            Err(FlowError::InvalidTransition {
                from: StepId::new("Profile"),
                to: StepId::new("LinkBank"),
            })
        );
        flow.go_back("Profile").expect("current step");

        match flow.advance() {
            Ok(Advance::Completed(payload)) => {
                assert_eq!(payload.len(), 2);
                assert!(!payload.contains("bankAccountId"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
