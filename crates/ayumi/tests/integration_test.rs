use async_trait::async_trait;
use ayumi::prelude::*;
use ayumi::{Criterion, FlowStateStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn start(kind: FlowKind) -> FlowController {
    FlowController::start(kind, &FlowCatalog::default()).expect("valid flow")
}

fn commit_all(flow: &mut FlowController, fields: &[(&str, &str)]) {
    for (name, value) in fields {
        flow.commit_field(*name, value).expect("known field");
    }
}

#[test]
fn test_signup_end_to_end() {
    let mut flow = start(FlowKind::Signup);
    assert_eq!(flow.current_step().expect("active").id.as_str(), "NameEmail");

    commit_all(
        &mut flow,
        &[("firstName", "A"), ("lastName", "B"), ("email", "a@b.com")],
    );
    assert_eq!(flow.advance(), Ok(Advance::Step(StepId::new("PasswordSet"))));

    let weak = flow.commit_field("password", "weak").expect("known field");
    assert!(weak.strength().unwrap_or(0) < 60);
    assert!(!flow.can_advance());
    assert!(matches!(
        flow.advance(),
        Err(FlowError::GateNotSatisfied { step, .. }) if step.as_str() == "PasswordSet"
    ));

    flow.commit_field("password", "Str0ng!ab").expect("known field");
    assert!(flow.can_advance());
    assert_eq!(flow.advance(), Ok(Advance::Step(StepId::new("VerifyCode"))));

    flow.commit_field("emailVerificationCode", "123456").expect("known field");
    let payload = match flow.advance() {
        Ok(Advance::Completed(payload)) => payload,
        other => panic!("expected completion, got {:?}", other),
    };

    assert_eq!(flow.status(), FlowStatus::Completed);
    assert_eq!(payload.len(), 5);
    assert_eq!(payload.text("firstName"), Some("A"));
    assert_eq!(payload.text("lastName"), Some("B"));
    assert_eq!(payload.text("email"), Some("a@b.com"));
    assert_eq!(payload.text("password"), Some("Str0ng!ab"));
    assert_eq!(payload.text("emailVerificationCode"), Some("123456"));

    // Completed is absorbing.
    assert!(flow.snapshot().is_empty());
    assert!(matches!(
        flow.commit_field("email", "c@d.com"),
        Err(FlowError::FlowTerminated {
            status: FlowStatus::Completed
        })
    ));
    flow.abandon();
    assert_eq!(flow.status(), FlowStatus::Completed);
}

#[test]
fn test_onboarding_skips_bank_linking_when_linked() {
    let mut flow = start(FlowKind::Onboarding);
    flow.raise_signal(Signal::BANK_LINKED).expect("active");
    commit_all(
        &mut flow,
        &[("phoneNumber", "+1 555 123 4567"), ("dateOfBirth", "1990-01-01")],
    );

    assert_ne!(flow.current_step().expect("active").id.as_str(), "LinkBank");
    match flow.advance() {
        Ok(Advance::Completed(payload)) => {
            assert_eq!(payload.len(), 2);
            assert!(!payload.contains("bankAccountId"));
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(flow.current_step().is_err());
}

#[test]
fn test_onboarding_links_bank_otherwise() {
    let mut flow = start(FlowKind::Onboarding);
    commit_all(
        &mut flow,
        &[("phoneNumber", "5551234567"), ("dateOfBirth", "1990-01-01")],
    );
    assert_eq!(flow.advance(), Ok(Advance::Step(StepId::new("LinkBank"))));
    assert_eq!(flow.current_step().expect("active").id.as_str(), "LinkBank");

    flow.commit_field("bankAccountId", "acct_123").expect("known field");
    assert!(matches!(flow.advance(), Ok(Advance::Completed(p)) if p.len() == 3));
}

#[test]
fn test_abandon_then_init_has_no_leakage() {
    for kind in FlowKind::ALL {
        let mut flow = start(kind);
        let field = flow.definition().fields()[0].name.clone();
        flow.commit_field(field, "something").expect("known field");
        flow.abandon();
        assert_eq!(flow.status(), FlowStatus::Abandoned);
        assert!(flow.snapshot().is_empty());

        let fresh = start(kind);
        assert_eq!(fresh.status(), FlowStatus::Active);
        assert!(fresh.snapshot().is_empty());
        assert_eq!(&fresh.state().current_step, fresh.definition().entry());
    }
}

#[test]
fn test_abandon_is_idempotent() {
    let mut flow = start(FlowKind::Signup);
    flow.abandon();
    let once = flow.state().clone();
    flow.abandon();
    assert_eq!(flow.state(), &once);

    let mut untouched = start(FlowKind::PasswordReset);
    untouched.abandon();
    untouched.abandon();
    assert_eq!(untouched.status(), FlowStatus::Abandoned);
}

#[test]
fn test_finalize_depends_only_on_final_payload() {
    // Commit every field up front, in reverse order, before leaving the entry.
    let mut flow = start(FlowKind::Signup);
    commit_all(
        &mut flow,
        &[
            ("emailVerificationCode", "123456"),
            ("password", "Str0ng!ab"),
            ("email", "a@b.com"),
            ("lastName", "B"),
            ("firstName", "A"),
        ],
    );
    assert!(matches!(flow.advance(), Ok(Advance::Step(_))));
    assert!(matches!(flow.advance(), Ok(Advance::Step(_))));
    assert!(matches!(flow.advance(), Ok(Advance::Completed(p)) if p.len() == 5));
}

#[test]
fn test_finalize_refused_before_terminal_step() {
    let mut store = FlowStateStore::init(FlowKind::Signup).expect("valid flow");
    store.set_field("email", "a@b.com").expect("known field");
    assert!(matches!(
        store.finalize(),
        Err(FlowError::IncompleteFlow { current }) if current.as_str() == "NameEmail"
    ));
}

#[test]
fn test_dropped_flow_leaves_no_state_behind() {
    let definition = Arc::new(
        FlowCatalog::default()
            .definition(FlowKind::Signup)
            .expect("valid flow"),
    );
    {
        let mut flow = FlowController::new(definition.clone());
        flow.commit_field("email", "a@b.com").expect("known field");
    }
    let flow = FlowController::new(definition);
    assert!(flow.snapshot().is_empty());
}

#[test]
fn test_password_meter_feedback() {
    assert_eq!(evaluate("password", "").score, Score::Strength(0));
    assert_eq!(evaluate("password", "Abc12345!").score, Score::Strength(100));

    let lower_only = evaluate("password", "abc");
    assert_eq!(lower_only.score, Score::Strength(20));
    assert_eq!(lower_only.criterion(Criterion::Lowercase), Some(true));
    assert_eq!(lower_only.criterion(Criterion::Uppercase), Some(false));
}

#[derive(Debug, Default)]
struct RecordingSink {
    received: Mutex<Vec<(FlowKind, Payload)>>,
}

#[async_trait]
impl SubmissionSink for RecordingSink {
    async fn submit(
        &self,
        kind: FlowKind,
        payload: &Payload,
    ) -> Result<SubmissionId, SubmissionError> {
        let mut received = self
            .received
            .lock()
            .map_err(|_| SubmissionError::Unavailable("poisoned".to_string()))?;
        received.push((kind, payload.clone()));
        Ok(SubmissionId::new(format!("sub-{}", received.len())))
    }
}

#[derive(Debug)]
struct DownSink;

#[async_trait]
impl SubmissionSink for DownSink {
    async fn submit(
        &self,
        _kind: FlowKind,
        _payload: &Payload,
    ) -> Result<SubmissionId, SubmissionError> {
        Err(SubmissionError::Unavailable("offline".to_string()))
    }
}

#[tokio::test]
async fn test_completed_payload_reaches_sink() {
    let mut flow = start(FlowKind::PasswordReset);
    flow.commit_field("email", "a@b.com").expect("known field");
    flow.advance().expect("gate open");
    flow.commit_field("resetCode", "000111").expect("known field");
    flow.advance().expect("gate open");
    commit_all(
        &mut flow,
        &[("password", "N3w!passw"), ("confirmPassword", "N3w!passw")],
    );

    let Ok(Advance::Completed(payload)) = flow.advance() else {
        panic!("expected completion");
    };
    let sink = RecordingSink::default();
    let id = submit_completed(&sink, flow.kind(), payload)
        .await
        .expect("accepted");

    assert_eq!(id.as_str(), "sub-1");
    let received = sink.received.lock().expect("not poisoned");
    assert_eq!(received[0].0, FlowKind::PasswordReset);
    assert_eq!(received[0].1.text("resetCode"), Some("000111"));
}

#[tokio::test]
async fn test_submission_failure_keeps_flow_completed() {
    let mut flow = start(FlowKind::Onboarding);
    flow.raise_signal(Signal::BANK_LINKED).expect("active");
    commit_all(
        &mut flow,
        &[("phoneNumber", "5551234567"), ("dateOfBirth", "1990-01-01")],
    );
    let Ok(Advance::Completed(payload)) = flow.advance() else {
        panic!("expected completion");
    };

    let sink = RetryingSink::new(
        DownSink,
        SubmissionConfig {
            timeout: Duration::from_secs(1),
            retry_policy: RetryPolicy::fixed(1, Duration::from_millis(1)),
        },
    );
    let result = submit_completed(&sink, flow.kind(), payload).await;

    assert!(matches!(result, Err(SubmissionError::Unavailable(_))));
    assert_eq!(flow.status(), FlowStatus::Completed);
}
