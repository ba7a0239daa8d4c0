//! Built-in step tables for signup, password reset and onboarding.

use crate::config::FlowConfig;
use crate::field::Payload;
use crate::flow::{FlowDefinition, FlowKind};
use crate::step::{FieldSpec, Route, Signal, StepDefinition};
use crate::validator::ValidationRule;
use crate::FlowError;

/// Builds the built-in flow definitions from a [`FlowConfig`].
#[derive(Debug, Clone, Default)]
pub struct FlowCatalog {
    config: FlowConfig,
}

impl FlowCatalog {
    /// Creates a catalog using `config` for its thresholds.
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    /// Returns the catalog configuration.
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Builds the definition for `kind`.
    pub fn definition(&self, kind: FlowKind) -> Result<FlowDefinition, FlowError> {
        let builder = self
            .fields(kind)
            .into_iter()
            .fold(FlowDefinition::builder(kind), |b, f| b.field(f));
        steps_for(kind)
            .into_iter()
            .fold(builder, |b, s| b.step(s))
            .build()
    }

    fn fields(&self, kind: FlowKind) -> Vec<FieldSpec> {
        let password = ValidationRule::PasswordStrength {
            min_score: self.config.password_min_score,
        };
        let code = ValidationRule::NumericCode {
            length: self.config.verification_code_length,
        };
        match kind {
            FlowKind::Signup => vec![
                FieldSpec::plain("firstName"),
                FieldSpec::plain("lastName"),
                FieldSpec::validated("email", ValidationRule::Email),
                FieldSpec::validated("password", password),
                FieldSpec::validated("emailVerificationCode", code),
            ],
            FlowKind::PasswordReset => vec![
                FieldSpec::validated("email", ValidationRule::Email),
                FieldSpec::validated("resetCode", code),
                FieldSpec::validated("password", password),
                FieldSpec::plain("confirmPassword"),
            ],
            FlowKind::Onboarding => vec![
                FieldSpec::validated("phoneNumber", ValidationRule::PhoneNumber),
                FieldSpec::plain("dateOfBirth"),
                FieldSpec::plain("bankAccountId"),
            ],
        }
    }
}

/// Returns the ordered step table for `kind`, entry step first.
pub fn steps_for(kind: FlowKind) -> Vec<StepDefinition> {
    match kind {
        FlowKind::Signup => vec![
            StepDefinition::new("NameEmail", Route::to("PasswordSet"))
                .requires(["firstName", "lastName", "email"]),
            StepDefinition::new("PasswordSet", Route::to("VerifyCode")).requires(["password"]),
            StepDefinition::new("VerifyCode", Route::Terminal)
                .requires(["emailVerificationCode"]),
        ],
        FlowKind::PasswordReset => vec![
            StepDefinition::new("RequestCode", Route::to("VerifyCode")).requires(["email"]),
            StepDefinition::new("VerifyCode", Route::to("NewPassword")).requires(["resetCode"]),
            StepDefinition::new("NewPassword", Route::Terminal)
                .requires(["password", "confirmPassword"])
                .with_gate(passwords_match),
        ],
        FlowKind::Onboarding => vec![
            StepDefinition::new(
                "Profile",
                Route::branch(Signal::BANK_LINKED, Route::Terminal, Route::to("LinkBank")),
            )
            .requires(["phoneNumber", "dateOfBirth"]),
            StepDefinition::new("LinkBank", Route::Terminal).requires(["bankAccountId"]),
        ],
    }
}

fn passwords_match(payload: &Payload) -> bool {
    matches!(
        (payload.text("password"), payload.text("confirmPassword")),
        (Some(a), Some(b)) if a == b
    )
}
