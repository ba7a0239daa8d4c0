//! A guided multi-step flow controller for Rust.
//!
//! A flow walks a user through an ordered, possibly branching sequence of
//! steps (signup, password reset, onboarding). Each step collects a few
//! fields, validates them and keeps them in memory until the flow completes
//! or is abandoned.
//!
//! # Example
//!
//! ```rust
//! use ayumi::prelude::*;
//!
//! # fn main() -> Result<(), FlowError> {
//! let mut flow = FlowController::start(FlowKind::Signup, &FlowCatalog::default())?;
//!
//! flow.commit_field("firstName", "A")?;
//! flow.commit_field("lastName", "B")?;
//! flow.commit_field("email", "a@b.com")?;
//! flow.advance()?;
//!
//! let strength = flow.commit_field("password", "weak")?;
//! assert!(!strength.passed());
//! assert!(flow.advance().is_err());
//!
//! flow.commit_field("password", "Str0ng!ab")?;
//! flow.advance()?;
//! flow.commit_field("emailVerificationCode", "123456")?;
//!
//! match flow.advance()? {
//!     Advance::Completed(payload) => assert_eq!(payload.len(), 5),
//!     Advance::Step(step) => unreachable!("still on {}", step),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Completed payloads go to a [`SubmissionSink`]; see [`submit_completed`]
//! and [`RetryingSink`].

mod controller;
mod sink;

// Re-export core types
pub use ayumi_core::*;

pub use controller::{Advance, FlowController};
pub use sink::{
    submit_completed, RetryPolicy, RetryPolicyError, RetryingSink, SubmissionConfig,
    SubmissionError, SubmissionId, SubmissionSink,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        evaluate, submit_completed, Advance, FieldName, FlowCatalog, FlowConfig, FlowController,
        FlowError, FlowKind, FlowStatus, Payload, RetryPolicy, RetryingSink, Score, Signal,
        StepDefinition, StepId, SubmissionConfig, SubmissionError, SubmissionId, SubmissionSink,
        ValidationResult,
    };
}
