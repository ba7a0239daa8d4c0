//! Core types for the ayumi guided flow engine.
//!
//! This crate has no runtime dependencies. It holds everything that is pure
//! data or pure logic; the controller and submission hand-off live in the
//! `ayumi` crate.
//!
//! # Core Types
//!
//! - [`evaluate`] / [`ValidationRule`] - Field validators (password strength, email, codes)
//! - [`StepDefinition`] / [`Route`] - One step of a flow and where it leads
//! - [`FlowDefinition`] - A validated step graph plus field schema
//! - [`FlowCatalog`] / [`steps_for`] - The built-in signup, password reset and onboarding tables
//! - [`FlowStateStore`] - The in-memory owner of a flow's payload and cursor
//! - [`FlowError`] - Error types for flow operations

mod catalog;
mod config;
mod error;
mod field;
mod flow;
mod state;
mod step;
mod validator;

pub use catalog::{steps_for, FlowCatalog};
pub use config::FlowConfig;
pub use error::FlowError;
pub use field::{FieldName, FieldValue, Payload};
pub use flow::{FlowDefinition, FlowDefinitionBuilder, FlowKind, GateCheck};
pub use state::{FlowState, FlowStateStore, FlowStatus};
pub use step::{FieldKind, FieldSpec, Gate, Route, Signal, StepDefinition, StepId, Target};
pub use validator::{
    evaluate, Criterion, Score, ValidationResult, ValidationRule, DEFAULT_CODE_LENGTH,
    DEFAULT_PASSWORD_MIN_SCORE, PASSWORD_MIN_LENGTH, SPECIAL_CHARACTERS,
};
