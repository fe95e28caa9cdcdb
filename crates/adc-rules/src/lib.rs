//! Compliance Rule
//!
//! Flags directory users whose account-control flags carry
//! DONT_EXPIRE_PASSWORD. One change notification in, one evaluation
//! reported back with the notification's result token.

pub mod evaluator;
pub mod event;

pub use evaluator::{
    account_control_flags, evaluate_compliance, ComplianceEvaluator, DONT_EXPIRE_PASSWORD,
};
pub use event::ChangeEvent;
