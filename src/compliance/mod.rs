//! Compliance gate invoked before every order dispatch.
//!
//! The actual KYC/AML machinery is an external collaborator; the engine only
//! depends on this pass/fail contract. A failed check aborts the order with
//! no side effects on strategy or portfolio state.

use crate::common::types::OrderIntent;

/// Outcome of a compliance check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplianceVerdict {
    Pass,
    Fail(String),
}

impl ComplianceVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, ComplianceVerdict::Pass)
    }
}

/// Pass/fail check called synchronously before dispatch
#[cfg_attr(test, mockall::automock)]
pub trait ComplianceGate: Send + Sync {
    fn check(&self, intent: &OrderIntent) -> ComplianceVerdict;
}

/// Gate that passes every intent; the default for simulated runs
#[derive(Debug, Default)]
pub struct PermissiveGate;

impl ComplianceGate for PermissiveGate {
    fn check(&self, _intent: &OrderIntent) -> ComplianceVerdict {
        ComplianceVerdict::Pass
    }
}
