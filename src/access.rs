// 🔐 Access Gate - capability check in front of the build
//
// The build does no authentication of its own. Callers inject a gate and the
// builder refuses to start unless it says yes. Unset configuration fails closed.

use crate::error::{BuildError, Result};

/// "Is the caller allowed to build and publish the price list?"
pub trait AccessGate {
    fn is_authorized(&self) -> bool;
}

impl AccessGate for bool {
    fn is_authorized(&self) -> bool {
        *self
    }
}

/// Fail with `Unauthorized` unless the gate allows the caller
pub fn require(gate: &dyn AccessGate) -> Result<()> {
    if gate.is_authorized() {
        Ok(())
    } else {
        Err(BuildError::Unauthorized)
    }
}

/// Admin password check: the configured password against the supplied one.
///
/// No configured password means nobody is authorized.
#[derive(Debug, Clone)]
pub struct AdminPassword {
    expected: Option<String>,
    supplied: Option<String>,
}

impl AdminPassword {
    pub fn new(expected: Option<String>, supplied: Option<String>) -> Self {
        AdminPassword { expected, supplied }
    }

    pub fn is_configured(&self) -> bool {
        self.expected.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl AccessGate for AdminPassword {
    fn is_authorized(&self) -> bool {
        match (self.expected.as_deref(), self.supplied.as_deref()) {
            (Some(expected), Some(supplied)) if !expected.is_empty() => expected == supplied,
            _ => false,
        }
    }
}
