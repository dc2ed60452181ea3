//! Continue/abandon decision returned by a lifecycle handler

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a lifecycle handler for one actionable event.
///
/// Maps onto the `LifecycleActionResult` of `CompleteLifecycleAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    /// Let the instance transition proceed
    Continue,
    /// Abandon the transition (terminates a launching instance)
    Abandon,
}

impl Decision {
    /// Wire value for `CompleteLifecycleAction`
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Continue => "CONTINUE",
            Decision::Abandon => "ABANDON",
        }
    }
}

impl From<bool> for Decision {
    fn from(should_continue: bool) -> Self {
        if should_continue {
            Decision::Continue
        } else {
            Decision::Abandon
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
