//! Call results and lifecycle phases.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use summon_core::Value;

use super::instance::{CallArgs, ComponentInstance};
use crate::error::EngineError;

/// Final status of a component call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ResultCode {
    #[default]
    Success = 0,
    /// The primary operation failed and rollback compensated for it.
    Recovered = 1,
    /// Rollback failed too. System state unknown.
    RollbackFailed = 2,
    /// The primary operation failed and no rollback was attempted.
    Failed = 3,
}

impl ResultCode {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Codes that permit the chain to continue.
    #[must_use]
    pub fn allows_chaining(self) -> bool {
        matches!(self, Self::Success | Self::Recovered)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Status code and payload recorded on an instance by its latest call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallResult {
    pub code: ResultCode,
    pub returned: Value,
}

/// Where a component is in its call protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Cold,
    Warming,
    Validating,
    Invoking,
    Succeeded,
    RollingBack,
    Chaining,
    Failed,
    Done,
    /// Required arguments are still missing; the instance awaits another call.
    Incomplete,
}

/// What a component call hands back.
#[derive(Debug, Clone)]
pub enum Outcome {
    Returned(Value),
    /// Returned when the component asks for its instance to be handed back.
    Instance(Arc<ComponentInstance>),
    /// Partial application: call again with the missing arguments.
    Incomplete(Arc<ComponentInstance>),
}

impl Outcome {
    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::Returned(value) => value.clone(),
            Self::Instance(instance) => instance.returned(),
            Self::Incomplete(_) => Value::Null,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Returned(value) => value,
            other => other.value(),
        }
    }

    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete(_))
    }

    #[must_use]
    pub fn instance(&self) -> Option<&Arc<ComponentInstance>> {
        match self {
            Self::Instance(instance) | Self::Incomplete(instance) => Some(instance),
            Self::Returned(_) => None,
        }
    }

    /// Continues an incomplete call with more arguments. Other outcomes are
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the resumed call.
    pub fn resume(self, args: CallArgs) -> Result<Outcome, EngineError> {
        match self {
            Self::Incomplete(instance) => instance.call(args),
            other => Ok(other),
        }
    }
}
