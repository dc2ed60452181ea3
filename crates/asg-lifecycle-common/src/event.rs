//! Lifecycle notification codec
//!
//! Auto Scaling publishes one JSON document per lifecycle transition to the
//! hook's notification target. [`LifecycleEvent::decode`] turns a queue
//! message body into a typed record, and [`LifecycleEvent::is_actionable`]
//! tells the watcher whether a decision is needed at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Transition string for instance launches
pub const TRANSITION_LAUNCHING: &str = "autoscaling:EC2_INSTANCE_LAUNCHING";

/// Transition string for instance terminations
pub const TRANSITION_TERMINATING: &str = "autoscaling:EC2_INSTANCE_TERMINATING";

/// Message body is not a well-formed lifecycle notification
#[derive(Debug, Error)]
#[error("cannot decode lifecycle event: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Kind of instance transition carried by an event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LifecycleTransition {
    Launching,
    Terminating,
    /// Anything else, including test notifications and missing values
    Other(String),
}

impl LifecycleTransition {
    pub fn parse(s: &str) -> Self {
        match s {
            TRANSITION_LAUNCHING => Self::Launching,
            TRANSITION_TERMINATING => Self::Terminating,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Launching => TRANSITION_LAUNCHING,
            Self::Terminating => TRANSITION_TERMINATING,
            Self::Other(s) => s,
        }
    }

    /// Whether this transition is waiting on a lifecycle action
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Launching | Self::Terminating)
    }
}

impl Default for LifecycleTransition {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl fmt::Display for LifecycleTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LifecycleTransition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LifecycleTransition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

/// JSON `null` decodes like a missing field
fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A lifecycle hook notification as delivered through the queue.
///
/// Every field is optional on the wire. Missing strings decode as empty;
/// a missing transition makes the event inert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(
        rename = "AutoScalingGroupName",
        default,
        deserialize_with = "nullable_string"
    )]
    pub group_name: String,

    #[serde(rename = "Service", default, deserialize_with = "nullable_string")]
    pub service: String,

    #[serde(rename = "Time", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    #[serde(
        rename = "AccountId",
        alias = "AccountID",
        default,
        deserialize_with = "nullable_string"
    )]
    pub account_id: String,

    #[serde(rename = "LifecycleTransition", default)]
    pub transition: LifecycleTransition,

    #[serde(
        rename = "RequestId",
        alias = "RequestID",
        default,
        deserialize_with = "nullable_string"
    )]
    pub request_id: String,

    #[serde(
        rename = "LifecycleActionToken",
        default,
        deserialize_with = "nullable_string"
    )]
    pub action_token: String,

    #[serde(
        rename = "EC2InstanceId",
        alias = "EC2InstanceID",
        default,
        deserialize_with = "nullable_string"
    )]
    pub instance_id: String,

    #[serde(
        rename = "LifecycleHookName",
        default,
        deserialize_with = "nullable_string"
    )]
    pub hook_name: String,

    /// Free-form metadata configured on the hook
    #[serde(
        rename = "NotificationMetadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_metadata: Option<String>,
}

impl LifecycleEvent {
    /// Decode a queue message body.
    pub fn decode(body: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Encode back to the wire format (used to hand events to hook commands).
    pub fn to_json(&self) -> String {
        // Serializing plain strings and an RFC 3339 timestamp cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Whether the event carries a launch or terminate transition
    pub fn is_actionable(&self) -> bool {
        self.transition.is_actionable()
    }
}
