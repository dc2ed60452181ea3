//! Configuration types for the watcher binary

use asg_lifecycle_common::defaults::DEFAULT_ABANDON_EXIT_CODE;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}

/// AWS client configuration
#[derive(Debug, Clone, Default, garde::Validate)]
pub struct AwsConfig {
    /// AWS region (falls back to the default provider chain)
    #[garde(length(min = 1))]
    pub region: Option<String>,
    /// AWS profile name (overrides default credential resolution)
    #[garde(length(min = 1))]
    pub aws_profile: Option<String>,
}

/// Where the lifecycle hook queue comes from
#[derive(Debug, Clone, PartialEq, Eq, garde::Validate)]
pub enum QueueTarget {
    /// Queue URL given directly
    QueueUrl(#[garde(length(min = 1))] String),
    /// Discover the queue from the group's lifecycle hooks
    Group(#[garde(length(min = 1))] String),
    /// Look up the instance's group, then discover as for `Group`
    Instance(#[garde(custom(instance_id))] String),
}

fn instance_id(value: &String, _: &()) -> garde::Result {
    match value.strip_prefix("i-") {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => Ok(()),
        _ => Err(garde::Error::new("not an EC2 instance id")),
    }
}

/// External command deciding each actionable event
#[derive(Debug, Clone, garde::Validate)]
pub struct HandlerCommandConfig {
    #[garde(length(min = 1))]
    pub program: String,
    #[garde(skip)]
    pub args: Vec<String>,
    /// Exit status meaning ABANDON; zero always means CONTINUE
    #[garde(range(min = 1, max = 255))]
    pub abandon_exit_code: i32,
    /// Kill the command and leave the message for redelivery after this long
    #[garde(skip)]
    pub timeout: Option<Duration>,
}

impl HandlerCommandConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            abandon_exit_code: DEFAULT_ABANDON_EXIT_CODE,
            timeout: None,
        }
    }
}

/// Complete watcher configuration, built from CLI arguments
#[derive(Debug, Clone, garde::Validate)]
pub struct WatcherConfig {
    #[garde(dive)]
    pub aws: AwsConfig,
    #[garde(dive)]
    pub target: QueueTarget,
    #[garde(dive)]
    pub handler: HandlerCommandConfig,
    #[garde(skip)]
    pub json_logs: bool,
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        garde::Validate::validate(self)?;
        Ok(())
    }
}
