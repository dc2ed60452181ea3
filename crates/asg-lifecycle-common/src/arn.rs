//! Structured Amazon Resource Names
//!
//! Lifecycle hooks name their notification target by ARN. The watcher only
//! needs the service, owner account and resource name, but parses all six
//! fields so callers never index into a split string.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArnError {
    #[error("ARN must start with 'arn:', got: {0}")]
    MissingPrefix(String),

    #[error("ARN has too few fields: {0}")]
    TooFewFields(String),

    #[error("ARN has an empty {field}: {arn}")]
    EmptyField { field: &'static str, arn: String },
}

/// `arn:<partition>:<service>:<region>:<account-id>:<resource>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    /// Everything after the account id, including any `:` or `/` separators
    pub resource: String,
}

impl Arn {
    pub fn parse(s: &str) -> Result<Self, ArnError> {
        let rest = s
            .strip_prefix("arn:")
            .ok_or_else(|| ArnError::MissingPrefix(s.to_string()))?;

        let mut fields = rest.splitn(5, ':');
        let mut next = || {
            fields
                .next()
                .ok_or_else(|| ArnError::TooFewFields(s.to_string()))
        };
        let partition = next()?;
        let service = next()?;
        let region = next()?;
        let account_id = next()?;
        let resource = next()?;

        for (field, value) in [
            ("partition", partition),
            ("service", service),
            ("resource", resource),
        ] {
            if value.is_empty() {
                return Err(ArnError::EmptyField {
                    field,
                    arn: s.to_string(),
                });
            }
        }

        Ok(Self {
            partition: partition.to_string(),
            service: service.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
            resource: resource.to_string(),
        })
    }

    /// SQS queues are the only notification targets the watcher can consume
    pub fn is_sqs_queue(&self) -> bool {
        self.service == "sqs" && !self.account_id.is_empty()
    }
}

impl FromStr for Arn {
    type Err = ArnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}
