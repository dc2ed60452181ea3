//! Lifecycle handler that runs an external command
//!
//! The event is written to the command's stdin as JSON and its main fields
//! are exported as `LIFECYCLE_*` environment variables. Output is streamed
//! line by line into the log. The exit status decides the outcome.

use crate::config::HandlerCommandConfig;
use crate::sandbox::{HandlerError, LifecycleHandler};
use anyhow::Context;
use asg_lifecycle_common::defaults::HOOK_ENV_PREFIX;
use asg_lifecycle_common::{Decision, LifecycleEvent};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

const STREAM_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Map a command's exit code to a decision.
///
/// `None` means the process was killed by a signal.
pub fn exit_status_decision(code: Option<i32>, abandon_exit_code: i32) -> Result<Decision, HandlerError> {
    match code {
        Some(0) => Ok(Decision::Continue),
        Some(c) if c == abandon_exit_code => Ok(Decision::Abandon),
        Some(c) => Err(HandlerError::msg(format!("hook command exited with status {c}"))),
        None => Err(HandlerError::msg("hook command terminated by signal")),
    }
}

/// Runs [`HandlerCommandConfig::program`] once per actionable event
#[derive(Debug, Clone)]
pub struct CommandHandler {
    config: HandlerCommandConfig,
}

impl CommandHandler {
    pub fn new(config: HandlerCommandConfig) -> Self {
        Self { config }
    }

    fn command(&self, event: &LifecycleEvent) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .env(format!("{HOOK_ENV_PREFIX}TRANSITION"), event.transition.as_str())
            .env(format!("{HOOK_ENV_PREFIX}INSTANCE_ID"), &event.instance_id)
            .env(format!("{HOOK_ENV_PREFIX}GROUP_NAME"), &event.group_name)
            .env(format!("{HOOK_ENV_PREFIX}HOOK_NAME"), &event.hook_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, event: &LifecycleEvent) -> anyhow::Result<Option<i32>> {
        let program = &self.config.program;
        info!(
            cmd = %program,
            args = ?self.config.args,
            instance_id = %event.instance_id,
            transition = %event.transition,
            "Running hook command"
        );

        let mut child = self
            .command(event)
            .spawn()
            .with_context(|| format!("Failed to spawn hook command: {}", program))?;

        let mut stdin = child.stdin.take().context("Failed to capture stdin")?;
        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let stderr = child.stderr.take().context("Failed to capture stderr")?;

        let payload = event.to_json();
        if let Err(e) = stdin.write_all(payload.as_bytes()).await {
            debug!(error = %e, "Hook command did not read the event from stdin");
        }
        drop(stdin);

        let instance_id = event.instance_id.clone();
        let stdout_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(instance_id = %instance_id, stream = "stdout", "{}", line);
            }
        });
        let instance_id = event.instance_id.clone();
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(instance_id = %instance_id, stream = "stderr", "{}", line);
            }
        });

        let status = match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(
                        cmd = %program,
                        timeout_secs = timeout.as_secs(),
                        "Hook command timed out, killing process"
                    );
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill timed-out hook command");
                    }
                    anyhow::bail!("Hook command '{}' timed out after {}s", program, timeout.as_secs());
                }
            },
            None => child.wait().await,
        }
        .context("Failed waiting for hook command")?;

        let _ = tokio::time::timeout(STREAM_FLUSH_TIMEOUT, stdout_handle).await;
        let _ = tokio::time::timeout(STREAM_FLUSH_TIMEOUT, stderr_handle).await;

        Ok(status.code())
    }
}

#[async_trait]
impl LifecycleHandler for CommandHandler {
    async fn handle(&self, event: &LifecycleEvent) -> Result<Decision, HandlerError> {
        let code = self.run(event).await?;
        exit_status_decision(code, self.config.abandon_exit_code)
    }
}
