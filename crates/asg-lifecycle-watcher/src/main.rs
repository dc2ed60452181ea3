//! asg-lifecycle-watcher: completes Auto Scaling lifecycle actions
//!
//! Watches a lifecycle hook queue and runs a hook command for every
//! launching or terminating instance. The command's exit status decides
//! whether the transition continues or is abandoned.

use anyhow::{Context, Result};
use asg_lifecycle_common::defaults::DEFAULT_ABANDON_EXIT_CODE;
use asg_lifecycle_watcher::aws::{
    AutoscalingClient, AwsContext, FromAwsContext, SqsClient, resolve_queue_url,
};
use asg_lifecycle_watcher::config::{
    AwsConfig, HandlerCommandConfig, QueueTarget, WatcherConfig,
};
use asg_lifecycle_watcher::hook_command::CommandHandler;
use asg_lifecycle_watcher::sandbox::quiet_raised_errors;
use asg_lifecycle_watcher::{LifecycleWatcher, TracingObserver};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "asg-lifecycle-watcher")]
#[command(about = "Complete EC2 Auto Scaling lifecycle actions from an SQS hook queue")]
#[command(version)]
struct Args {
    /// AWS region (default: provider chain)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long)]
    aws_profile: Option<String>,

    #[command(flatten)]
    target: TargetArgs,

    /// Exit status of the hook command that abandons the transition
    #[arg(long, default_value_t = DEFAULT_ABANDON_EXIT_CODE)]
    abandon_exit_code: i32,

    /// Kill the hook command after this many seconds and retry the event later
    #[arg(long)]
    handler_timeout: Option<u64>,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,

    /// Hook command and its arguments
    #[arg(required = true, trailing_var_arg = true, num_args = 1..)]
    command: Vec<String>,
}

/// Exactly one way of locating the hook queue
#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// SQS queue URL the lifecycle hook publishes to
    #[arg(long)]
    queue_url: Option<String>,

    /// Auto Scaling group whose lifecycle hook queue to watch
    #[arg(long)]
    group: Option<String>,

    /// Instance whose Auto Scaling group to look up
    #[arg(long)]
    instance_id: Option<String>,
}

impl From<TargetArgs> for QueueTarget {
    fn from(args: TargetArgs) -> Self {
        match (args.queue_url, args.group, args.instance_id) {
            (Some(url), _, _) => QueueTarget::QueueUrl(url),
            (_, Some(group), _) => QueueTarget::Group(group),
            (_, _, Some(instance_id)) => QueueTarget::Instance(instance_id),
            // clap enforces one of the three
            (None, None, None) => QueueTarget::Group(String::new()),
        }
    }
}

impl From<Args> for WatcherConfig {
    fn from(args: Args) -> Self {
        let mut command = args.command.into_iter();
        let program = command.next().unwrap_or_default();
        Self {
            aws: AwsConfig {
                region: args.region,
                aws_profile: args.aws_profile,
            },
            target: args.target.into(),
            handler: HandlerCommandConfig {
                program,
                args: command.collect(),
                abandon_exit_code: args.abandon_exit_code,
                timeout: args.handler_timeout.map(Duration::from_secs),
            },
            json_logs: args.json,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = WatcherConfig::from(Args::parse());
    init_tracing(config.json_logs);
    quiet_raised_errors();
    config.validate()?;

    let ctx = AwsContext::with_profile(
        config.aws.region.as_deref(),
        config.aws.aws_profile.as_deref(),
    )
    .await;
    info!(
        region = ctx.region().unwrap_or("default"),
        target = ?config.target,
        "Starting asg-lifecycle-watcher"
    );

    let sqs = Arc::new(SqsClient::from_context(&ctx));
    let autoscaling = Arc::new(AutoscalingClient::from_context(&ctx));

    let queue_url = resolve_queue_url(&config.target, autoscaling.as_ref(), sqs.as_ref())
        .await
        .context("Failed to resolve lifecycle hook queue")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, finishing current event");
                signal_token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c"),
        }
    });

    let handler = CommandHandler::new(config.handler);
    let watcher = LifecycleWatcher::new(sqs, autoscaling, queue_url.into_inner())
        .with_observer(Arc::new(TracingObserver));

    if let Err(e) = watcher.run_until(&handler, &shutdown).await {
        error!(error = ?e, "Watcher stopped");
        return Err(e.into());
    }

    info!("Watcher stopped");
    Ok(())
}
