//! Best-effort progress reporting.
//!
//! Checkpoints are announced to the study tracking service through a
//! [`Publisher`]. Delivery is never required for correctness: the
//! [`Reporter`] wrapper logs failures and carries on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sfkit_proto::defaults::{DEFAULT_PUBLISH_PROGRAM, DEFAULT_PUBLISH_TIMEOUT_SECS};
use sfkit_proto::{Checkpoint, PublishError};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Placeholder in publish command arguments replaced by the message text.
pub const MESSAGE_PLACEHOLDER: &str = "{message}";

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, checkpoint: &Checkpoint) -> Result<(), PublishError>;
}

/// Publisher that only logs. Used when no topic is configured.
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, checkpoint: &Checkpoint) -> Result<(), PublishError> {
        info!("checkpoint: {}", checkpoint);
        Ok(())
    }
}

/// Publishes by running an external command once per checkpoint.
///
/// The message is `{study}-{hostname}-{checkpoint}`; the tracking service
/// splits it on `-` and reads the role from the last character of the
/// hostname field.
#[derive(Debug, Clone)]
pub struct CommandPublisher {
    program: String,
    args: Vec<String>,
    study: String,
    hostname: String,
}

impl CommandPublisher {
    /// `args` may contain [`MESSAGE_PLACEHOLDER`]; if none does, the
    /// message is appended as the last argument.
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        study: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            study: study.into(),
            hostname: hostname.into(),
        }
    }

    /// `gcloud pubsub topics publish <topic> --message=<message>`.
    pub fn gcloud(topic: &str, study: impl Into<String>, hostname: impl Into<String>) -> Self {
        let args = vec![
            "pubsub".to_string(),
            "topics".to_string(),
            "publish".to_string(),
            topic.to_string(),
            format!("--message={}", MESSAGE_PLACEHOLDER),
        ];
        Self::new(DEFAULT_PUBLISH_PROGRAM, args, study, hostname)
    }

    pub fn message(&self, checkpoint: &Checkpoint) -> String {
        format!("{}-{}-{}", self.study, self.hostname, checkpoint)
    }

    /// Final argument list for one checkpoint.
    pub fn command_args(&self, checkpoint: &Checkpoint) -> Vec<String> {
        let message = self.message(checkpoint);
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                if a.contains(MESSAGE_PLACEHOLDER) {
                    substituted = true;
                    a.replace(MESSAGE_PLACEHOLDER, &message)
                } else {
                    a.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(message);
        }
        args
    }
}

#[async_trait]
impl Publisher for CommandPublisher {
    async fn publish(&self, checkpoint: &Checkpoint) -> Result<(), PublishError> {
        let args = self.command_args(checkpoint);
        debug!("publish: {} {}", self.program, args.join(" "));

        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .await
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(PublishError::Rejected(status.code()))
        }
    }
}

/// Cloneable, infallible front for a [`Publisher`].
#[derive(Clone)]
pub struct Reporter {
    publisher: Arc<dyn Publisher>,
    timeout: Duration,
}

impl Reporter {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher,
            timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Announce a checkpoint. Failures are logged, never returned.
    pub async fn checkpoint(&self, checkpoint: Checkpoint) {
        match tokio::time::timeout(self.timeout, self.publisher.publish(&checkpoint)).await {
            Ok(Ok(())) => debug!("published checkpoint {}", checkpoint),
            Ok(Err(e)) => warn!("failed to publish checkpoint {}: {}", checkpoint, e),
            Err(_) => warn!(
                "publishing checkpoint {} timed out after {}s",
                checkpoint,
                self.timeout.as_secs()
            ),
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
