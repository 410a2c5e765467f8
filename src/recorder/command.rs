//! Recording backend that shells out to external commands.
//!
//! Pairs well with CLI remotes for the broadcasting software, e.g.
//! `["obs-cmd", "recording", "start"]` / `["obs-cmd", "recording", "stop"]`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use super::backend::{ConnectionError, RecordingBackend};

#[derive(Debug, Clone)]
pub struct CommandBackend {
    begin: Vec<String>,
    end: Vec<String>,
}

impl CommandBackend {
    pub fn new(begin: Vec<String>, end: Vec<String>) -> Result<Self> {
        if begin.is_empty() || end.is_empty() {
            bail!("both begin and end commands must be configured");
        }
        Ok(Self { begin, end })
    }

    async fn invoke(argv: &[String]) -> Result<(), ConnectionError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ConnectionError::Unreachable("empty command".into()))?;

        debug!("running recorder command {argv:?}");
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ConnectionError::Unreachable(format!("failed to spawn {program}: {err}")))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(ConnectionError::Rejected(format!(
                "{program} exited with {}: {stderr}",
                output.status
            )))
        }
    }
}

#[async_trait]
impl RecordingBackend for CommandBackend {
    async fn begin(&self) -> Result<(), ConnectionError> {
        Self::invoke(&self.begin).await
    }

    async fn end(&self) -> Result<(), ConnectionError> {
        Self::invoke(&self.end).await
    }

    fn name(&self) -> &str {
        "command"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_missing_commands() {
        assert!(CommandBackend::new(vec![], argv(&["true"])).is_err());
        assert!(CommandBackend::new(argv(&["true"]), vec![]).is_err());
    }

    #[tokio::test]
    async fn successful_commands_succeed() {
        let backend = CommandBackend::new(argv(&["true"]), argv(&["true"])).unwrap();
        assert!(backend.begin().await.is_ok());
        assert!(backend.end().await.is_ok());
    }

    #[tokio::test]
    async fn non_zero_exit_is_rejected() {
        let backend = CommandBackend::new(argv(&["false"]), argv(&["true"])).unwrap();
        assert!(matches!(backend.begin().await, Err(ConnectionError::Rejected(_))));
    }

    #[tokio::test]
    async fn missing_program_is_unreachable() {
        let backend =
            CommandBackend::new(argv(&["clipwatch-no-such-binary"]), argv(&["true"])).unwrap();
        assert!(matches!(backend.begin().await, Err(ConnectionError::Unreachable(_))));
    }
}
