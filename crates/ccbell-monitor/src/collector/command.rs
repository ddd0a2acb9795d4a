//! Collector backed by an external command

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Snapshot;

use super::parser::{LineParser, OutputParser};
use super::Collector;

/// Runs a program on every poll and parses its stdout.
///
/// The child is killed when the collection future is dropped, so the
/// monitor's timeout and cancellation never leave stray processes behind.
pub struct CommandCollector {
    domain: String,
    program: String,
    args: Vec<String>,
    parser: Arc<dyn OutputParser>,
}

impl CommandCollector {
    /// Create a collector using the line protocol parser
    pub fn new(domain: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            domain: domain.into(),
            program: program.into(),
            args,
            parser: Arc::new(LineParser),
        }
    }

    /// Create a collector from a `[program, args...]` vector
    pub fn from_command(domain: impl Into<String>, command: &[String]) -> Result<Self> {
        let domain = domain.into();
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::config("empty collector command").for_monitor(&domain))?;
        Ok(Self::new(domain, program.clone(), args.to_vec()))
    }

    /// Replace the output parser
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.parser = parser;
        self
    }

    async fn run(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::collection(&self.domain, format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::collection(
                &self.domain,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| Error::collection(&self.domain, "output is not valid UTF-8"))
    }
}

#[async_trait]
impl Collector for CommandCollector {
    async fn snapshot(&self, cancel: &CancellationToken) -> Result<Snapshot> {
        let stdout = tokio::select! {
            result = self.run() => result?,
            _ = cancel.cancelled() => {
                return Err(Error::collection(&self.domain, "cancelled"));
            }
        };

        let snapshot = self
            .parser
            .parse(&stdout)
            .map_err(|e| Error::collection(&self.domain, e))?;

        debug!(domain = %self.domain, entities = snapshot.len(), "Command collection complete");
        Ok(snapshot)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(domain: &str, script: &str) -> CommandCollector {
        CommandCollector::new(domain, "sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_parses_command_output() {
        let collector = sh("usb", "printf 'sdb connected\\nsdc connected +removable\\n'");
        let snapshot = collector.snapshot(&CancellationToken::new()).await.unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_collection_failure() {
        let collector = sh("usb", "echo boom >&2; exit 3");
        let err = collector.snapshot(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_collection());
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_program_is_collection_failure() {
        let collector = CommandCollector::new("smart", "/nonexistent/smartctl-xyz", vec![]);
        let err = collector.snapshot(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_collection());
    }

    #[tokio::test]
    async fn test_unparsable_output_is_collection_failure() {
        let collector = sh("usb", "echo lonely-token");
        let err = collector.snapshot(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_collection());
    }

    #[tokio::test]
    async fn test_cancellation_completes_promptly() {
        let collector = sh("slow", "sleep 30");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = std::time::Instant::now();
        let err = collector.snapshot(&cancel).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_from_command_requires_program() {
        assert!(CommandCollector::from_command("disk", &[]).is_err());
        assert!(CommandCollector::from_command("disk", &["df".to_string()]).is_ok());
    }
}
