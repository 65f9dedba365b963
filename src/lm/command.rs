//! Local LM command backend.
//!
//! The configured command is split with shell quoting rules, the prompt is
//! written to its stdin and its stdout is the answer. This keeps provider
//! choice, caching and credentials outside the service.
use super::ModelQuery;
use crate::util::truncate_string;
use anyhow::{anyhow, Context, Result};
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::time::Instant;

const STDERR_BYTES: usize = 500;

#[derive(Debug, Clone)]
pub struct CommandClient {
    argv: Vec<String>,
}

impl CommandClient {
    pub fn new(command: &str) -> Result<Self> {
        let argv = parse_command(command)?;
        Ok(Self { argv })
    }

    /// The executable the command starts with.
    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

/// Split an LM command line into argv, rejecting empty commands.
pub(crate) fn parse_command(command: &str) -> Result<Vec<String>> {
    let argv =
        shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
    if argv.is_empty() {
        return Err(anyhow!("LM command is empty"));
    }
    Ok(argv)
}

impl ModelQuery for CommandClient {
    fn query(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn LM command: {}", self.argv[0]))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command may exit without reading stdin; its status decides.
            if let Err(e) = stdin.write_all(prompt.as_bytes()) {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(e).context("write prompt to LM stdin");
                }
            }
        }

        let output = child.wait_with_output().context("wait for LM command")?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::debug!(
            elapsed_ms,
            prompt_bytes = prompt.len(),
            response_bytes = output.stdout.len(),
            "lm command complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "LM command failed with status {}: {}",
                output.status,
                truncate_string(stderr.trim(), STDERR_BYTES)
            ));
        }

        let stdout = String::from_utf8(output.stdout).context("decode LM stdout as UTF-8")?;
        Ok(stdout.trim().to_string())
    }
}
