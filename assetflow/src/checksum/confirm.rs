//! Sources of operator confirmation for checksum drift.

use crate::errors::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;

/// Asks whether a checksum mismatch should be accepted.
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// Returns true only on an explicit affirmative answer.
    async fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Returns true for answers that count as an explicit "yes".
#[must_use]
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Rejects every confirmation; used in CI.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoReject;

#[async_trait]
impl ConfirmationSource for AutoReject {
    async fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Where an interactive answer comes from.
pub trait ConsoleInput: Send + Sync {
    /// Returns true if a person can answer, i.e. the input is a terminal.
    fn is_terminal(&self) -> bool;

    /// Shows `prompt` and blocks until one line is read.
    fn ask(&self, prompt: &str) -> std::io::Result<String>;
}

/// The process's stdin, prompting on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConsole;

impl ConsoleInput for StdinConsole {
    fn is_terminal(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn ask(&self, prompt: &str) -> std::io::Result<String> {
        let mut stderr = std::io::stderr().lock();
        write!(stderr, "{prompt} [y/N] ")?;
        stderr.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    }
}

/// Prompts a person and reads one line of answer.
///
/// When the input is not a terminal the answer is negative without reading.
#[derive(Clone)]
pub struct InteractiveConsole {
    input: Arc<dyn ConsoleInput>,
}

impl InteractiveConsole {
    /// Creates a console reading from the process's stdin.
    #[must_use]
    pub fn new() -> Self {
        Self::with_input(Arc::new(StdinConsole))
    }

    /// Creates a console reading from `input`.
    #[must_use]
    pub fn with_input(input: Arc<dyn ConsoleInput>) -> Self {
        Self { input }
    }
}

impl Default for InteractiveConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InteractiveConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveConsole").finish_non_exhaustive()
    }
}

#[async_trait]
impl ConfirmationSource for InteractiveConsole {
    async fn confirm(&self, prompt: &str) -> Result<bool> {
        if !self.input.is_terminal() {
            tracing::warn!("No terminal on stdin, treating confirmation as rejected");
            return Ok(false);
        }

        let input = Arc::clone(&self.input);
        let prompt = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || input.ask(&prompt))
            .await
            .map_err(std::io::Error::other)??;

        Ok(is_affirmative(&answer))
    }
}

/// Answers confirmations from a fixed script, for tests and automation.
///
/// Once the script runs out every answer is negative.
#[derive(Debug, Default)]
pub struct ScriptedConfirmation {
    answers: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmation {
    /// Creates a source that gives `answers` in order.
    #[must_use]
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Returns every prompt shown so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ConfirmationSource for ScriptedConfirmation {
    async fn confirm(&self, prompt: &str) -> Result<bool> {
        self.prompts.lock().push(prompt.to_string());
        let answer = self.answers.lock().pop_front().unwrap_or_default();
        Ok(is_affirmative(&answer))
    }
}
