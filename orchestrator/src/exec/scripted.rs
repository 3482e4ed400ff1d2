//! In-memory command runner that replays scripted responses

use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::exec::command::{CommandOutput, CommandRunner, CommandSpec};

/// Records every invocation and answers from a list of rules
///
/// A rule matches when its pattern is a substring of the rendered command
/// line. The first matching rule wins; unmatched commands succeed with
/// empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `pattern` with `output`
    pub fn respond(self, pattern: &str, output: CommandOutput) -> Self {
        self.push_rule(pattern, output);
        self
    }

    /// Make commands containing `pattern` exit with code 1
    pub fn fail(self, pattern: &str, stderr: &str) -> Self {
        self.respond(pattern, CommandOutput::failed(1, stderr))
    }

    /// Make commands containing `pattern` print `stdout`
    pub fn stdout(self, pattern: &str, stdout: &str) -> Self {
        self.respond(pattern, CommandOutput::ok(stdout))
    }

    /// Add a rule after construction
    pub fn push_rule(&self, pattern: &str, output: CommandOutput) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push((pattern.to_string(), output));
        }
    }

    /// Command lines seen so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of invocations containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    /// Position of the first invocation containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.contains(pattern))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError> {
        let line = spec.to_string();

        self.calls
            .lock()
            .map_err(|e| DeployError::Internal(e.to_string()))?
            .push(line.clone());

        let rules = self
            .rules
            .lock()
            .map_err(|e| DeployError::Internal(e.to_string()))?;

        Ok(rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}
