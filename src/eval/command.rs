//! Evaluation through an external program, typically an LLM CLI.

use crate::command::CommandSpec;
use crate::error::{Result, VivaError};
use crate::eval::evaluator::{Evaluation, Evaluator, parse_evaluation, render_prompt};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// Sends the grading prompt on stdin and parses stdout as the evaluation.
pub struct CommandEvaluator {
    spec: CommandSpec,
}

impl CommandEvaluator {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Evaluator for CommandEvaluator {
    async fn evaluate(&self, role: &str, question: &str, answer: &str) -> Result<Evaluation> {
        let prompt = render_prompt(role, question, answer);
        let mut child = self
            .spec
            .to_tokio_command(&[])
            .spawn()
            .map_err(|e| VivaError::Evaluation {
                message: format!("Failed to start {}: {e}", self.spec.program()),
            })?;

        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(prompt.as_bytes()).await
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(VivaError::Evaluation {
                message: format!("Failed to send prompt to {}: {e}", self.spec.program()),
            });
        }

        let stdout = self
            .spec
            .check_output(child.wait_with_output().await)
            .map_err(|message| VivaError::Evaluation { message })?;
        Ok(parse_evaluation(&String::from_utf8_lossy(&stdout)))
    }

    fn name(&self) -> &str {
        self.spec.program()
    }
}
