//! External command invocation for the command-backed collaborators.
//!
//! Commands are configured as argv arrays (`["piper", "--model", "en.onnx"]`)
//! so no shell parsing is involved. Arguments may contain `{name}`
//! placeholders that are substituted per call.

use crate::error::{Result, VivaError};
use serde::{Deserialize, Serialize};
use std::process::{Command, Output, Stdio};

/// Program plus argument template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// True if any argument references `{name}`.
    pub fn uses(&self, name: &str) -> bool {
        let needle = format!("{{{name}}}");
        self.args.iter().any(|arg| arg.contains(&needle))
    }

    /// Arguments with every `{name}` replaced by its value.
    pub fn render_args(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{name}}}"), value)
                })
            })
            .collect()
    }

    /// Blocking `std::process::Command` with rendered arguments.
    pub fn to_command(&self, vars: &[(&str, &str)]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.render_args(vars))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Async `tokio::process::Command`, killed if the future is dropped.
    pub fn to_tokio_command(&self, vars: &[(&str, &str)]) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(self.render_args(vars))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Checks the exit status and returns stdout, or a message naming the program.
    pub fn check_output(
        &self,
        output: std::io::Result<Output>,
    ) -> std::result::Result<Vec<u8>, String> {
        let output = output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                format!("{} not found in PATH", self.program)
            } else {
                format!("Failed to execute {}: {e}", self.program)
            }
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} failed with status {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            ));
        }
        Ok(output.stdout)
    }
}

impl TryFrom<Vec<String>> for CommandSpec {
    type Error = VivaError;

    fn try_from(mut argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(VivaError::ConfigInvalidValue {
                key: "commands".to_string(),
                message: "command must name a program".to_string(),
            });
        }
        let program = argv.remove(0);
        Ok(Self {
            program,
            args: argv,
        })
    }
}

impl From<CommandSpec> for Vec<String> {
    fn from(spec: CommandSpec) -> Self {
        std::iter::once(spec.program).chain(spec.args).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_placeholders() {
        let spec = CommandSpec::new("stt", &["-f", "{input}", "--lang={lang}"]);
        assert!(spec.uses("input"));
        assert!(!spec.uses("text"));
        let args = spec.render_args(&[("input", "/tmp/a.wav"), ("lang", "en")]);
        assert_eq!(args, ["-f", "/tmp/a.wav", "--lang=en"]);
    }

    #[test]
    fn test_deserialize_from_toml_array() {
        #[derive(Deserialize)]
        struct Wrapper {
            cmd: CommandSpec,
        }
        let wrapper: Wrapper = toml::from_str(r#"cmd = ["piper", "--model", "en.onnx"]"#).unwrap();
        assert_eq!(wrapper.cmd.program(), "piper");
        assert_eq!(wrapper.cmd.render_args(&[]), ["--model", "en.onnx"]);
    }

    #[test]
    fn test_empty_argv_is_rejected() {
        assert!(CommandSpec::try_from(Vec::new()).is_err());
        assert!(CommandSpec::try_from(vec![" ".to_string()]).is_err());
    }

    #[test]
    fn test_check_output_reports_missing_program() {
        let spec = CommandSpec::new("definitely-not-a-real-program-viva", &[]);
        let output = spec.to_command(&[]).output();
        let err = spec.check_output(output).unwrap_err();
        assert!(err.contains("not found"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_check_output_returns_stdout() {
        let spec = CommandSpec::new("echo", &["{word}"]);
        let stdout = spec
            .check_output(spec.to_command(&[("word", "hello")]).output())
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&stdout).trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_check_output_reports_failure_status() {
        let spec = CommandSpec::new("false", &[]);
        let output = spec.to_command(&[]).output();
        let err = spec.check_output(output).unwrap_err();
        assert!(err.contains("false failed"), "{err}");
    }
}
