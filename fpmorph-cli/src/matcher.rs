use std::path::Path;
use std::process::Command;

use fpmorph::{FpMorphError, FpMorphResult, TemplateMatcher};

/// Scores two template files with an external program.
///
/// The program is called as `command args... probe candidate` and must print
/// the score as the last whitespace separated token of its standard output.
#[derive(Debug)]
pub struct ExternalMatcher {
    command: String,
    args: Vec<String>,
}

impl ExternalMatcher {
    pub fn new(command: String, args: Vec<String>) -> Self {
        Self { command, args }
    }
}

fn matcher_error(reason: impl Into<String>) -> FpMorphError {
    FpMorphError::Matcher {
        reason: reason.into(),
    }
}

impl TemplateMatcher for ExternalMatcher {
    fn score(&self, probe: &Path, candidate: &Path) -> FpMorphResult<f64> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(probe)
            .arg(candidate)
            .output()
            .map_err(|err| matcher_error(format!("{}: {err}", self.command)))?;
        if !output.status.success() {
            return Err(matcher_error(format!(
                "{} exited with {}",
                self.command, output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let token = stdout
            .split_whitespace()
            .last()
            .ok_or_else(|| matcher_error("empty output"))?;
        token
            .parse::<f64>()
            .map_err(|_| matcher_error(format!("score `{token}` is not a number")))
    }
}
