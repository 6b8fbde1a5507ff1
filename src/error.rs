use std::fmt;

use thiserror::Error;

/// Failure raised by user code while it was being evaluated.
///
/// Carries the message plus the call trace collected while the failure
/// unwound, innermost frame first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    message: String,
    trace: Vec<String>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Vec::new(),
        }
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn trace(&self) -> &[String] {
        &self.trace
    }
    // Called once per unwound frame.
    pub fn within(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }
    /// Renders the message followed by the call trace, outermost call first.
    pub fn formatted(&self) -> String {
        let mut text = String::new();
        if !self.trace.is_empty() {
            text.push_str("Trace (most recent call last):\n");
            for frame in self.trace.iter().rev() {
                text.push_str("  ");
                text.push_str(frame);
                text.push('\n');
            }
        }
        text.push_str(&self.message);
        text
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

#[derive(Error, Debug)]
pub enum LiveloadError {
    #[error("Evaluation failed: {0}")]
    Eval(#[from] EvalError),
    #[error("Context \"{0}\" not found")]
    ContextNotFound(String),
    #[error("Remote control is already listening on {0}")]
    AlreadyListening(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("The executor is no longer running")]
    ExecutorGone,
}

pub type Result<T> = std::result::Result<T, LiveloadError>;

// Helper conversions
impl From<config::ConfigError> for LiveloadError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_lists_outermost_frame_first() {
        let err = EvalError::new("NameError: name 'x' is not defined")
            .within("in inner (foo)")
            .within("in outer (foo)");
        let text = err.formatted();
        let outer = text.find("in outer").expect("outer frame");
        let inner = text.find("in inner").expect("inner frame");
        assert!(outer < inner);
        assert!(text.ends_with("NameError: name 'x' is not defined"));
    }

    #[test]
    fn formatted_without_trace_is_the_message() {
        assert_eq!(EvalError::new("boom").formatted(), "boom");
    }
}
