//! Error types for the plugin runtime.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or running a plugin script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The plugin has no script path or inline source.
    #[error("no script source configured")]
    MissingSource,

    /// The script file could not be read.
    #[error("failed to read script {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create the sandboxed Lua state.
    #[error("failed to create script runtime: {0}")]
    RuntimeCreation(String),

    /// The script does not parse.
    #[error("failed to compile script: {0}")]
    Compilation(String),

    /// The script raised an error while running.
    #[error("script raised an error: {0}")]
    Runtime(String),
}

impl ScriptError {
    /// Whether the plugin never got as far as running.
    pub fn is_load_error(&self) -> bool {
        !matches!(self, ScriptError::Runtime(_))
    }

    /// Short label used in metrics and logs.
    pub fn outcome(&self) -> &'static str {
        if self.is_load_error() {
            "load_error"
        } else {
            "runtime_error"
        }
    }
}

/// Errors from the plugin registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No plugin is registered under this name.
    #[error("webhook plugin not found: {0}")]
    NotFound(String),
}

/// A configuration record that was rejected and skipped.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("webhook #{index} is missing 'name'")]
    MissingName { index: usize },

    #[error("webhook '{name}' sets both 'file' and 'script'")]
    AmbiguousSource { name: String },

    #[error("webhook #{index} is malformed: {reason}")]
    Malformed { index: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_outcomes() {
        assert!(ScriptError::MissingSource.is_load_error());
        assert!(ScriptError::Compilation("x".into()).is_load_error());
        assert!(!ScriptError::Runtime("x".into()).is_load_error());
        assert_eq!(ScriptError::Runtime("x".into()).outcome(), "runtime_error");
        assert_eq!(ScriptError::MissingSource.outcome(), "load_error");
    }
}
