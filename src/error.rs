use std::path::PathBuf;
use thiserror::Error;

/// Structural defect in a simple chart description. Never reaches the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Structural defect in a Vega-Lite spec. Never reaches the compiler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct VegaValidationError {
    pub message: String,
}

impl VegaValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Every way a tool call can fail.
#[derive(Error, Debug)]
pub enum ChartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    VegaValidation(#[from] VegaValidationError),
    /// A structurally plausible spec the compiler still rejects.
    #[error("Vega-Lite compilation failed: {0}")]
    Compilation(String),
    #[error("{0:#}")]
    Render(#[from] anyhow::Error),
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),
    #[error("Failed to save chart to {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChartError {
    /// Short tag used in log lines.
    pub fn category(&self) -> &'static str {
        match self {
            ChartError::Validation(_) | ChartError::VegaValidation(_) => "validation",
            ChartError::Compilation(_) => "compilation",
            ChartError::Render(_) => "render",
            ChartError::InvalidArguments(_) => "arguments",
            ChartError::Save { .. } => "save",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_verbatim() {
        let err: ChartError = ValidationError::new("At least one dataset is required.").into();
        assert_eq!(err.to_string(), "At least one dataset is required.");
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_compilation_prefix() {
        let err = ChartError::Compilation("Invalid mark type \"foo\"".to_string());
        assert_eq!(
            err.to_string(),
            "Vega-Lite compilation failed: Invalid mark type \"foo\""
        );
    }

    #[test]
    fn test_render_shows_context_chain() {
        let inner = anyhow::anyhow!("backend exploded").context("Failed to draw mesh");
        let err = ChartError::from(inner);
        assert_eq!(err.to_string(), "Failed to draw mesh: backend exploded");
    }
}
