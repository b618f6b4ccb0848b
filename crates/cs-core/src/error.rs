use thiserror::Error;

/// Errors raised while reconciling incoming data with the canvas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Invalid graph data: {0}")]
    InvalidGraph(String),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    /// A programmer error: an argument failed validation. `value` is the
    /// offending value's debug form.
    #[error("Invalid argument `{name}`: {value}")]
    InvalidArgument { name: &'static str, value: String },

    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Connector template '{0}' not found")]
    ConnectorTemplateNotFound(String),

    #[error("Row {row} has no value in column '{column}'")]
    MissingColumn { row: usize, column: String },

    /// The canvas rejected a call.
    #[error("Canvas {op} failed: {message}")]
    Canvas { op: &'static str, message: String },

    #[error("Canvas is not initialized")]
    NotInitialized,

    #[error("Layout failed: {0}")]
    Layout(String),

    #[error("Layout worker is no longer running")]
    WorkerClosed,
}

impl SyncError {
    pub fn invalid_argument(name: &'static str, value: impl std::fmt::Debug) -> Self {
        SyncError::InvalidArgument {
            name,
            value: format!("{value:?}"),
        }
    }

    pub fn canvas(op: &'static str, message: impl Into<String>) -> Self {
        SyncError::Canvas {
            op,
            message: message.into(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
