//! Error types for ussd-menu

use thiserror::Error;

/// Menu error type
#[derive(Debug, Error)]
pub enum MenuError {
    /// The definition is inconsistent (dangling target, unknown symbol...)
    #[error("invalid menu definition: {0}")]
    Definition(String),

    /// The definition file is not valid TOML for the expected schema
    #[error("menu parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The definition file could not be read
    #[error("menu io error: {0}")]
    Io(#[from] std::io::Error),

    /// The session points at a node the definition does not have
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Storage or handler failure
    #[error(transparent)]
    Core(#[from] ussd_core::Error),
}

impl From<MenuError> for ussd_core::Error {
    fn from(err: MenuError) -> Self {
        match err {
            MenuError::Core(inner) => inner,
            other => ussd_core::Error::Interpreter(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MenuError>;
