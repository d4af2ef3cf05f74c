use thiserror::Error;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("The following resources do not exist: {}", .0.join(", "))]
    UnknownResources(Vec<String>),
    #[error("Requested resources are not available yet")]
    NotSatisfiable,
    #[error("Expression error: {0}")]
    Expression(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Error: {0}")]
    Generic(String),
}

impl From<toml::de::Error> for LockError {
    fn from(error: toml::de::Error) -> Self {
        Self::Deserialization(error.to_string())
    }
}

impl From<std::io::Error> for LockError {
    fn from(error: std::io::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<String> for LockError {
    fn from(e: String) -> Self {
        Self::Generic(e)
    }
}

impl From<&str> for LockError {
    fn from(e: &str) -> Self {
        Self::Generic(e.to_string())
    }
}

pub fn validation_error<T>(message: impl Into<String>) -> crate::Result<T> {
    Err(LockError::Validation(message.into()))
}
