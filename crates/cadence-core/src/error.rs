use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Invalid arguments: {}", .0.join("; "))]
    InvalidArguments(Vec<String>),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unexpected state: {0}")]
    Unexpected(String),
}

impl CoreError {
    /// Single-message convenience constructor for `InvalidArguments`.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        CoreError::InvalidArguments(vec![message.into()])
    }

    /// Stable code for the transport boundary. Infrastructure failures and
    /// data-corruption signals all surface as `unexpected`; the transport
    /// layer maps these codes to its own error vocabulary.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidArguments(_) => "invalid_arguments",
            CoreError::ResourceNotFound(_) => "arguments_associated_resources_not_found",
            CoreError::Unauthorized(_) => "unauthorized_action_on_arguments_associated_resources",
            CoreError::Database(_)
            | CoreError::Migration(_)
            | CoreError::Io(_)
            | CoreError::Unexpected(_) => "unexpected",
        }
    }
}
