use thiserror::Error;

/// Entity kind, used to qualify lookup and duplicate-id errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Library,
    Document,
    Chunk,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Library => write!(f, "library"),
            Entity::Document => write!(f, "document"),
            Entity::Chunk => write!(f, "chunk"),
        }
    }
}

/// Errors that can occur when using the database.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("duplicate {entity} id: {id}")]
    DuplicateId { entity: Entity, id: String },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("zero-norm embedding vector")]
    DegenerateVector,

    #[error("library is not indexed: {0}")]
    NotIndexed(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

/// A specialized Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;
