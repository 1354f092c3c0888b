#[derive(Debug, thiserror::Error)]
pub enum HmsError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },
    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("invalid value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to serialize value: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize value: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to parse YAML at {path}: {source}")]
    YamlDeserialization {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("text error: {0}")]
    Text(#[from] hms_types::TextError),
}

impl HmsError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field name carried by validation-type errors, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } | Self::InvalidEnum { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type HmsResult<T> = std::result::Result<T, HmsError>;

/// Attaches a field name to a `TextError` raised while validating request input.
pub(crate) fn text_field<T>(
    field: &str,
    res: Result<T, hms_types::TextError>,
) -> HmsResult<T> {
    res.map_err(|e| HmsError::validation(field, e.to_string()))
}
