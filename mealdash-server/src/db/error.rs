//! Repository error type

use mealdash_core::ValidationError;

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    /// Unique or conditional-update conflict
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored value no longer parses into its domain type
    #[error("corrupt {column} value '{value}'")]
    Corrupt { column: &'static str, value: String },

    /// Input refused by a check made inside the transaction
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// State change the business rules do not allow
    #[error("{0}")]
    Rejected(String),
}

impl DbError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Map a unique-violation to `Conflict`, pass everything else through.
    pub fn on_unique(e: sqlx::Error, message: &str) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(message.to_owned()),
            _ => Self::Sqlx(e),
        }
    }
}

/// Parse a stored enum column, reporting a corrupt row instead of panicking.
pub(crate) fn parse_column<T>(column: &'static str, value: &str) -> Result<T, DbError>
where
    T: std::str::FromStr<Err = ValidationError>,
{
    value.parse().map_err(|_| DbError::Corrupt {
        column,
        value: value.to_owned(),
    })
}
