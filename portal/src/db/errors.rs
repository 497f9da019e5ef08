use thiserror::Error;

/// Failures a [`Store`](super::Store) reports to its callers.
///
/// Both store implementations produce the same variants, so handlers never need to know which
/// backend they are talking to.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Entity not found")]
    NotFound,

    /// A row with the same natural key (email, invoice number, gateway id, ...) already exists
    #[error("Duplicate {}", table.as_deref().unwrap_or("row"))]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// The row referenced a missing parent or failed a column check
    #[error("Row rejected by constraint {}", constraint.as_deref().unwrap_or("<unnamed>"))]
    ConstraintRejected { constraint: Option<String>, message: String },

    /// A conditional write found the record in a different state than the caller read it in
    #[error("{entity} {id} was modified concurrently")]
    StaleState { entity: &'static str, id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let sqlx::Error::Database(db_err) = &err else {
            return match err {
                sqlx::Error::RowNotFound => DbError::NotFound,
                other => DbError::Other(other.into()),
            };
        };

        let constraint = db_err.constraint().map(str::to_owned);
        let message = db_err.message().to_owned();
        if db_err.is_unique_violation() {
            DbError::UniqueViolation {
                constraint,
                table: db_err.table().map(str::to_owned),
                message,
            }
        } else if db_err.is_foreign_key_violation() || db_err.is_check_violation() {
            DbError::ConstraintRejected { constraint, message }
        } else {
            DbError::Other(err.into())
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
