//! Account Store Errors

/// Errors raised by an account store.
///
/// Every variant describes an environmental fault; none of them is a
/// property of the event being applied.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store could not be reached
    #[error("Account store unavailable: {0}")]
    Unavailable(String),

    /// Commit rejected because of a concurrent modification
    #[error("Commit conflict: {0}")]
    Conflict(String),

    /// The row to update vanished inside the unit of work
    #[error("Account row disappeared during update: {0}")]
    RowMissing(uuid::Uuid),
}

impl StoreError {
    /// Check if this is a serialization/deadlock failure reported by Postgres
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict(_) => true,
            StoreError::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection() {
        assert!(StoreError::Conflict("version".to_string()).is_conflict());
        assert!(!StoreError::Unavailable("down".to_string()).is_conflict());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_conflict());
    }
}
