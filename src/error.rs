use std::time::Duration;

use thiserror::Error;

/// Errors produced by the record store and the user repository.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user {id} not found")]
    NotFound { id: String },

    #[error("{op}: connection failure: {source}")]
    ConnectionFailure {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{op}: no connection within {after:?}")]
    ConnectTimeout { op: &'static str, after: Duration },

    #[error("{op}: query failed: {source}")]
    Query {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to hash password: {message}")]
    Hash { message: String },

    #[error("{op}: deadline of {after:?} exceeded")]
    Timeout { op: &'static str, after: Duration },
}

impl StoreError {
    pub fn connection(op: &'static str, source: sqlx::Error) -> Self {
        Self::ConnectionFailure { op, source }
    }

    pub fn query(op: &'static str, source: sqlx::Error) -> Self {
        Self::Query { op, source }
    }

    /// Sorts a driver error into the connection or the query bucket.
    pub fn from_sqlx(op: &'static str, source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::connection(op, source),
            _ => Self::query(op, source),
        }
    }

    pub fn hash(message: impl Into<String>) -> Self {
        Self::Hash {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for both a failed probe and a connect attempt that ran out of time.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailure { .. } | Self::ConnectTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_id() {
        let err = StoreError::NotFound {
            id: "user-42".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_connection_failure());
        assert_eq!(err.to_string(), "user user-42 not found");
    }

    #[test]
    fn only_not_found_is_not_found() {
        let errors = [
            StoreError::connection("ping", sqlx::Error::PoolClosed),
            StoreError::query("get_all_users", sqlx::Error::RowNotFound),
            StoreError::hash("bad salt"),
            StoreError::Timeout {
                op: "get_user_by_id",
                after: Duration::from_secs(5),
            },
            StoreError::ConnectTimeout {
                op: "connect",
                after: Duration::from_secs(10),
            },
        ];
        for err in errors {
            assert!(!err.is_not_found(), "{err}");
        }
    }

    #[test]
    fn connection_kind_covers_timeouts_on_connect() {
        assert!(StoreError::connection("reconnect", sqlx::Error::PoolTimedOut)
            .is_connection_failure());
        assert!(StoreError::ConnectTimeout {
            op: "reconnect",
            after: Duration::from_secs(10),
        }
        .is_connection_failure());
        assert!(!StoreError::hash("x").is_connection_failure());
    }

    #[test]
    fn driver_errors_are_classified() {
        assert!(StoreError::from_sqlx("get_all_users", sqlx::Error::PoolTimedOut)
            .is_connection_failure());
        assert!(StoreError::from_sqlx("get_all_users", sqlx::Error::PoolClosed)
            .is_connection_failure());
        let err = StoreError::from_sqlx(
            "add_user",
            sqlx::Error::ColumnNotFound("user_id".into()),
        );
        assert!(matches!(err, StoreError::Query { op: "add_user", .. }));
    }

    #[test]
    fn messages_carry_operation_name() {
        let err = StoreError::query("delete_user", sqlx::Error::PoolClosed);
        assert!(err.to_string().starts_with("delete_user: query failed"));
    }
}
