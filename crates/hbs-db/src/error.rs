//! Gateway errors and structured failure classification

use thiserror::Error;

/// Structured classification of a database failure
///
/// Replaces message-string matching: the driver assigns a kind when it maps
/// its native error, and the gateway's retry decision looks only at
/// [`DbErrorKind::is_connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Socket or backend closed underneath us
    ConnectionClosed,
    /// Connection reset / broken mid-statement
    ConnectionReset,
    /// Statement or connection timed out
    Timeout,
    /// Authentication failure
    LoginFailed,
    /// The statement itself was rejected
    Query,
    /// Anything else
    Other,
}

impl DbErrorKind {
    /// Whether this kind triggers the gateway's reconnect-and-retry
    pub fn is_connection(self) -> bool {
        matches!(
            self,
            DbErrorKind::ConnectionClosed
                | DbErrorKind::ConnectionReset
                | DbErrorKind::Timeout
                | DbErrorKind::LoginFailed
        )
    }
}

/// Errors produced by the database gateway
#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error ({kind:?}): {message}")]
    Driver { kind: DbErrorKind, message: String },

    #[error("gateway is not connected")]
    NotConnected,

    #[error("statement with RETURNING clause yielded no rows")]
    NoRowsReturned,

    #[error("column {column} is missing or has an unexpected type")]
    ColumnType { column: String },
}

impl DbError {
    pub fn driver(kind: DbErrorKind, message: impl Into<String>) -> Self {
        DbError::Driver {
            kind,
            message: message.into(),
        }
    }

    /// The failure classification for retry decisions
    pub fn kind(&self) -> DbErrorKind {
        match self {
            DbError::Driver { kind, .. } => *kind,
            DbError::NotConnected => DbErrorKind::ConnectionClosed,
            _ => DbErrorKind::Other,
        }
    }
}
