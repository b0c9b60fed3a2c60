use thiserror::Error;

use crate::{connection::ConnectionId, message::ErrorBody};

/// Failure of an `authenticate` or `register` call.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login '{0}' not found")]
    NotFound(String),
    #[error("invalid password")]
    PasswordInvalid,
    #[error("login '{0}' already exists")]
    AlreadyExists(String),
    #[error("login and password must not be empty")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("credential store failed: {0}")]
    Store(#[from] StoreError),
    #[error("registration queue is closed")]
    QueueClosed,
}

impl AuthError {
    /// Failures caused by the caller's input rather than by the server.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::NotFound(_)
                | AuthError::PasswordInvalid
                | AuthError::AlreadyExists(_)
                | AuthError::InvalidCredentials
        )
    }

    pub fn wire(&self) -> ErrorBody {
        let (name, code) = match self {
            AuthError::NotFound(_) => ("AuthenticationFailed", "NOT_FOUND"),
            AuthError::PasswordInvalid => ("AuthenticationFailed", "PASSWORD_INVALID"),
            AuthError::AlreadyExists(_) => ("AlreadyExists", "ALREADY_EXISTS"),
            AuthError::InvalidCredentials => ("InvalidCredentials", "INVALID_INPUT"),
            AuthError::Hashing(_) | AuthError::Store(_) | AuthError::QueueClosed => {
                ("InternalError", "INTERNAL")
            }
        };
        // Internal details stay in the server log.
        let message = if self.is_rejection() {
            self.to_string()
        } else {
            "internal server error".to_string()
        };

        ErrorBody {
            name: name.to_string(),
            code: code.to_string(),
            message,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("connection {0} is not logged in")]
    Unauthenticated(ConnectionId),
    #[error("connection {0} is closed")]
    UnknownConnection(ConnectionId),
}
