use thiserror::Error;

/// Failure talking to the hosted backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("unexpected response from server: {0}")]
    Decode(String),
    #[error("not signed in")]
    NotSignedIn,
}

impl BackendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Lowercased message plus error code, for substring classification.
    fn haystack(&self) -> String {
        match self {
            BackendError::Status { code, message, .. } => {
                format!("{} {}", code.as_deref().unwrap_or_default(), message).to_lowercase()
            }
            other => other.to_string().to_lowercase(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        let text = self.haystack();
        self.status() == Some(429)
            || text.contains("rate limit")
            || text.contains("too many requests")
            || text.contains("over_request_rate_limit")
            || text.contains("over_email_send_rate_limit")
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// Session operation failure, with `Display` as the user-facing text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Too many attempts. Please wait a moment and try again.")]
    RateLimited,
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("An account with this email already exists.")]
    AlreadyRegistered,
    #[error("Please confirm your email address before signing in.")]
    EmailNotConfirmed,
    #[error("Could not reach the server. Check your connection and try again.")]
    Network,
    #[error("{0}")]
    Backend(String),
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        if err.is_rate_limited() {
            return AuthError::RateLimited;
        }
        let text = err.haystack();
        if text.contains("invalid login credentials")
            || text.contains("invalid_credentials")
            || text.contains("invalid_grant")
        {
            AuthError::InvalidCredentials
        } else if text.contains("already registered")
            || text.contains("already been registered")
            || text.contains("user_already_exists")
        {
            AuthError::AlreadyRegistered
        } else if text.contains("email not confirmed") || text.contains("email_not_confirmed") {
            AuthError::EmailNotConfirmed
        } else {
            match err {
                BackendError::Network(_) => AuthError::Network,
                other => AuthError::Backend(other.to_string()),
            }
        }
    }
}

/// Document store operation failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("You need to be signed in to do that.")]
    NotSignedIn,
    #[error("No document is selected.")]
    NoDocument,
    #[error("Document not found.")]
    NotFound,
    #[error("The document could not be deleted.")]
    DeleteRejected,
    #[error(transparent)]
    Backend(#[from] BackendError),
}
