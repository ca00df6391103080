//! Structured errors for the disscache service.
//!
//! Every failure of a request ends up as a response; this type carries what
//! is needed to build it.

use disscache_core::Error;

/// Why a request could not be answered normally.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The service refused the request itself.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The response cache or one of its collaborators failed.
    #[error(transparent)]
    Cache(#[from] Error),
}

impl ServiceError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        ServiceError::Rejected { status, message: message.into() }
    }

    /// Status of the error response, always within 400..=499 or 500.
    pub fn status_code(&self) -> u16 {
        let status = match self {
            ServiceError::Rejected { status, .. } => *status,
            ServiceError::Cache(err) => err.status_code(),
        };
        if (400..500).contains(&status) { status } else { 500 }
    }

    /// Expected, client-facing outcome whose message may be shown as is.
    pub fn is_ordinary(&self) -> bool {
        match self {
            ServiceError::Rejected { .. } => true,
            ServiceError::Cache(err) => err.is_ordinary(),
        }
    }

    /// Message shown to the client for ordinary failures.
    pub fn client_message(&self) -> String {
        match self {
            ServiceError::Cache(Error::Compute { error, .. }) => error.message.clone(),
            other => other.to_string(),
        }
    }

    /// Key an error response should be cached under, if it should be at all.
    ///
    /// Only deliberate answers of the compute step qualify; server-side
    /// failures are transient.
    pub fn response_key(&self) -> Option<&str> {
        match self {
            ServiceError::Cache(Error::Compute { response_key, error }) if !error.is_server_error() => {
                Some(response_key)
            }
            _ => None,
        }
    }
}
