use thiserror::Error;

/// Failures raised by a vendor client and propagated to the provider's
/// caller. No retries happen at this layer; retry policy belongs to the
/// caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VendorError {
    #[error("vendor request failed with status {status}: {message}")]
    Transport { status: u16, message: String },
    #[error("vendor request failed: {0}")]
    Request(String),
    #[error("malformed vendor response: {0}")]
    MalformedResponse(String),
    #[error("invalid quantity `{0}`: expected a non-negative integer")]
    InvalidQuantity(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl VendorError {
    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        Self::Transport { status, message: message.into() }
    }

    /// HTTP status of the failed request, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failures inside the browser session manager.
///
/// `Script` is the per-item recoverable case: the in-page loop catches it,
/// logs it, and continues. The rest are hard failures for the current
/// operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("browser script failed: {0}")]
    Script(String),
    #[error("browser engine failure: {0}")]
    Engine(String),
    #[error("browser session is not open")]
    NotOpen,
}

/// A failure inside the interactive login flow. Always caught at the
/// provider boundary: `authorize()` never raises to its caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("authorization failed: {0}")]
pub struct AuthError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_carries_status() {
        let err = VendorError::transport(401, "token rejected");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "vendor request failed with status 401: token rejected");
    }

    #[test]
    fn non_transport_errors_have_no_status() {
        assert_eq!(VendorError::Request("connection refused".into()).status(), None);
        assert_eq!(VendorError::from(SessionError::NotOpen).status(), None);
    }
}
