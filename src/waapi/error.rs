use std::fmt;

/// Errors that can occur while talking to the Wwise Authoring API.
#[derive(Debug)]
pub enum WaapiError {
    /// WebSocket connection could not be established.
    Connection(String),

    /// Connection attempt exceeded the configured timeout.
    ConnectionTimeout,

    /// A call did not receive a response within the transport deadline.
    CallTimeout {
        /// The WAAPI URI that timed out.
        uri: String,
    },

    /// Wwise returned an application-level error for a call.
    Waapi {
        /// The WAAPI error URI (e.g. `ak.wwise.query.invalid_arguments`),
        /// when the authoring application supplied one.
        uri: Option<String>,
        /// Human-readable error description.
        message: String,
    },

    /// The WebSocket connection was closed unexpectedly.
    ConnectionClosed,

    /// Failed to make sense of a frame received from the authoring app.
    InvalidResponse(String),

    /// Internal error (transport task died or channel closed).
    Internal(String),
}

impl fmt::Display for WaapiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "WAAPI connection error: {msg}"),
            Self::ConnectionTimeout => write!(f, "WAAPI connection timed out"),
            Self::CallTimeout { uri } => write!(f, "WAAPI call timed out: {uri}"),
            Self::Waapi { uri, message } => match uri {
                Some(uri) => write!(f, "WAAPI error ({uri}): {message}"),
                None => write!(f, "WAAPI error: {message}"),
            },
            Self::ConnectionClosed => write!(f, "WAAPI connection closed"),
            Self::InvalidResponse(msg) => write!(f, "WAAPI invalid response: {msg}"),
            Self::Internal(msg) => write!(f, "WAAPI internal error: {msg}"),
        }
    }
}

impl std::error::Error for WaapiError {}

impl From<WaapiError> for crate::error::AppError {
    fn from(e: WaapiError) -> Self {
        use crate::error::ErrorKind;
        match e {
            WaapiError::CallTimeout { ref uri } => {
                Self::new(ErrorKind::Timeout, e.to_string()).with_operation(uri.clone())
            }
            WaapiError::Waapi { ref uri, ref message } => {
                let err = Self::new(ErrorKind::Call, message.clone());
                match uri {
                    Some(uri) => err.with_operation(uri.clone()),
                    None => err,
                }
            }
            WaapiError::Connection(_)
            | WaapiError::ConnectionTimeout
            | WaapiError::ConnectionClosed => Self::new(ErrorKind::Transport, e.to_string()),
            WaapiError::InvalidResponse(_) | WaapiError::Internal(_) => {
                Self::new(ErrorKind::Internal, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ErrorKind};

    #[test]
    fn display_connection() {
        let err = WaapiError::Connection("refused".into());
        assert_eq!(err.to_string(), "WAAPI connection error: refused");
    }

    #[test]
    fn display_call_timeout() {
        let err = WaapiError::CallTimeout {
            uri: "core.object.get".into(),
        };
        assert_eq!(err.to_string(), "WAAPI call timed out: core.object.get");
    }

    #[test]
    fn display_waapi_with_uri() {
        let err = WaapiError::Waapi {
            uri: Some("ak.wwise.query.invalid_arguments".into()),
            message: "bad waql".into(),
        };
        assert_eq!(
            err.to_string(),
            "WAAPI error (ak.wwise.query.invalid_arguments): bad waql"
        );
    }

    #[test]
    fn display_waapi_without_uri() {
        let err = WaapiError::Waapi {
            uri: None,
            message: "unknown".into(),
        };
        assert_eq!(err.to_string(), "WAAPI error: unknown");
    }

    #[test]
    fn app_error_kind_mapping() {
        let transport: AppError = WaapiError::ConnectionClosed.into();
        assert_eq!(transport.kind, ErrorKind::Transport);

        let timeout: AppError = WaapiError::CallTimeout {
            uri: "core.getInfo".into(),
        }
        .into();
        assert_eq!(timeout.kind, ErrorKind::Timeout);
        assert_eq!(timeout.operation.as_deref(), Some("core.getInfo"));

        let call: AppError = WaapiError::Waapi {
            uri: Some("ak.wwise.query".into()),
            message: "nope".into(),
        }
        .into();
        assert_eq!(call.kind, ErrorKind::Call);
        assert_eq!(call.operation.as_deref(), Some("ak.wwise.query"));
    }
}
