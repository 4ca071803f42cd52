use thiserror::Error;

/// Status handed back for a register/unregister call that never reached the
/// daemon. The daemon itself only answers `0` (accepted) or `-1` (rejected).
pub const TRANSPORT_ERROR_STATUS: i32 = -2;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The bus proxy could not be resolved. Permanent for the client that hit it.
    #[error("GameMode proxy unavailable: {0}")]
    ProxyUnavailable(String),

    #[error("GameMode client is not connected")]
    NotConnected,

    #[error("{method} failed: {source}")]
    MethodInvocationFailed {
        method: &'static str,
        #[source]
        source: zbus::Error,
    },

    #[error("Could not subscribe to {channel}: {message}")]
    SubscriptionFailed {
        channel: &'static str,
        message: String,
    },

    #[error("Could not resolve process name for PID {pid}: {message}")]
    NameResolutionFailed { pid: i32, message: String },
}

impl ClientError {
    /// Status code equivalent of this error for callers that expect the
    /// daemon's integer protocol. Every local failure maps to the sentinel.
    pub fn status_code(&self) -> i32 {
        TRANSPORT_ERROR_STATUS
    }

    pub(crate) fn method(method: &'static str, source: zbus::Error) -> Self {
        Self::MethodInvocationFailed { method, source }
    }

    pub(crate) fn subscription(channel: &'static str, err: impl std::fmt::Display) -> Self {
        Self::SubscriptionFailed {
            channel,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_maps_to_the_transport_sentinel() {
        let errors = [
            ClientError::ProxyUnavailable("no session bus".into()),
            ClientError::NotConnected,
            ClientError::method("RegisterGame", zbus::Error::Failure("timeout".into())),
            ClientError::NameResolutionFailed {
                pid: 7,
                message: "gone".into(),
            },
        ];
        for err in errors {
            assert_eq!(err.status_code(), TRANSPORT_ERROR_STATUS);
        }
    }

    #[test]
    fn sentinel_is_outside_daemon_status_range() {
        assert_ne!(TRANSPORT_ERROR_STATUS, 0);
        assert_ne!(TRANSPORT_ERROR_STATUS, -1);
    }

    #[test]
    fn method_error_names_the_method() {
        let err = ClientError::method("UnregisterGame", zbus::Error::Failure("connection reset".into()));
        assert_eq!(err.to_string(), "UnregisterGame failed: connection reset");
    }

    #[test]
    fn method_error_keeps_the_transport_error() {
        use std::error::Error as _;

        let err = ClientError::method("ListGames", zbus::Error::InvalidReply);
        let source = err.source().expect("transport error is kept as the source");
        assert!(matches!(
            source.downcast_ref::<zbus::Error>(),
            Some(zbus::Error::InvalidReply)
        ));
    }
}
