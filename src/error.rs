//! Error types for audio-bridge.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`BridgeError`]): Prevent a session from starting
//! - **Transient conditions**: `read` returning empty and `write` returning
//!   `false` mean "nothing available yet" / "buffer still full" and are not
//!   errors - retry instead.

/// Fatal errors that prevent a stream session from starting.
///
/// These errors are returned from [`AudioBridge::init()`] and indicate
/// that the session cannot be created. Data-path timeouts are reported
/// through the `read`/`write` return values instead and never produce a
/// `BridgeError`.
///
/// [`AudioBridge::init()`]: crate::AudioBridge::init
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The requested sample format has no device-layer equivalent.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format/planar combination that wasn't in the capability table.
        format: String,
    },

    /// The dedicated processing loop could not be created or started.
    #[error("error starting processing loop: {reason}")]
    LoopStartFailed {
        /// Underlying system error.
        reason: String,
    },

    /// The media-server context could not be created.
    #[error("error creating context: {reason}")]
    ContextCreateFailed {
        /// Underlying system error.
        reason: String,
    },

    /// Connecting to the media server core failed.
    #[error("error connecting to the media server: {reason}")]
    CoreConnectFailed {
        /// Underlying system error.
        reason: String,
    },

    /// The stream object could not be created or connected.
    #[error("error creating stream: {reason}")]
    StreamCreateFailed {
        /// Underlying system error.
        reason: String,
    },

    /// An error from the underlying device layer.
    #[error("backend error: {0}")]
    BackendError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_display() {
        let err = BridgeError::UnsupportedFormat {
            format: "S16Le (planar)".to_string(),
        };
        assert_eq!(err.to_string(), "unsupported sample format: S16Le (planar)");
    }

    #[test]
    fn test_backend_error_display() {
        let err = BridgeError::BackendError("connection refused".to_string());
        assert_eq!(err.to_string(), "backend error: connection refused");
    }
}
