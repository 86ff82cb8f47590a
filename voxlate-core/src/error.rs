use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a microphone capture attempt failed.
///
/// The recorder keeps at most one of these at a time; callers map `code()` to a
/// localized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum CaptureErrorKind {
    #[error("microphone access was denied")]
    PermissionDenied,

    #[error("no microphone found")]
    NoMicrophone,

    #[error("microphone is in use by another application")]
    MicrophoneBusy,

    #[error("microphone cannot satisfy the requested constraints")]
    MicrophoneConstrained,

    #[error("no supported audio recorder format")]
    RecorderNotSupported,

    #[error("recording failed")]
    RecordingError,

    #[error("unknown capture error")]
    Unknown,
}

impl CaptureErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            CaptureErrorKind::PermissionDenied => "PERMISSION_DENIED",
            CaptureErrorKind::NoMicrophone => "NO_MICROPHONE",
            CaptureErrorKind::MicrophoneBusy => "MICROPHONE_BUSY",
            CaptureErrorKind::MicrophoneConstrained => "MICROPHONE_CONSTRAINED",
            CaptureErrorKind::RecorderNotSupported => "RECORDER_NOT_SUPPORTED",
            CaptureErrorKind::RecordingError => "RECORDING_ERROR",
            CaptureErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }
}

/// Classified failure of a call to the translation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ErrorKind {
    Timeout,
    /// Transport-level failure: refused connection, DNS, TLS, CORS in a browser.
    Network,
    Server { status: u16 },
    EndpointNotFound,
    Unreachable,
    /// JSON that does not parse, or base64 audio that does not decode.
    MalformedResponse,
    IncompleteResponse,
    UnexpectedContentType,
    /// The backend answered well-formed JSON that reports a failure.
    BackendRejected,
    EmptyAudioInput,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Server { .. } => "SERVER_ERROR",
            ErrorKind::EndpointNotFound => "ENDPOINT_NOT_FOUND",
            ErrorKind::Unreachable => "BACKEND_UNREACHABLE",
            ErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorKind::IncompleteResponse => "INCOMPLETE_RESPONSE",
            ErrorKind::UnexpectedContentType => "UNEXPECTED_FORMAT",
            ErrorKind::BackendRejected => "BACKEND_ERROR",
            ErrorKind::EmptyAudioInput => "EMPTY_AUDIO",
        }
    }
}

/// A communication failure as handed to callers: the kind for branching, the
/// message for display and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_codes_are_stable() {
        assert_eq!(CaptureErrorKind::PermissionDenied.code(), "PERMISSION_DENIED");
        assert_eq!(
            CaptureErrorKind::RecorderNotSupported.code(),
            "RECORDER_NOT_SUPPORTED"
        );
        assert_eq!(CaptureErrorKind::Unknown.code(), "UNKNOWN_ERROR");
    }

    #[test]
    fn client_error_displays_message() {
        let e = ClientError::new(ErrorKind::Server { status: 502 }, "HTTP 502 - bad gateway");
        assert_eq!(e.to_string(), "HTTP 502 - bad gateway");
        assert_eq!(e.kind.code(), "SERVER_ERROR");
    }

    #[test]
    fn error_kind_serializes_with_tag() {
        let s = serde_json::to_string(&ErrorKind::Server { status: 503 }).unwrap();
        assert_eq!(s, r#"{"kind":"server","status":503}"#);
    }
}
