use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ErrorKind};

/// One finished recording, tagged with the format the recorder chose.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioBlob {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl AudioBlob {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Audio payloads can be megabytes; keep logs readable.
impl std::fmt::Debug for AudioBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBlob")
            .field("mime_type", &self.mime_type)
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

/// Something the caller can play back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioHandle {
    Inline(AudioBlob),
    Remote(String),
}

impl AudioHandle {
    pub fn inline(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Inline(AudioBlob::new(mime_type, bytes))
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote(url.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub success: bool,
    pub audio: Option<AudioHandle>,
    pub original_text: Option<String>,
    pub translated_text: Option<String>,
    pub error: Option<ClientError>,
}

impl TranslationResult {
    pub fn success(
        audio: AudioHandle,
        original_text: Option<String>,
        translated_text: Option<String>,
    ) -> Self {
        Self {
            success: true,
            audio: Some(audio),
            original_text,
            translated_text,
            error: None,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            audio: None,
            original_text: None,
            translated_text: None,
            error: Some(ClientError::new(kind, message)),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    #[default]
    Idle,
    RequestingPermission,
    Recording,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Prompt,
    Granted,
    Denied,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_carries_kind() {
        let r = TranslationResult::failed(ErrorKind::Timeout, "timed out");
        assert!(!r.success);
        assert!(r.audio.is_none());
        assert_eq!(r.error_kind(), Some(ErrorKind::Timeout));
    }

    #[test]
    fn audio_blob_debug_hides_bytes() {
        let blob = AudioBlob::new("audio/wav", vec![7; 1024]);
        let s = format!("{blob:?}");
        assert!(s.contains("bytes_len: 1024"));
        assert!(!s.contains("7, 7"));
    }
}
