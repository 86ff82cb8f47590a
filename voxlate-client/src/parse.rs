// Interpretation of `/pipeline` responses.
//
// The backend has shipped several response shapes over time. JSON bodies are
// run through an ordered list of matchers; each recognises exactly one shape and
// declines everything else.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::{Map, Value};
use voxlate_core::error::ErrorKind;
use voxlate_core::types::{AudioHandle, TranslationResult};

use crate::runtime::HttpResponse;

pub const INLINE_AUDIO_MIME: &str = "audio/wav";

// Browsers decode with forgiving base64: padding is optional and stray low bits
// in the last symbol are ignored.
const FORGIVING_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Fields of a JSON translation response, with legacy spellings folded in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationPayload {
    pub success: Option<bool>,
    pub error: Option<String>,
    pub audio_base64: Option<String>,
    pub audio_url: Option<String>,
    pub original_text: Option<String>,
    pub translated_text: Option<String>,
}

impl TranslationPayload {
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        let Value::Object(map) = value else {
            return Ok(Self::default());
        };

        Ok(Self {
            success: map.get("success").and_then(Value::as_bool),
            error: error_field(&map),
            audio_base64: text_field(&map, &["audioBase64", "audio_base64"]),
            audio_url: text_field(&map, &["audioUrl", "audio_url"]),
            original_text: text_field(&map, &["originalText", "original_text"]),
            translated_text: text_field(&map, &["translatedText", "translated_text"]),
        })
    }
}

// First non-empty string among `names`.
fn text_field(map: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| map.get(*n).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn error_field(map: &Map<String, Value>) -> Option<String> {
    match map.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

type Matcher = fn(&TranslationPayload) -> Option<TranslationResult>;

/// Evaluated in order; the first matcher that returns `Some` wins.
const JSON_MATCHERS: &[(&str, Matcher)] = &[
    ("explicit_failure", match_explicit_failure),
    ("inline_audio", match_inline_audio),
    ("legacy_audio_url", match_legacy_audio_url),
    ("bare_error", match_bare_error),
];

pub fn match_explicit_failure(p: &TranslationPayload) -> Option<TranslationResult> {
    if p.success != Some(false) {
        return None;
    }
    let detail = p.error.as_deref().unwrap_or("unknown error");
    Some(TranslationResult::failed(
        ErrorKind::BackendRejected,
        format!("Backend error: {detail}"),
    ))
}

pub fn match_inline_audio(p: &TranslationPayload) -> Option<TranslationResult> {
    if p.success != Some(true) {
        return None;
    }
    let encoded = p.audio_base64.as_deref()?;

    Some(match decode_audio_base64(encoded) {
        Ok((mime_type, bytes)) => TranslationResult::success(
            AudioHandle::inline(mime_type, bytes),
            p.original_text.clone(),
            p.translated_text.clone(),
        ),
        Err(e) => {
            log::error!("Failed to decode base64 audio ({} chars): {e}", encoded.len());
            TranslationResult::failed(
                ErrorKind::MalformedResponse,
                format!("Failed to decode audio data: {e}"),
            )
        }
    })
}

pub fn match_legacy_audio_url(p: &TranslationPayload) -> Option<TranslationResult> {
    let url = p.audio_url.as_deref()?;
    Some(TranslationResult::success(
        AudioHandle::remote(url),
        p.original_text.clone(),
        p.translated_text.clone(),
    ))
}

pub fn match_bare_error(p: &TranslationPayload) -> Option<TranslationResult> {
    let detail = p.error.as_deref()?;
    Some(TranslationResult::failed(
        ErrorKind::BackendRejected,
        format!("Backend error: {detail}"),
    ))
}

pub fn interpret_payload(p: &TranslationPayload) -> TranslationResult {
    for (name, matcher) in JSON_MATCHERS {
        if let Some(result) = matcher(p) {
            log::debug!("JSON response matched `{name}`");
            return result;
        }
    }

    TranslationResult::failed(
        ErrorKind::IncompleteResponse,
        "Incomplete JSON response (neither audioBase64 nor audioUrl present)",
    )
}

/// Decode base64 audio, accepting an optional `data:<mime>;base64,` prefix,
/// embedded whitespace and missing padding.
pub fn decode_audio_base64(encoded: &str) -> Result<(String, Vec<u8>), base64::DecodeError> {
    let (mime_type, data) = match encoded.strip_prefix("data:") {
        Some(rest) => match rest.split_once(";base64,") {
            Some((mime, data)) if !mime.is_empty() => (mime.to_string(), data),
            Some((_, data)) => (INLINE_AUDIO_MIME.to_string(), data),
            None => (INLINE_AUDIO_MIME.to_string(), encoded),
        },
        None => (INLINE_AUDIO_MIME.to_string(), encoded),
    };

    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = FORGIVING_BASE64.decode(compact)?;
    Ok((mime_type, bytes))
}

/// Turn a raw `/pipeline` response into a result value.
///
/// `source_lang`/`target_lang` only feed the placeholder texts for bare audio.
pub fn interpret_response(
    resp: &HttpResponse,
    source_lang: &str,
    target_lang: &str,
) -> TranslationResult {
    if !resp.is_success() {
        let mut details = format!("HTTP {} - {}", resp.status, resp.status_text);
        let body = resp.body_text();
        let body = body.trim();
        if !body.is_empty() {
            details.push_str(" - ");
            details.push_str(body);
        }

        let kind = if resp.status == 404 {
            ErrorKind::EndpointNotFound
        } else {
            ErrorKind::Server {
                status: resp.status,
            }
        };
        return TranslationResult::failed(kind, format!("Server error: {details}"));
    }

    let content_type = resp.content_type().unwrap_or_default().to_ascii_lowercase();

    if content_type.contains("audio") {
        if resp.body.is_empty() {
            return TranslationResult::failed(
                ErrorKind::IncompleteResponse,
                "Audio response had an empty body",
            );
        }

        let original = resp
            .header("x-original-text")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Audio processed ({source_lang})"));
        let translated = resp
            .header("x-translated-text")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Translation received ({target_lang})"));

        let mime_type = resp.content_type().unwrap_or(INLINE_AUDIO_MIME).to_string();
        return TranslationResult::success(
            AudioHandle::inline(mime_type, resp.body.clone()),
            Some(original),
            Some(translated),
        );
    }

    if content_type.contains("json") {
        return match TranslationPayload::from_json(&resp.body) {
            Ok(payload) => interpret_payload(&payload),
            Err(e) => {
                log::error!("JSON parsing error: {e}");
                TranslationResult::failed(
                    ErrorKind::MalformedResponse,
                    format!("Malformed JSON response from server: {e}"),
                )
            }
        };
    }

    let body = resp.body_text();
    let preview: String = body.chars().take(200).collect();
    log::error!(
        "Unexpected response format: content_type={content_type:?} body_len={} preview={preview:?}",
        body.len()
    );

    let shown = if content_type.is_empty() {
        "unknown"
    } else {
        content_type.as_str()
    };
    TranslationResult::failed(
        ErrorKind::UnexpectedContentType,
        format!("Unexpected response format: {shown}"),
    )
}
