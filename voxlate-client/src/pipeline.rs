use crate::request::{ACCEPT_TRANSLATION, Body, HttpRequest, join_url};
use voxlate_core::types::AudioBlob;

pub const PIPELINE_PATH: &str = "/pipeline";

/// Build the multipart submission for one translation.
///
/// Language codes are expected to be mapped already.
pub fn build_translation_request(
    base_url: &str,
    audio: &AudioBlob,
    source_lang: &str,
    target_lang: &str,
) -> HttpRequest {
    let boundary = format!("Boundary-{}", uuid::Uuid::new_v4());

    let mut body: Vec<u8> = Vec::new();

    append_file(
        &mut body,
        &boundary,
        "file",
        &recording_filename(&audio.mime_type),
        &audio.mime_type,
        &audio.bytes,
    );
    append_field(&mut body, &boundary, "source_lang", source_lang);
    append_field(&mut body, &boundary, "target_lang", target_lang);

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    HttpRequest {
        method: "POST".into(),
        url: join_url(base_url, PIPELINE_PATH),
        headers: vec![
            (
                "Content-Type".into(),
                format!("multipart/form-data; boundary={}", boundary),
            ),
            ("Accept".into(), ACCEPT_TRANSLATION.into()),
        ],
        body: Body::MultipartFormData {
            boundary,
            bytes: body,
        },
    }
}

fn recording_filename(mime_type: &str) -> String {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    let ext = match essence {
        "audio/webm" => "webm",
        "audio/mp4" => "m4a",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        _ => "wav",
    };
    format!("recording.{ext}")
}

fn append_field(body: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
    );
    body.extend_from_slice(value.as_bytes());
    body.extend_from_slice(b"\r\n");
}

fn append_file(
    body: &mut Vec<u8>,
    boundary: &str,
    name: &str,
    filename: &str,
    mime_type: &str,
    bytes: &[u8],
) {
    let mime_type = if mime_type.trim().is_empty() {
        "application/octet-stream"
    } else {
        mime_type
    };

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            name, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_multipart_with_languages_and_file() {
        let audio = AudioBlob::new("audio/webm;codecs=opus", vec![1, 2, 3]);
        let req = build_translation_request("https://example.com/", &audio, "de", "en");

        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "https://example.com/pipeline");
        assert_eq!(req.header("accept"), Some(ACCEPT_TRANSLATION));
        assert!(
            req.header("content-type")
                .unwrap()
                .starts_with("multipart/form-data; boundary=Boundary-")
        );

        match req.body {
            Body::MultipartFormData { bytes, boundary } => {
                let s = String::from_utf8_lossy(&bytes);
                assert!(s.contains("name=\"file\"; filename=\"recording.webm\""));
                assert!(s.contains("Content-Type: audio/webm;codecs=opus"));
                assert!(s.contains("name=\"source_lang\"\r\n\r\nde\r\n"));
                assert!(s.contains("name=\"target_lang\"\r\n\r\nen\r\n"));
                assert!(s.ends_with(&format!("--{boundary}--\r\n")));
            }
            _ => panic!("expected multipart"),
        }
    }

    #[test]
    fn filename_follows_recorder_format() {
        assert_eq!(recording_filename("audio/wav"), "recording.wav");
        assert_eq!(recording_filename("audio/mp4"), "recording.m4a");
        assert_eq!(recording_filename(""), "recording.wav");
    }
}
