use anyhow::Result;
use bytes::Bytes;
use encoding_rs::SHIFT_JIS;
use flate2::read::{DeflateDecoder, GzDecoder};
use std::io::Read;

/// Body compression announced through the `Content-Encoding` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Zstd,
}

impl ContentEncoding {
    /// Only the first listed coding is honoured; anything unknown is treated
    /// as an uncompressed body.
    pub fn from_header(value: Option<&str>) -> Self {
        let first = value
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        match first.as_str() {
            "gzip" | "x-gzip" => ContentEncoding::Gzip,
            "deflate" => ContentEncoding::Deflate,
            "zstd" => ContentEncoding::Zstd,
            _ => ContentEncoding::Identity,
        }
    }
}

fn inflate(data: &[u8], encoding: ContentEncoding) -> Result<Bytes> {
    let mut out = Vec::new();
    match encoding {
        ContentEncoding::Identity => return Ok(Bytes::copy_from_slice(data)),
        ContentEncoding::Gzip => {
            GzDecoder::new(data).read_to_end(&mut out)?;
        }
        ContentEncoding::Deflate => {
            DeflateDecoder::new(data).read_to_end(&mut out)?;
        }
        ContentEncoding::Zstd => out = zstd::decode_all(data)?,
    }
    Ok(Bytes::from(out))
}

/// Decompresses a response body and turns it into text, trying UTF-8 first
/// and Shift_JIS second. Bytes that are neither are replaced lossily, so
/// only a broken compression stream is an error.
pub fn decode_body(data: &[u8], encoding: ContentEncoding) -> Result<String> {
    // 204, 304 and HEAD responses may announce an encoding without a body
    if data.is_empty() {
        return Ok(String::new());
    }
    let body = inflate(data, encoding)?;
    Ok(decode_text(&body))
}

/// Text decoding that never fails: UTF-8, then Shift_JIS, then lossy UTF-8.
pub fn decode_text(body: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(body) {
        return s.to_string();
    }
    let (text, _, had_errors) = SHIFT_JIS.decode(body);
    if had_errors {
        return String::from_utf8_lossy(body).into_owned();
    }
    text.into_owned()
}
