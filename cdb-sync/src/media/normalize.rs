//! Media URI normalization
//!
//! Two references to the same file must normalize to the same string, since
//! the asset identity is derived from it.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Invalid media URI '{uri}': {reason}")]
    Invalid { uri: String, reason: String },
}

/// Normalize a media reference
///
/// - parses and forces the `http` scheme (`https` and `http` converge)
/// - lower-cases scheme and host, drops the default port
/// - resolves `.` and `..` path segments
/// - decodes escapes of unreserved characters, upper-cases the rest
/// - lower-cases the file extension of the last path segment
/// - drops the fragment
pub fn normalize_uri(raw: &str) -> Result<Url, NormalizeError> {
    let invalid = |reason: String| NormalizeError::Invalid {
        uri: raw.to_string(),
        reason,
    };

    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;

    match url.scheme() {
        "http" => {}
        "https" => url
            .set_scheme("http")
            .map_err(|_| invalid("scheme cannot be changed".to_string()))?,
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(invalid("missing host".to_string()));
    }

    // `https://host:443` keeps no port after parsing, `https://host:80` does
    if url.port() == Some(80) {
        url.set_port(None)
            .map_err(|_| invalid("port cannot be changed".to_string()))?;
    }

    let path = lowercase_extension(&normalize_escapes(url.path()));
    url.set_path(&path);

    if let Some(query) = url.query().map(normalize_escapes) {
        url.set_query(Some(&query));
    }

    url.set_fragment(None);
    Ok(url)
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Decode `%XX` escapes of unreserved characters and upper-case the hex
/// digits of every other escape
fn normalize_escapes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                let decoded = hi * 16 + lo;
                if is_unreserved(decoded) {
                    out.push(decoded as char);
                } else {
                    out.push('%');
                    out.push((bytes[i + 1] as char).to_ascii_uppercase());
                    out.push((bytes[i + 2] as char).to_ascii_uppercase());
                }
                i += 3;
                continue;
            }
        }

        // Input is a serialized URL component, so it is ASCII
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}

fn lowercase_extension(path: &str) -> String {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = segment_start + dot;
            format!("{}{}", &path[..split], path[split..].to_ascii_lowercase())
        }
        _ => path.to_string(),
    }
}
