//! Minimal `multipart/form-data` parsing for uploads.

use anyhow::{anyhow, Result};

/// One part of a multipart body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Extract the boundary parameter from a `multipart/form-data` content type.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let media_type = params.next()?.trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Split a multipart body into its parts.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<FormPart>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let closing = [b"\r\n".as_slice(), delimiter].concat();

    let mut pos = find(body, delimiter, 0).ok_or_else(|| anyhow!("multipart boundary not found"))?;
    let mut parts = Vec::new();
    loop {
        pos += delimiter.len();
        if body[pos..].starts_with(b"--") {
            return Ok(parts);
        }
        if !body[pos..].starts_with(b"\r\n") {
            return Err(anyhow!("malformed multipart delimiter"));
        }
        pos += 2;

        let header_end = find(body, b"\r\n\r\n", pos)
            .ok_or_else(|| anyhow!("multipart part headers not terminated"))?;
        let headers = String::from_utf8_lossy(&body[pos..header_end]);
        let data_start = header_end + 4;
        let data_end = find(body, &closing, data_start)
            .ok_or_else(|| anyhow!("multipart body truncated"))?;

        parts.push(part_from_headers(&headers, body[data_start..data_end].to_vec())?);
        pos = data_end + 2;
    }
}

fn part_from_headers(headers: &str, data: Vec<u8>) -> Result<FormPart> {
    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';').skip(1) {
                if let Some((k, v)) = param.split_once('=') {
                    let v = v.trim().trim_matches('"').to_string();
                    match k.trim() {
                        "name" => name = Some(v),
                        "filename" => filename = Some(v),
                        _ => {}
                    }
                }
            }
        } else if key.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }
    Ok(FormPart {
        name: name.ok_or_else(|| anyhow!("multipart part without a name"))?,
        filename,
        content_type,
        data,
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
