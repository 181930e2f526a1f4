use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

const DEFAULT_MIME: &str = "text/plain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Decode an RFC 2397 `data:` URL.
pub fn decode(raw: &str) -> Result<DataUrl, String> {
    let raw = raw.trim();
    let rest = raw
        .get(..5)
        .filter(|scheme| scheme.eq_ignore_ascii_case("data:"))
        .map(|_| &raw[5..])
        .ok_or_else(|| "missing data: scheme".to_string())?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "missing ',' separator".to_string())?;

    let mut params = meta.split(';').map(str::trim);
    let mime_type = params
        .next()
        .filter(|value| value.contains('/'))
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_MIME.to_string());
    let is_base64 = meta
        .rsplit(';')
        .next()
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("base64"));

    let data = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = urlencoding::decode(&compact)
            .map(|decoded| decoded.into_owned())
            .unwrap_or(compact);
        BASE64
            .decode(compact.as_bytes())
            .map_err(|e| format!("invalid base64 payload: {e}"))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    Ok(DataUrl { mime_type, data })
}
