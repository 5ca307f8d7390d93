use crc32fast::Hasher;

/// Checksum of raw source text, rendered as `crc32:<hex>`.
pub fn text_checksum(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    format!("crc32:{:08x}", hasher.finalize())
}

/// Checksum of a JSON payload over its canonical form.
///
/// Canonical form is compact JSON with object keys in sorted order, which is
/// what `serde_json::Value` serialization produces (object maps are ordered
/// by key). Two payloads that differ only in original key order therefore
/// produce the same checksum.
pub fn payload_checksum(payload: &serde_json::Value) -> String {
    text_checksum(&payload.to_string())
}

/// Content digest used for fingerprints: bare 8-hex crc32 of canonical JSON.
pub fn content_digest(payload: &serde_json::Value) -> String {
    let mut hasher = Hasher::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:08x}", hasher.finalize())
}
