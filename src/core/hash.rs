use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deterministic pseudo-count derived from a probe's name and options.
///
/// Retained only for the deprecated `eventLog` activity path so offline
/// fixture runs stay reproducible; real activity probes query the org.
pub fn pseudo_count(name: &str, options: &str, max: u64) -> u64 {
    let payload = format!("{}|{}", name, options);
    let digest = Sha256::digest(payload.as_bytes());
    let mut value: u64 = 0;
    for byte in digest.iter().take(8) {
        value = (value << 8) | *byte as u64;
    }
    if max == 0 {
        0
    } else {
        value % max
    }
}

pub fn definition_fingerprint(json: &serde_json::Value) -> String {
    sha256_hex(json.to_string().as_bytes())
}
