//! Identifier derivation for new files.

use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

const TOKEN_BYTES: usize = 32;
const MAX_KEY_NAME_LEN: usize = 100;

/// 256 random bits from the OS, hex encoded.
pub fn generate_download_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `{id}-{name}` with the name reduced to a filesystem and URL safe form.
/// The id prefix keeps keys unique even for identical names.
pub fn derive_storage_key(id: Uuid, original_name: &str) -> String {
    let sanitized: String = original_name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .take(MAX_KEY_NAME_LEN)
        .collect();

    if sanitized.is_empty() {
        id.to_string()
    } else {
        format!("{}-{}", id, sanitized)
    }
}
