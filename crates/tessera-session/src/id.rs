//! Session identifier minting and inbound validation.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

/// Bytes of randomness behind each identifier (256 bits).
const ID_ENTROPY_BYTES: usize = 32;

/// Longest inbound identifier accepted before it is treated as malformed.
const MAX_ID_LEN: usize = 256;

/// Generate a new session identifier.
///
/// Draws 32 bytes from the thread-local CSPRNG (seeded from the OS) and
/// encodes them as unpadded URL-safe base64, giving a 43-character token.
pub fn generate_identifier() -> String {
    let mut bytes = [0u8; ID_ENTROPY_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode an identifier as it arrived from the client.
///
/// The value is percent-decoded and must be non-empty, at most 256
/// characters, and drawn from the URL-safe base64 alphabet. Anything else
/// returns `None` and is handled as if no identifier had been sent.
pub fn decode_identifier(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw).ok()?;
    if decoded.is_empty() || decoded.len() > MAX_ID_LEN {
        return None;
    }
    if !decoded
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return None;
    }
    Some(decoded.into_owned())
}
