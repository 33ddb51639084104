//! Content addressing for cache paths

use sha2::{Digest, Sha256};

/// Number of digest bytes kept; rendered as twice as many hex characters.
const HASH_BYTES: usize = 4;

/// Short, deterministic digest of arbitrary content.
///
/// Used only to keep cache sub-paths stable and distinct. It is not a
/// security primitive and collisions are not handled.
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(content.as_ref());
    hex::encode(&digest[..HASH_BYTES])
}
