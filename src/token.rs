//! Opaque session tokens
//!
//! A token is 256 bits from the OS random number generator, encoded
//! with the URL-safe base64 alphabet so it can be stored in a cookie
//! as-is. It carries no meaning of its own.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use rand::RngCore;
use rand::rngs::OsRng;

/// Number of random bytes in a token.
pub const TOKEN_BYTES: usize = 32;

/// A source of random bytes for token generation.
pub trait EntropySource: Send + Sync + 'static {
    /// Fill `buf` entirely with random bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot produce randomness.
    fn fill(&self, buf: &mut [u8]) -> std::io::Result<()>;
}

/// The operating system's random number generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> std::io::Result<()> {
        OsRng.try_fill_bytes(buf).map_err(std::io::Error::other)
    }
}

/// Draw a fresh token from `source`.
///
/// # Errors
///
/// Returns [`Error::Entropy`] if the source fails.
pub fn generate_token(source: &dyn EntropySource) -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    source.fill(&mut bytes).map_err(Error::Entropy)?;
    Ok(URL_SAFE.encode(bytes))
}
