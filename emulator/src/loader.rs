//! Reading program images from disk.
//!
//! An image is a flat sequence of little-endian 16-bit values, loaded at
//! address 0.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::runtime::converter::{bytes_to_word, word_to_bytes};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read program image {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read and decode the program image at `path`
///
/// # Errors
///
/// It fails if the file can't be read.
pub fn load(path: &Utf8Path) -> Result<Vec<u16>, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_owned(),
        source,
    })?;
    debug!(path = %path, bytes = bytes.len(), "Read program image");
    Ok(decode(&bytes))
}

/// Decode a raw image into its values
///
/// A dangling last byte becomes the low byte of a final value.
#[must_use]
pub fn decode(bytes: &[u8]) -> Vec<u16> {
    let chunks = bytes.chunks_exact(2);
    let remainder = chunks.remainder();

    let mut words: Vec<u16> = chunks
        .map(|pair| bytes_to_word([pair[0], pair[1]]))
        .collect();

    if let [last] = remainder {
        warn!(length = bytes.len(), "Program image has an odd length");
        words.push(bytes_to_word([*last, 0]));
    }

    words
}

/// Encode values as an image, the inverse of [`decode`]
#[must_use]
pub fn encode(words: &[u16]) -> Vec<u8> {
    words.iter().copied().flat_map(word_to_bytes).collect()
}
