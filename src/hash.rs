//! Content digests.
//!
//! Every identity decision in trapset (cache keys, partition assignment,
//! record ids) goes through the functions here, so they must stay stable
//! across processes and platforms: SHA-256 over the raw bytes, rendered as
//! 64 lowercase hex characters.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest as _, Sha256};

use crate::error::PrepError;
use crate::ir::Digest;

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest everything readable from `reader`, in fixed-size chunks.
pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<Digest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Digest::from_hex_unchecked(format!("{:x}", hasher.finalize())))
}

/// Digest an in-memory buffer.
pub fn digest_bytes(bytes: &[u8]) -> Digest {
    Digest::from_hex_unchecked(format!("{:x}", Sha256::digest(bytes)))
}

/// Digest a file on disk.
///
/// # Errors
/// Returns [`PrepError::SourceRead`] if the file cannot be opened or read.
pub fn digest_file(path: &Path) -> Result<Digest, PrepError> {
    let file = File::open(path).map_err(|e| PrepError::SourceRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    digest_reader(BufReader::new(file)).map_err(|e| PrepError::SourceRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Digest several byte segments as one stream, each prefixed by its length.
///
/// Used to derive keys from more than one input without ambiguity between
/// e.g. `("ab", "c")` and `("a", "bc")`.
pub fn digest_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Digest {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    Digest::from_hex_unchecked(format!("{:x}", hasher.finalize()))
}
