//! Content fingerprints used as file identity across renames and moves.
//!
//! Files up to [`LARGE_FILE_THRESHOLD`] are hashed in full. Larger files are
//! identified by a hash of their first and last [`EDGE_BLOCK_SIZE`] bytes, so
//! the cost stays bounded no matter how big the file is. Two different large
//! files with identical head and tail blocks collide; that risk is accepted.

use sha2::{Digest, Sha256};
use shared::error::{AwarenessError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Files strictly larger than this are hashed by head and tail only.
pub const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Size of the head and tail blocks of a large-file fingerprint.
pub const EDGE_BLOCK_SIZE: u64 = 1024 * 1024;

/// Length of a current fingerprint (hex-encoded SHA-256).
pub const FINGERPRINT_HEX_LEN: usize = 64;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    large_file_threshold: u64,
    edge_block_size: u64,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self {
            large_file_threshold: LARGE_FILE_THRESHOLD,
            edge_block_size: EDGE_BLOCK_SIZE,
        }
    }
}

impl Fingerprinter {
    /// Fingerprinter with custom limits. The block size is clamped so that
    /// head and tail never exceed the threshold.
    pub fn with_limits(large_file_threshold: u64, edge_block_size: u64) -> Self {
        Self {
            large_file_threshold,
            edge_block_size: edge_block_size.min(large_file_threshold / 2).max(1),
        }
    }

    pub fn fingerprint(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|e| AwarenessError::hash_failed(path, e))?;
        let meta = file
            .metadata()
            .map_err(|e| AwarenessError::hash_failed(path, e))?;
        if !meta.is_file() {
            return Err(AwarenessError::hash_failed(path, "not a regular file"));
        }

        let mut hasher = Sha256::new();
        let size = meta.len();
        if size > self.large_file_threshold {
            hash_block(&mut file, &mut hasher, self.edge_block_size)
                .map_err(|e| AwarenessError::hash_failed(path, e))?;
            file.seek(SeekFrom::End(-(self.edge_block_size as i64)))
                .map_err(|e| AwarenessError::hash_failed(path, e))?;
            hash_block(&mut file, &mut hasher, self.edge_block_size)
                .map_err(|e| AwarenessError::hash_failed(path, e))?;
        } else {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let n = file
                    .read(&mut buf)
                    .map_err(|e| AwarenessError::hash_failed(path, e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Feed exactly `len` bytes (or until EOF) from the current position.
fn hash_block(file: &mut File, hasher: &mut Sha256, len: u64) -> std::io::Result<()> {
    let mut limited = file.take(len);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = limited.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        hasher.update(&buf[..n]);
    }
}

/// Fingerprint with the default limits.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    Fingerprinter::default().fingerprint(path)
}

/// Whether a stored hash was produced by the current algorithm.
///
/// Missing hashes and shorter legacy digests (32-char MD5) are not current.
pub fn is_current_fingerprint(hash: Option<&str>) -> bool {
    match hash {
        Some(h) => h.len() == FINGERPRINT_HEX_LEN && h.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}
