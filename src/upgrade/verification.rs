use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::constants::DOWNLOAD_BUFFER_SIZE;
use crate::core::UpdateError;

/// Verifies a downloaded package against the SHA-256 digest published by the
/// update server.
///
/// Digests compare case-insensitively and may carry a `sha256:` prefix.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Hex-encoded SHA-256 of the file at `file_path`, without prefix.
    ///
    /// The file is hashed in fixed-size blocks, never loaded whole.
    pub async fn compute_sha256(file_path: &Path) -> Result<String, UpdateError> {
        debug!("Computing SHA256 checksum for: {}", file_path.display());

        let mut file = File::open(file_path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; DOWNLOAD_BUFFER_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Verify `file_path` against `expected`.
    ///
    /// # Errors
    ///
    /// [`UpdateError::ChecksumMismatch`] when the digests differ, or
    /// [`UpdateError::IoError`] when the file cannot be read.
    pub async fn verify_checksum(file_path: &Path, expected: &str) -> Result<(), UpdateError> {
        info!("Verifying checksum for: {}", file_path.display());

        let actual = Self::compute_sha256(file_path).await?;
        if actual != normalize(expected) {
            return Err(UpdateError::ChecksumMismatch {
                path: file_path.display().to_string(),
                expected: expected.trim().to_string(),
                actual,
            });
        }

        info!("Checksum verification successful");
        Ok(())
    }
}

fn normalize(digest: &str) -> String {
    let digest = digest.trim();
    let digest = digest
        .get(..7)
        .filter(|prefix| prefix.eq_ignore_ascii_case("sha256:"))
        .map_or(digest, |_| &digest[7..]);
    digest.trim().to_ascii_lowercase()
}
