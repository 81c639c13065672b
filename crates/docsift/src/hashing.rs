//! Content fingerprinting
//!
//! Files are hashed with SHA-256 in fixed-size chunks so large scans never sit
//! fully in memory. Hashing never fails: an unreadable file falls back to a
//! digest of its path and size, which still gives the dedup check a stable key.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Default read size
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Hash file contents, falling back to `sha256(path + size)` on read errors
pub async fn content_hash(path: &Path, chunk_size: usize) -> String {
    match hash_file(path, chunk_size.max(1)).await {
        Ok(hash) => hash,
        Err(e) => {
            tracing::warn!(
                "Could not read {} for hashing ({}), using path fingerprint",
                path.display(),
                e
            );
            let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
            fallback_hash(path, size)
        }
    }
}

async fn hash_file(path: &Path, chunk_size: usize) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Digest of the path string and size
pub fn fallback_hash(path: &Path, size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(size.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Digest of an in-memory buffer
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_streaming_matches_whole_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let body = "lorem ipsum ".repeat(10_000);
        std::fs::write(&path, &body).unwrap();

        let streamed = content_hash(&path, 7).await;
        assert_eq!(streamed, hash_bytes(body.as_bytes()));
        assert_eq!(streamed.len(), 64);
    }

    #[tokio::test]
    async fn test_same_content_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.md");
        std::fs::write(&a, b"identical").unwrap();
        std::fs::write(&b, b"identical").unwrap();

        assert_eq!(
            content_hash(&a, DEFAULT_CHUNK_SIZE).await,
            content_hash(&b, DEFAULT_CHUNK_SIZE).await
        );
    }

    #[tokio::test]
    async fn test_missing_file_uses_fallback() {
        let path = Path::new("/definitely/not/here.pdf");
        let hash = content_hash(path, DEFAULT_CHUNK_SIZE).await;
        assert_eq!(hash, fallback_hash(path, 0));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
