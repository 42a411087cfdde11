use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::UnreadableReason;

/// Raw bytes of a file that passed the size ceiling.
#[derive(Debug, Clone)]
pub struct LoadedBytes {
    pub bytes: Vec<u8>,
    pub content_hash: String,
}

impl LoadedBytes {
    pub fn head(&self, limit: usize) -> &[u8] {
        &self.bytes[..self.bytes.len().min(limit)]
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Reads file content off the scheduling loop, enforcing a size ceiling.
#[derive(Debug, Clone)]
pub struct ContentLoader {
    max_file_size: u64,
}

impl ContentLoader {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub async fn load(&self, path: &Path) -> Result<LoadedBytes, UnreadableReason> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| UnreadableReason::Io(e.to_string()))?;
        if metadata.len() > self.max_file_size {
            return Err(UnreadableReason::TooLarge {
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| UnreadableReason::Io(e.to_string()))?;
        // The file may have grown between the stat and the read.
        if bytes.len() as u64 > self.max_file_size {
            return Err(UnreadableReason::TooLarge {
                size: bytes.len() as u64,
                limit: self.max_file_size,
            });
        }

        let content_hash = content_hash(&bytes);
        Ok(LoadedBytes {
            bytes,
            content_hash,
        })
    }
}

/// Lowercase hex SHA-256 of the raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// UTF-8 (BOM stripped), then UTF-16 by BOM. Anything else is not text.
pub fn decode_text(bytes: &[u8]) -> Result<String, UnreadableReason> {
    if let Some(rest) = bytes.strip_prefix(b"\xef\xbb\xbf") {
        return String::from_utf8(rest.to_vec()).map_err(|_| UnreadableReason::InvalidEncoding);
    }
    if let Some(rest) = bytes.strip_prefix(b"\xff\xfe") {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(b"\xfe\xff") {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => Err(UnreadableReason::InvalidEncoding),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, UnreadableReason> {
    if bytes.len() % 2 != 0 {
        return Err(UnreadableReason::InvalidEncoding);
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| UnreadableReason::InvalidEncoding)
}
