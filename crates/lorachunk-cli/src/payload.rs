/// File-backed payload source and sink.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::settings::PayloadEncoding;

/// Hex SHA-256 of `data`, logged on both ends so operators can compare.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub struct FileSource {
    path: PathBuf,
    encoding: PayloadEncoding,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, encoding: PayloadEncoding) -> Self {
        Self {
            path: path.into(),
            encoding,
        }
    }

    /// Read the file and produce the bytes to transfer.
    pub fn load(&self) -> Result<Vec<u8>> {
        let raw = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(match self.encoding {
            PayloadEncoding::Raw => raw,
            PayloadEncoding::Base64 => STANDARD.encode(&raw).into_bytes(),
        })
    }
}

pub struct FileSink {
    path: PathBuf,
    encoding: PayloadEncoding,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, encoding: PayloadEncoding) -> Self {
        Self {
            path: path.into(),
            encoding,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the assembled payload and write it out. Returns the bytes written.
    pub fn store(&self, payload: &[u8]) -> Result<usize> {
        let bytes = match self.encoding {
            PayloadEncoding::Raw => payload.to_vec(),
            PayloadEncoding::Base64 => STANDARD
                .decode(payload.trim_ascii())
                .context("received payload is not valid base64")?,
        };
        fs::write(&self.path, &bytes)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(bytes.len())
    }
}
