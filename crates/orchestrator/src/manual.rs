//! The reference manual: loaded once, immutable, content-addressed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cachelm_core::error::{Error, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// The operations manual every expert answers from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDocument {
    /// Resolved path the document was read from
    pub path: PathBuf,
    /// Raw file contents
    pub bytes: Vec<u8>,
    /// The contents decoded as UTF-8
    pub text: String,
    /// SHA-256 hex of `bytes`
    pub sha256: String,
}

impl ReferenceDocument {
    /// Read and fingerprint the document at `path`.
    ///
    /// An unreadable file is a configuration error; non-UTF-8 contents are a
    /// validation error.
    pub fn load(path: &Path) -> Result<Self> {
        let resolved = resolve(path)?;
        let bytes = std::fs::read(&resolved).map_err(|e| {
            Error::config(format!("Failed to read manual at {}: {e}", resolved.display()))
        })?;
        debug!(path = %resolved.display(), bytes = bytes.len(), "Loaded manual");
        Self::from_bytes(resolved, bytes)
    }

    /// Build a document from bytes already in memory.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self> {
        let path = path.into();
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| {
                Error::Validation(format!("Manual at {} is not valid UTF-8: {e}", path.display()))
            })?
            .to_owned();
        let sha256 = sha256_hex(&bytes);
        Ok(Self {
            path,
            bytes,
            text,
            sha256,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn resolve(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path)
        .map_err(|e| Error::config(format!("Failed to read manual at {}: {e}", path.display())))
}

/// Holds the most recently loaded document.
///
/// Asking for the same path again returns the cached value; a different
/// path replaces it.
#[derive(Debug, Default)]
pub struct ManualCache {
    current: Option<Arc<ReferenceDocument>>,
}

impl ManualCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &Path) -> Result<Arc<ReferenceDocument>> {
        let resolved = resolve(path)?;
        if let Some(doc) = self.current.as_ref().filter(|doc| doc.path == resolved) {
            return Ok(Arc::clone(doc));
        }

        let doc = Arc::new(ReferenceDocument::load(&resolved)?);
        self.current = Some(Arc::clone(&doc));
        Ok(doc)
    }
}
