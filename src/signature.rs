//! Signature image lookup. Every failure becomes "no image" so the footer falls back to a
//! blank underline.

use crate::normalize::MISSING_MARKER;
use base64::Engine;
use std::path::PathBuf;

pub trait SignatureSource: Send + Sync {
    /// Raw image bytes for `reference`, or `None` when they cannot be produced.
    fn fetch(&self, reference: &str) -> Option<Vec<u8>>;
}

impl<F> SignatureSource for F
where
    F: Fn(&str) -> Option<Vec<u8>> + Send + Sync,
{
    fn fetch(&self, reference: &str) -> Option<Vec<u8>> {
        self(reference)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignatures;

impl SignatureSource for NoSignatures {
    fn fetch(&self, _reference: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Resolves `data:` URIs inline and anything else as a file below `base_dir`.
#[derive(Debug, Clone)]
pub struct LocalSignatures {
    base_dir: PathBuf,
}

impl LocalSignatures {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl SignatureSource for LocalSignatures {
    fn fetch(&self, reference: &str) -> Option<Vec<u8>> {
        let reference = reference.trim();
        if reference.is_empty() || reference.eq_ignore_ascii_case(MISSING_MARKER) {
            return None;
        }
        if reference.starts_with("data:") {
            return decode_data_uri(reference);
        }
        let path = self.base_dir.join(reference);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log::warn!("signature {} unavailable: {err}", path.display());
                None
            }
        }
    }
}

/// Payload of a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let rest = uri.trim().strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    match base64::engine::general_purpose::STANDARD.decode(cleaned) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            log::warn!("invalid signature data URI: {err}");
            None
        }
    }
}
