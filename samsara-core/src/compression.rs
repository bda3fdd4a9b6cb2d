//! Payload compression codecs
//!
//! Codecs are looked up by mode name through a [`CompressorRegistry`] owned by
//! each client. The default registry knows `"gzip"` and `"none"`.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Error, Result};

pub const GZIP: &str = "gzip";
pub const NONE: &str = "none";

/// Byte-level transform applied to encoded JSON before it is sent
pub trait Compressor: Send + Sync {
    /// Value of the `Content-Encoding` header for this codec
    fn content_encoding(&self) -> &str;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// gzip (deflate) compression
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: flate2::Compression,
}

impl GzipCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn content_encoding(&self) -> &str {
        GZIP
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), self.level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoded = Vec::with_capacity(data.len() * 4);
        GzDecoder::new(data).read_to_end(&mut decoded)?;
        Ok(decoded)
    }
}

/// Pass-through codec
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCompressor;

impl Compressor for IdentityCompressor {
    fn content_encoding(&self) -> &str {
        "identity"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Maps compression mode names to codecs
#[derive(Clone)]
pub struct CompressorRegistry {
    compressors: BTreeMap<String, Arc<dyn Compressor>>,
}

impl CompressorRegistry {
    /// Registry with no codecs at all
    pub fn empty() -> Self {
        Self {
            compressors: BTreeMap::new(),
        }
    }

    /// Add or replace the codec for `name`
    pub fn register(mut self, name: impl Into<String>, compressor: Arc<dyn Compressor>) -> Self {
        self.compressors.insert(name.into(), compressor);
        self
    }

    /// Look up a codec, failing with `InvalidArgument` for unknown modes
    pub fn get(&self, name: &str) -> Result<Arc<dyn Compressor>> {
        self.compressors.get(name).cloned().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "compression has to be one of {:?}, not {:?}",
                self.names(),
                name
            ))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.compressors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.compressors.keys().map(String::as_str).collect()
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::empty()
            .register(GZIP, Arc::new(GzipCompressor::default()))
            .register(NONE, Arc::new(IdentityCompressor))
    }
}

impl std::fmt::Debug for CompressorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressorRegistry")
            .field("modes", &self.names())
            .finish()
    }
}
