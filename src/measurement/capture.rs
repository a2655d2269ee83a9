//! Screen-dump decoding.
//!
//! Analyzers return a screen dump as an 11-byte ASCII header followed by the
//! bitmap. Header bytes 2..11 carry the payload length as decimal digits
//! (`#9000123456`). The transport may append padding after the payload, so the
//! image is cut to exactly the declared length.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::DriverError;

const HEADER_LEN: usize = 11;
const SIZE_FIELD: std::ops::Range<usize> = 2..HEADER_LEN;

/// Decoded screen dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenCapture {
    pub name: String,
    pub size_bytes: usize,
    /// Raw bitmap bytes; format is whatever the instrument produced.
    #[serde(skip)]
    pub image_bytes: Vec<u8>,
}

impl ScreenCapture {
    /// Split header from payload and truncate the payload to the declared size.
    ///
    /// # Errors
    /// `MalformedResponse` if the input is shorter than the header, the size
    /// field is not decimal, or fewer payload bytes arrived than declared.
    pub fn decode(name: impl Into<String>, raw: &[u8]) -> Result<Self, DriverError> {
        if raw.len() < HEADER_LEN {
            return Err(DriverError::MalformedResponse(format!(
                "screen capture is {} bytes, shorter than its {}-byte header",
                raw.len(),
                HEADER_LEN
            )));
        }
        let (header, payload) = raw.split_at(HEADER_LEN);

        let size_bytes: usize = std::str::from_utf8(&header[SIZE_FIELD])
            .ok()
            .map(str::trim)
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| {
                DriverError::MalformedResponse(format!(
                    "screen capture header {:?} has no decimal size",
                    String::from_utf8_lossy(header)
                ))
            })?;

        if payload.len() < size_bytes {
            return Err(DriverError::MalformedResponse(format!(
                "screen capture declares {} bytes but only {} arrived",
                size_bytes,
                payload.len()
            )));
        }

        let name = name.into();
        debug!(
            capture = %name,
            size_bytes,
            padding = payload.len() - size_bytes,
            "Decoded screen capture"
        );
        Ok(Self {
            name,
            size_bytes,
            image_bytes: payload[..size_bytes].to_vec(),
        })
    }

    /// Write the bitmap to `<dir>/<name>.bmp`, creating `dir` if needed.
    pub async fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.bmp", self.name));
        tokio::fs::write(&path, &self.image_bytes).await?;
        Ok(path)
    }
}
