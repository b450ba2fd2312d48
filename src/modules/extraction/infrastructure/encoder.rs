//! JPEG encoding and content checksums for sampled frames

use crate::modules::extraction::domain::VideoFrame;
use crate::shared::errors::{AppError, AppResult};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use sha2::{Digest, Sha256};

const JPEG_QUALITY: u8 = 85;

/// Encoded frame bytes together with their checksum
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`
    pub checksum: String,
}

/// Encode a frame to JPEG and checksum the encoded bytes.
///
/// CPU bound; callers run it on the blocking pool.
pub fn encode_frame(frame: &VideoFrame) -> AppResult<EncodedFrame> {
    if frame.width == 0 || frame.height == 0 {
        return Err(AppError::SourceError(format!(
            "Frame has invalid dimensions {}x{}",
            frame.width, frame.height
        )));
    }
    let expected = frame.expected_len();
    if expected != Some(frame.data.len()) {
        return Err(AppError::SourceError(format!(
            "Frame buffer holds {} bytes, expected {} for {}x{} RGB",
            frame.data.len(),
            expected.map_or_else(|| "more than addressable".to_string(), |n| n.to_string()),
            frame.width,
            frame.height
        )));
    }

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode(
        &frame.data,
        frame.width,
        frame.height,
        ColorType::Rgb8,
    )?;

    let checksum = checksum(&bytes);
    Ok(EncodedFrame { bytes, checksum })
}

pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
