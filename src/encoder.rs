//! JPEG encoding of captured frames for transport

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;

use crate::frame::Frame;

/// Quality used for the continuous stream; favours bandwidth.
pub const STREAM_QUALITY: u8 = 85;

/// Quality used for single snapshots; favours fidelity.
pub const SNAPSHOT_QUALITY: u8 = 100;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("frame has empty dimensions {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },

    #[error("frame buffer is {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("JPEG encoding failed: {0}")]
    Jpeg(String),
}

/// A compressed frame ready to be written to a response.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub jpeg: Bytes,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

/// Stateless JPEG encoder.
///
/// Output depends only on the frame's pixels and the quality, so encoding
/// the same frame twice yields identical bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamEncoder;

impl StreamEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encodes `frame` at `quality`, clamped to 1..=100.
    pub fn encode(&self, frame: &Frame, quality: u8) -> Result<EncodedFrame, EncodeError> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(EncodeError::EmptyFrame { width, height });
        }

        let expected = frame.expected_len();
        if frame.data().len() != expected {
            return Err(EncodeError::BufferSizeMismatch {
                expected,
                actual: frame.data().len(),
            });
        }

        let quality = quality.clamp(1, 100);
        let mut jpeg = Vec::with_capacity(expected / 8);
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode(frame.data(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| EncodeError::Jpeg(e.to_string()))?;

        Ok(EncodedFrame {
            sequence: frame.sequence(),
            width,
            height,
            quality,
            jpeg: Bytes::from(jpeg),
        })
    }
}
