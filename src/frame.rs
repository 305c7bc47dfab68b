//! Captured video frame

use chrono::{DateTime, Local};

/// Bytes per pixel of the only pixel format the pipeline carries (packed RGB8).
pub const BYTES_PER_PIXEL: usize = 3;

/// One decoded image, packed RGB8, row-major with no padding.
///
/// A frame is mutable while the capture loop owns it (the overlay draws into
/// it) and immutable once published: the buffer hands out `Arc<Frame>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    captured_at: DateTime<Local>,
    sequence: u64,
}

impl Frame {
    /// Wraps an RGB8 pixel buffer.
    ///
    /// The buffer length is not checked here so that sources can hand over
    /// whatever the driver produced; the encoder rejects inconsistent frames.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: Local::now(),
            sequence: 0,
        }
    }

    /// Creates a frame filled with a single colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// Publish order assigned by the capture loop, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Expected buffer length for the frame's dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Sets one pixel; coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: i64, y: i64, rgb: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        if let Some(px) = self.data.get_mut(offset..offset + BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgb);
        }
    }

    /// Reads one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.data.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_frame_layout() {
        let frame = Frame::filled(4, 2, [1, 2, 3]);
        assert_eq!(frame.data().len(), 4 * 2 * 3);
        assert_eq!(frame.expected_len(), frame.data().len());
        assert_eq!(frame.pixel(3, 1), Some([1, 2, 3]));
        assert_eq!(frame.pixel(4, 0), None);
    }

    #[test]
    fn test_put_pixel_clips() {
        let mut frame = Frame::filled(2, 2, [0, 0, 0]);
        frame.put_pixel(-1, 0, [9, 9, 9]);
        frame.put_pixel(2, 1, [9, 9, 9]);
        frame.put_pixel(1, 1, [9, 9, 9]);
        assert_eq!(frame.pixel(1, 1), Some([9, 9, 9]));
        assert_eq!(frame.data().iter().filter(|&&b| b == 9).count(), 3);
    }
}
