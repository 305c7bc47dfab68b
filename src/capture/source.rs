//! Frame source capability
//!
//! The capture loop only needs three things from a camera: open it, read a
//! frame, release it. Hardware backends and synthetic sources both plug in
//! through [`SourceOpener`] and [`FrameSource`].

use super::CaptureError;
use crate::config::CaptureConfig;
use crate::frame::{Frame, BYTES_PER_PIXEL};

/// An opened capture device.
pub trait FrameSource: Send {
    /// Reads the next frame. May block briefly on device I/O.
    ///
    /// An error is treated as transient by the capture loop.
    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// Releases the device. Called exactly once by the capture loop.
    fn close(&mut self) {}
}

/// Opens a [`FrameSource`] for a configuration.
pub trait SourceOpener: Send + Sync {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError>;
}

impl<F> SourceOpener for F
where
    F: Fn(&CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> + Send + Sync,
{
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
        self(config)
    }
}

/// Opener for [`TestPatternSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TestPattern;

impl SourceOpener for TestPattern {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::DeviceUnavailable(format!(
                "test pattern cannot produce {} frames",
                config.resolution()
            )));
        }
        Ok(Box::new(TestPatternSource::new(config.width, config.height)))
    }
}

/// Synthetic source producing a diagonal gradient that shifts every frame.
#[derive(Debug)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }
}

impl FrameSource for TestPatternSource {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = self.tick as usize * 4;
        let mut data = Vec::with_capacity(w * h * BYTES_PER_PIXEL);

        for y in 0..h {
            for x in 0..w {
                let r = ((x * 255 / w.max(1)) + shift) % 256;
                let g = ((y * 255 / h.max(1)) + shift) % 256;
                let b = ((x + y) / 2 + shift) % 256;
                data.extend_from_slice(&[r as u8, g as u8, b as u8]);
            }
        }

        self.tick = self.tick.wrapping_add(1);
        Ok(Frame::new(self.width, self.height, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches_config() {
        let config = CaptureConfig {
            width: 32,
            height: 24,
            ..Default::default()
        };
        let mut source = TestPattern.open(&config).unwrap();
        let frame = source.read().unwrap();

        assert_eq!(frame.width(), 32);
        assert_eq!(frame.height(), 24);
        assert_eq!(frame.data().len(), frame.expected_len());
    }

    #[test]
    fn test_pattern_moves() {
        let mut source = TestPatternSource::new(8, 8);
        let first = source.read().unwrap();
        let second = source.read().unwrap();
        assert_ne!(first.data(), second.data());
    }

    #[test]
    fn test_pattern_rejects_empty_dimensions() {
        let config = CaptureConfig {
            width: 0,
            ..Default::default()
        };
        assert!(matches!(
            TestPattern.open(&config),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_closure_opener() {
        let opener = |_: &CaptureConfig| -> Result<Box<dyn FrameSource>, CaptureError> {
            Err(CaptureError::DeviceUnavailable("no camera".into()))
        };
        let result = opener.open(&CaptureConfig::default());
        assert!(result.is_err());
    }
}
