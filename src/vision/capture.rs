//! Frame capture surface
//!
//! Backends return `None` rather than failing when the client window is gone;
//! the matcher turns that into a confidence of -1.

use image::{GrayImage, Rgb, RgbImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How the client window is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureMode {
    /// Window-print path, works while the client is occluded
    Background,
    /// Screen grab of the visible window, cheaper but needs it on top
    Foreground,
}

impl CaptureMode {
    pub fn from_background(background: bool) -> Self {
        if background {
            CaptureMode::Background
        } else {
            CaptureMode::Foreground
        }
    }
}

/// Still frames of the client area
pub trait CaptureProvider: Send + Sync {
    fn capture_gray(&self, mode: CaptureMode) -> Option<GrayImage>;
    fn capture_color(&self, mode: CaptureMode) -> Option<RgbImage>;

    /// Client size in pixels, if the window exists
    fn client_size(&self) -> Option<(u32, u32)> {
        self.capture_gray(CaptureMode::Background)
            .map(|frame| frame.dimensions())
    }

    /// Colour of one client pixel via the background path
    fn pixel_at(&self, x: u32, y: u32) -> Option<Rgb<u8>> {
        let frame = self.capture_color(CaptureMode::Background)?;
        if x < frame.width() && y < frame.height() {
            Some(*frame.get_pixel(x, y))
        } else {
            None
        }
    }
}

/// Capture provider serving a replaceable frame (for testing)
#[derive(Default)]
pub struct MockCaptureProvider {
    frame: Mutex<Option<RgbImage>>,
    captures: AtomicUsize,
}

impl MockCaptureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(frame: RgbImage) -> Self {
        let provider = Self::new();
        provider.set_frame(frame);
        provider
    }

    pub fn set_frame(&self, frame: RgbImage) {
        *self.frame.lock() = Some(frame);
    }

    /// Simulate the window disappearing
    pub fn clear(&self) {
        *self.frame.lock() = None;
    }

    /// Number of capture calls served so far
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl CaptureProvider for MockCaptureProvider {
    fn capture_gray(&self, _mode: CaptureMode) -> Option<GrayImage> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.frame
            .lock()
            .as_ref()
            .map(|f| image::imageops::grayscale(f))
    }

    fn capture_color(&self, _mode: CaptureMode) -> Option<RgbImage> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.frame.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_capture_gone_window() {
        let capture = MockCaptureProvider::new();
        assert!(capture.capture_gray(CaptureMode::Foreground).is_none());
        assert!(capture.client_size().is_none());
        assert!(capture.pixel_at(0, 0).is_none());
    }

    #[test]
    fn test_mock_capture_pixel() {
        let mut frame = RgbImage::from_pixel(40, 60, Rgb([10, 10, 10]));
        frame.put_pixel(13, 49, Rgb([0, 0, 0]));
        let capture = MockCaptureProvider::with_frame(frame);
        assert_eq!(capture.client_size(), Some((40, 60)));
        assert_eq!(capture.pixel_at(13, 49), Some(Rgb([0, 0, 0])));
        assert_eq!(capture.pixel_at(100, 100), None);
    }
}
