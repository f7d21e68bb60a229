//! Reusable screen-capture cache
//!
//! Holds the most recently encoded frame of a fixed screen rectangle.
//! Captures encode into a scratch buffer that is committed to the frame
//! only on success, so a failed capture always leaves the previous frame
//! servable. Both buffers are refilled in place and never shrunk,
//! amortizing allocation across captures.

use std::io::Cursor;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::provider::{CaptureSource, DisplaySource, FrameEncoder, Rect};
use super::CaptureError;

/// Initial capacity reserved for encoded frames (16 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 24;

/// Reader over a copy of the cached frame
pub type FrameReader = Cursor<Vec<u8>>;

struct Frames {
    /// Visible, last successfully encoded frame
    frame: Vec<u8>,
    /// Encoding target for the capture in progress
    scratch: Vec<u8>,
}

/// Thread-safe cache of one encoded screen image
pub struct CaptureBuffer {
    bounds: Rect,
    source: Box<dyn CaptureSource>,
    encoder: Box<dyn FrameEncoder>,
    frames: Mutex<Frames>,
}

impl CaptureBuffer {
    /// Create a buffer covering the bounding rectangle of all displays
    ///
    /// Displays are enumerated once; later changes are not picked up.
    pub fn new(
        displays: &dyn DisplaySource,
        source: impl CaptureSource + 'static,
        encoder: impl FrameEncoder + 'static,
    ) -> Result<Self, CaptureError> {
        let regions = displays.displays()?;
        let bounds = Rect::bounding(&regions);
        info!(displays = regions.len(), ?bounds, "capture bounds computed");
        Ok(Self::with_bounds(bounds, source, encoder))
    }

    /// Create a buffer for an explicit rectangle
    pub fn with_bounds(
        bounds: Rect,
        source: impl CaptureSource + 'static,
        encoder: impl FrameEncoder + 'static,
    ) -> Self {
        Self::with_capacity(bounds, source, encoder, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(
        bounds: Rect,
        source: impl CaptureSource + 'static,
        encoder: impl FrameEncoder + 'static,
        capacity: usize,
    ) -> Self {
        Self {
            bounds,
            source: Box::new(source),
            encoder: Box::new(encoder),
            frames: Mutex::new(Frames {
                frame: Vec::with_capacity(capacity),
                scratch: Vec::with_capacity(capacity),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Frames> {
        // The frame is only written after a complete encode, so a poisoned
        // lock still guards a valid frame.
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capture the screen rectangle and replace the cached frame
    ///
    /// Holds the lock for the whole call, serializing concurrent captures
    /// and reads. Returns the new frame size in bytes. On any error the
    /// previous frame is left untouched.
    pub fn capture(&self) -> Result<usize, CaptureError> {
        let started = Instant::now();
        let mut frames = self.lock();

        let image = self.source.capture_rect(self.bounds).map_err(|e| {
            warn!(?e, "screen capture failed");
            e
        })?;

        let Frames { frame, scratch } = &mut *frames;
        scratch.clear();
        if let Err(e) = self.encoder.encode(&image, scratch) {
            warn!(?e, "frame encoding failed");
            scratch.clear();
            return Err(e);
        }
        frame.clear();
        frame.extend_from_slice(scratch);

        let len = frame.len();
        debug!(
            bytes = len,
            capacity = frame.capacity(),
            duration_ms = started.elapsed().as_millis() as u64,
            "frame captured"
        );
        Ok(len)
    }

    /// Copy the cached frame out under the lock
    ///
    /// The returned reader owns its bytes, so a later capture cannot
    /// overwrite them mid-read. Empty before the first successful capture.
    pub fn read(&self) -> FrameReader {
        Cursor::new(self.lock().frame.clone())
    }

    /// Bounding rectangle fixed at construction
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// MIME type of cached frames
    pub fn content_type(&self) -> &'static str {
        self.encoder.content_type()
    }

    pub fn len(&self) -> usize {
        self.lock().frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the visible frame buffer
    pub fn capacity(&self) -> usize {
        self.lock().frame.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PngEncoder;
    use image::{Rgba, RgbaImage};
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fills the rectangle with a shade that changes per call; fails when
    /// `fail` is set
    #[derive(Clone, Default)]
    struct FakeSource {
        shade: Arc<AtomicU8>,
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    impl CaptureSource for FakeSource {
        fn capture_rect(&self, bounds: Rect) -> Result<RgbaImage, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CaptureError::Source("display asleep".to_string()));
            }
            let shade = self.shade.fetch_add(40, Ordering::SeqCst);
            Ok(RgbaImage::from_pixel(
                bounds.width,
                bounds.height,
                Rgba([shade, shade, shade, 255]),
            ))
        }
    }

    /// Writes part of the output and then fails
    struct BrokenEncoder;

    impl FrameEncoder for BrokenEncoder {
        fn encode(&self, _image: &RgbaImage, out: &mut dyn Write) -> Result<(), CaptureError> {
            out.write_all(b"partial")
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
            Err(CaptureError::Encode("out of memory".to_string()))
        }

        fn content_type(&self) -> &'static str {
            "application/octet-stream"
        }
    }

    /// Encoder that can be switched to failing mid-test
    #[derive(Clone, Default)]
    struct ToggleEncoder {
        fail: Arc<AtomicBool>,
    }

    impl FrameEncoder for ToggleEncoder {
        fn encode(&self, image: &RgbaImage, out: &mut dyn Write) -> Result<(), CaptureError> {
            if self.fail.load(Ordering::SeqCst) {
                return BrokenEncoder.encode(image, out);
            }
            PngEncoder.encode(image, out)
        }

        fn content_type(&self) -> &'static str {
            PngEncoder.content_type()
        }
    }

    struct FakeDisplays(Vec<Rect>);

    impl DisplaySource for FakeDisplays {
        fn displays(&self) -> Result<Vec<Rect>, CaptureError> {
            Ok(self.0.clone())
        }
    }

    struct NoDisplays;

    impl DisplaySource for NoDisplays {
        fn displays(&self) -> Result<Vec<Rect>, CaptureError> {
            Err(CaptureError::DisplayEnumeration("no session".to_string()))
        }
    }

    fn small_buffer(source: FakeSource) -> CaptureBuffer {
        CaptureBuffer::with_capacity(Rect::new(0, 0, 8, 6), source, PngEncoder, 64)
    }

    fn read_all(buffer: &CaptureBuffer) -> Vec<u8> {
        let mut bytes = Vec::new();
        buffer.read().read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_read_before_capture_is_empty() {
        let buffer = small_buffer(FakeSource::default());
        assert!(read_all(&buffer).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_capture_replaces_frame() {
        let buffer = small_buffer(FakeSource::default());

        let len = buffer.capture().unwrap();
        let first = read_all(&buffer);
        assert_eq!(first.len(), len);
        assert_eq!(&first[..4], b"\x89PNG");

        buffer.capture().unwrap();
        let second = read_all(&buffer);
        assert_ne!(first, second);
    }

    #[test]
    fn test_source_failure_keeps_previous_frame() {
        let source = FakeSource::default();
        let buffer = small_buffer(source.clone());

        buffer.capture().unwrap();
        let before = read_all(&buffer);

        source.fail.store(true, Ordering::SeqCst);
        assert!(matches!(buffer.capture(), Err(CaptureError::Source(_))));
        assert_eq!(read_all(&buffer), before);
    }

    #[test]
    fn test_source_failure_before_any_frame_stays_empty() {
        let source = FakeSource::default();
        source.fail.store(true, Ordering::SeqCst);
        let buffer = small_buffer(source);

        assert!(buffer.capture().is_err());
        assert!(read_all(&buffer).is_empty());
    }

    #[test]
    fn test_encode_failure_never_exposes_partial_output() {
        let buffer = CaptureBuffer::with_capacity(
            Rect::new(0, 0, 4, 4),
            FakeSource::default(),
            BrokenEncoder,
            64,
        );
        assert!(matches!(buffer.capture(), Err(CaptureError::Encode(_))));
        assert!(read_all(&buffer).is_empty());
    }

    #[test]
    fn test_encode_failure_keeps_previous_frame() {
        let encoder = ToggleEncoder::default();
        let buffer = CaptureBuffer::with_capacity(
            Rect::new(0, 0, 4, 4),
            FakeSource::default(),
            encoder.clone(),
            64,
        );

        buffer.capture().unwrap();
        let before = read_all(&buffer);

        encoder.fail.store(true, Ordering::SeqCst);
        assert!(buffer.capture().is_err());
        assert_eq!(read_all(&buffer), before);
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let buffer = small_buffer(FakeSource::default());
        let mut last = buffer.capacity();
        for _ in 0..5 {
            buffer.capture().unwrap();
            let capacity = buffer.capacity();
            assert!(capacity >= last);
            last = capacity;
        }
    }

    #[test]
    fn test_reader_is_detached_from_later_captures() {
        let buffer = small_buffer(FakeSource::default());
        buffer.capture().unwrap();

        let mut reader = buffer.read();
        let expected = reader.get_ref().clone();
        buffer.capture().unwrap();

        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_bounds_from_displays() {
        let displays = FakeDisplays(vec![Rect::new(0, 0, 10, 10), Rect::new(10, 0, 5, 20)]);
        let buffer = CaptureBuffer::new(&displays, FakeSource::default(), PngEncoder).unwrap();
        assert_eq!(buffer.bounds(), Rect::new(0, 0, 15, 20));
        assert_eq!(buffer.content_type(), "image/png");
    }

    #[test]
    fn test_display_enumeration_error() {
        let result = CaptureBuffer::new(&NoDisplays, FakeSource::default(), PngEncoder);
        assert!(matches!(result, Err(CaptureError::DisplayEnumeration(_))));
    }

    #[test]
    fn test_concurrent_captures_and_reads() {
        let source = FakeSource::default();
        let buffer = Arc::new(small_buffer(source.clone()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        buffer.capture().unwrap();
                        let bytes = read_all(&buffer);
                        assert_eq!(&bytes[..4], b"\x89PNG");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 40);
    }
}
