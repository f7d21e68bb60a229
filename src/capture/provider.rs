//! Display, capture and codec interfaces

use std::io::Write;

use image::codecs::png::PngEncoder as ImagePngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};

use super::CaptureError;

/// A screen-space rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Smallest rectangle covering both; empty rectangles are ignored
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect {
            x,
            y,
            width: (right - x as i64) as u32,
            height: (bottom - y as i64) as u32,
        }
    }

    /// Bounding rectangle of every display; empty when there are none
    pub fn bounding(rects: &[Rect]) -> Rect {
        rects
            .iter()
            .fold(Rect::default(), |acc, rect| acc.union(rect))
    }
}

/// Enumerates display regions
pub trait DisplaySource: Send + Sync {
    fn displays(&self) -> Result<Vec<Rect>, CaptureError>;
}

/// Produces pixel data for a screen rectangle
pub trait CaptureSource: Send + Sync {
    fn capture_rect(&self, bounds: Rect) -> Result<RgbaImage, CaptureError>;
}

/// Encodes captured pixels into one still-image format
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, image: &RgbaImage, out: &mut dyn Write) -> Result<(), CaptureError>;

    /// MIME type of the encoded output
    fn content_type(&self) -> &'static str;
}

/// PNG frame encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder;

impl FrameEncoder for PngEncoder {
    fn encode(&self, image: &RgbaImage, out: &mut dyn Write) -> Result<(), CaptureError> {
        ImagePngEncoder::new(out)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| CaptureError::Encode(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "image/png"
    }
}
