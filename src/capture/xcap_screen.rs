//! Display enumeration and capture using the `xcap` crate.
//!
//! Each monitor is captured separately and composited into a canvas the
//! size of the requested rectangle.

use image::{imageops, RgbaImage};
use tracing::debug;
use xcap::Monitor;

use super::provider::{CaptureSource, DisplaySource, Rect};
use super::CaptureError;

/// Native screen backend over every active monitor
#[derive(Debug, Clone, Copy, Default)]
pub struct XcapScreen;

fn monitors() -> Result<Vec<Monitor>, CaptureError> {
    Monitor::all().map_err(|e| CaptureError::DisplayEnumeration(e.to_string()))
}

fn monitor_rect(monitor: &Monitor) -> Result<Rect, CaptureError> {
    let err = |e: xcap::XCapError| CaptureError::DisplayEnumeration(e.to_string());
    Ok(Rect::new(
        monitor.x().map_err(err)?,
        monitor.y().map_err(err)?,
        monitor.width().map_err(err)?,
        monitor.height().map_err(err)?,
    ))
}

impl DisplaySource for XcapScreen {
    fn displays(&self) -> Result<Vec<Rect>, CaptureError> {
        monitors()?.iter().map(monitor_rect).collect()
    }
}

impl CaptureSource for XcapScreen {
    fn capture_rect(&self, bounds: Rect) -> Result<RgbaImage, CaptureError> {
        if bounds.is_empty() {
            return Err(CaptureError::Source("capture rectangle is empty".to_string()));
        }

        let mut canvas = RgbaImage::new(bounds.width, bounds.height);
        for monitor in monitors()? {
            let rect = monitor_rect(&monitor)?;
            let shot = monitor
                .capture_image()
                .map_err(|e| CaptureError::Source(e.to_string()))?;
            let (width, height) = (shot.width(), shot.height());
            let shot = RgbaImage::from_raw(width, height, shot.into_raw()).ok_or_else(|| {
                CaptureError::Source("monitor returned a malformed image".to_string())
            })?;

            debug!(?rect, width, height, "monitor captured");
            imageops::overlay(
                &mut canvas,
                &shot,
                rect.x as i64 - bounds.x as i64,
                rect.y as i64 - bounds.y as i64,
            );
        }
        Ok(canvas)
    }
}
