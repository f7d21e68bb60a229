//! Server module exposing the cached frame over HTTP

mod frame;

pub use frame::{FrameServer, FRAME_PATH};
