//! # Overview
//!
//! Single-image object detection with pretrained SSD models exported to ONNX,
//! run through onnxruntime (bindings via [ort](https://github.com/pykeio/ort)).
//!
//! Detections above a confidence threshold are mapped to names through a
//! protobuf-text label map, drawn onto the image and written to a plain-text
//! report sorted by position.

#[cfg(feature = "annotate")]
pub mod annotate;
mod detection;
mod error;
pub mod label_map;
#[cfg(feature = "annotate")]
pub mod pipeline;
pub mod report;
mod utils;

pub use error::{Error, Result};

// re-exports
pub use ort;
pub use image;
pub use geo_types;

pub mod models;

pub use detection::{sort_by_position, Detection, PixelRect};
pub use label_map::{LabelMap, LabelMapItem};
