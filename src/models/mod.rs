//! Implemented detection models.

mod ssd;

pub use ssd::{
    decode_detections, OutputNames, RawDetections, SsdModel, SsdPretrainedModel, UNKNOWN_LABEL,
};
