use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("ort (onnxruntime) error: {0}")]
    Ort(#[from] ort::Error),
    #[error("hf-hub: {0}")]
    HuggingFace(#[from] hf_hub::api::sync::ApiError),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "annotate")]
    #[error("font: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
    #[error("ndarray shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("label map, line {line}: {message}")]
    LabelMap { line: usize, message: String },
    #[error("model has no inputs")]
    MissingInput,
    #[error("model has no output named `{0}`")]
    MissingOutput(String),
    #[error("unexpected shape for output `{name}`: {shape:?}")]
    InvalidOutput { name: String, shape: Vec<usize> },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
