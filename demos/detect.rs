use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use objdetect_ort::{
    annotate::Annotator,
    models::{SsdModel, SsdPretrainedModel},
    ort::Session,
    pipeline::{Pipeline, PipelineConfig},
    LabelMap,
};
use tracing_subscriber::EnvFilter;

/// Detect objects in one image, save an annotated copy and a text report.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Input image
    #[arg(short, long, default_value = "images/input.jpg")]
    image: PathBuf,

    /// Annotated output image
    #[arg(short, long, default_value = "images/output_10.jpg")]
    output: PathBuf,

    /// Report path, defaults to `<output>.txt`
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Local ONNX model; the pretrained SSD MobileNet is downloaded when omitted
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Label map in protobuf text format; MS-COCO when omitted
    #[arg(short, long)]
    labels: Option<PathBuf>,

    /// Minimum score, exclusive
    #[arg(short, long, default_value_t = SsdModel::DEFAULT_CONFIDENCE_THRESHOLD)]
    threshold: f32,

    /// Font for box captions, replacing the embedded DejaVu Sans
    #[arg(short, long)]
    font: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let label_map = match &args.labels {
        Some(path) => LabelMap::from_file(path)
            .with_context(|| format!("loading label map {}", path.display()))?,
        None => LabelMap::mscoco(),
    };

    let model = match &args.model {
        Some(path) => {
            let path = path.to_string_lossy();
            SsdModel::new_from_file(&path, &path, label_map, args.threshold, Session::builder()?)
        }
        None => {
            SsdModel::configure_pretrained(
                SsdPretrainedModel::SSD_MOBILENET_V1_COCO,
                args.threshold,
                Session::builder()?,
            )
            .map(|model| model.with_label_map(label_map))
        }
    }
    .context("loading model")?;

    let annotator = match &args.font {
        Some(path) => Annotator::new().with_font_file(path)?,
        None => Annotator::new(),
    };

    let mut config = PipelineConfig::for_output(&args.image, &args.output);
    if let Some(report) = args.report {
        config.report = report;
    }

    let detections = Pipeline::new(model, annotator, config).run()?;

    for det in &detections {
        println!("{} {:?}", det.caption(), det.pixel_rect());
    }

    Ok(())
}
