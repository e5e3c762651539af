use itertools::izip;
use ndarray::{Array, ArrayBase, ArrayViewD, Dim, OwnedRepr};
use ort::{Session, SessionBuilder};

pub use crate::error::{Error, Result};
use crate::{utils::vec_to_bbox, Detection, LabelMap};

/// Label used for class ids missing from the label map.
pub const UNKNOWN_LABEL: &str = "?";

/// An SSD-style detector exported with the TensorFlow object detection API output
/// signature: `num_detections`, `detection_boxes`, `detection_scores`, `detection_classes`.
pub struct SsdModel {
    model_name: String,
    model: ort::Session,
    confidence_threshold: f32,
    label_map: LabelMap,
    outputs: OutputNames,
}

/// Pretrained detectors from Hugging Face.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SsdPretrainedModel {
    SSD_MOBILENET_V1_COCO,
    SSD_MOBILENET_V1_COCO_INT8,
}

impl SsdPretrainedModel {
    /// Model name, the model file name without its extension.
    pub fn name(&self) -> &str {
        self.hf_filename().trim_end_matches(".onnx")
    }

    /// Hugging Face repository for this model.
    pub fn hf_repo(&self) -> &str {
        match self {
            _ => "onnxmodelzoo/ssd_mobilenet_v1_12",
        }
    }

    /// Path for this model file in the Hugging Face repository.
    pub fn hf_filename(&self) -> &str {
        match self {
            Self::SSD_MOBILENET_V1_COCO => "ssd_mobilenet_v1_12.onnx",
            Self::SSD_MOBILENET_V1_COCO_INT8 => "ssd_mobilenet_v1_12-int8.onnx",
        }
    }

    pub fn label_map(&self) -> LabelMap {
        match self {
            _ => LabelMap::mscoco(),
        }
    }
}

/// Names of the four detection outputs, as the graph was exported.
/// Lookup also accepts the TensorFlow port suffix, so `detection_boxes` matches
/// `detection_boxes:0`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputNames {
    pub num_detections: String,
    pub boxes: String,
    pub scores: String,
    pub classes: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            num_detections: "num_detections".to_string(),
            boxes: "detection_boxes".to_string(),
            scores: "detection_scores".to_string(),
            classes: "detection_classes".to_string(),
        }
    }
}

impl OutputNames {
    /// Maps each configured name onto the matching name in `available`.
    pub fn resolve<'a>(&self, available: impl IntoIterator<Item = &'a str> + Clone) -> Result<Self> {
        let find = |wanted: &str| -> Result<String> {
            available
                .clone()
                .into_iter()
                .find(|name| matches_output(name, wanted))
                .map(str::to_string)
                .ok_or_else(|| Error::MissingOutput(wanted.to_string()))
        };

        Ok(Self {
            num_detections: find(&self.num_detections)?,
            boxes: find(&self.boxes)?,
            scores: find(&self.scores)?,
            classes: find(&self.classes)?,
        })
    }
}

fn matches_output(name: &str, wanted: &str) -> bool {
    match name.strip_prefix(wanted) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix(':')
            .is_some_and(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit())),
        None => false,
    }
}

fn first_input<'a>(mut inputs: impl Iterator<Item = &'a str>) -> Result<&'a str> {
    inputs.next().ok_or(Error::MissingInput)
}

/// Borrowed views of the four raw detection outputs of one image.
pub struct RawDetections<'a> {
    pub num_detections: ArrayViewD<'a, f32>,
    pub boxes: ArrayViewD<'a, f32>,
    pub scores: ArrayViewD<'a, f32>,
    pub classes: ArrayViewD<'a, f32>,
}

impl SsdModel {
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

    /// Construct an [`SsdModel`] with a pretrained model downloaded from Hugging Face.
    pub fn pretrained(p_model: SsdPretrainedModel) -> Result<Self> {
        Self::configure_pretrained(
            p_model,
            Self::DEFAULT_CONFIDENCE_THRESHOLD,
            Session::builder()?,
        )
    }

    /// Construct a configured [`SsdModel`] with a pretrained model downloaded from Hugging Face.
    pub fn configure_pretrained(
        p_model: SsdPretrainedModel,
        confidence_threshold: f32,
        session_builder: SessionBuilder,
    ) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new()?;
        let filename = api
            .model(p_model.hf_repo().to_string())
            .get(p_model.hf_filename())?;
        tracing::debug!("using model file {}", filename.display());

        let model = session_builder.commit_from_file(filename)?;

        Self::from_session(
            model,
            p_model.name(),
            p_model.label_map(),
            confidence_threshold,
            &OutputNames::default(),
        )
    }

    /// Construct an [`SsdModel`] from a model file.
    pub fn new_from_file(
        file_path: &str,
        model_name: &str,
        label_map: LabelMap,
        confidence_threshold: f32,
        session_builder: SessionBuilder,
    ) -> Result<Self> {
        let model = session_builder.commit_from_file(file_path)?;

        Self::from_session(
            model,
            model_name,
            label_map,
            confidence_threshold,
            &OutputNames::default(),
        )
    }

    /// Wrap an already loaded session whose outputs use non-default names.
    pub fn from_session(
        model: Session,
        model_name: &str,
        label_map: LabelMap,
        confidence_threshold: f32,
        output_names: &OutputNames,
    ) -> Result<Self> {
        let outputs = output_names.resolve(model.outputs.iter().map(|o| o.name.as_str()))?;
        tracing::debug!("model `{model_name}` outputs: {outputs:?}");

        Ok(Self {
            model_name: model_name.to_string(),
            model,
            confidence_threshold,
            label_map,
            outputs,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }

    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    /// Replace the label map, e.g. with one read from a `.pbtxt` file.
    pub fn with_label_map(mut self, label_map: LabelMap) -> Self {
        self.label_map = label_map;
        self
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn set_confidence_threshold(&mut self, confidence_threshold: f32) {
        self.confidence_threshold = confidence_threshold;
    }

    /// Predict [`Detection`]s from the image provided, in model output order.
    pub fn predict(&self, img: &image::DynamicImage) -> Result<Vec<Detection>> {
        let (img_width, img_height, input) = preprocess(img)?;

        let input_name = first_input(self.model.inputs.iter().map(|i| i.name.as_str()))?;

        tracing::debug!("running `{}` on {img_width}x{img_height} image", self.model_name);
        let outputs = self.model.run(ort::inputs![input_name => input]?)?;

        let raw = RawDetections {
            num_detections: outputs[self.outputs.num_detections.as_str()]
                .try_extract_tensor::<f32>()?,
            boxes: outputs[self.outputs.boxes.as_str()].try_extract_tensor::<f32>()?,
            scores: outputs[self.outputs.scores.as_str()].try_extract_tensor::<f32>()?,
            classes: outputs[self.outputs.classes.as_str()].try_extract_tensor::<f32>()?,
        };

        decode_detections(
            &raw,
            img_width,
            img_height,
            self.confidence_threshold,
            &self.label_map,
            &self.model_name,
        )
    }
}

/// Packs the image as a `[1, height, width, 3]` uint8 tensor.
fn preprocess(
    img: &image::DynamicImage,
) -> Result<(u32, u32, ArrayBase<OwnedRepr<u8>, Dim<[usize; 4]>>)> {
    let (img_width, img_height) = (img.width(), img.height());
    let rgb = img.to_rgb8();

    let input = Array::from_shape_vec(
        (1, img_height as usize, img_width as usize, 3),
        rgb.into_raw(),
    )?;

    Ok((img_width, img_height, input))
}

/// Turns raw detector outputs into pixel-space [`Detection`]s.
///
/// Boxes are normalized `[ymin, xmin, ymax, xmax]`. Only the first `num_detections`
/// rows are read, and a row is kept when its score is strictly greater than
/// `confidence_threshold`.
pub fn decode_detections(
    raw: &RawDetections<'_>,
    img_width: u32,
    img_height: u32,
    confidence_threshold: f32,
    label_map: &LabelMap,
    source: &str,
) -> Result<Vec<Detection>> {
    let rows = raw.scores.len();

    if raw.boxes.len() != rows * 4 {
        return Err(Error::InvalidOutput {
            name: "detection_boxes".to_string(),
            shape: raw.boxes.shape().to_vec(),
        });
    }
    if raw.classes.len() != rows {
        return Err(Error::InvalidOutput {
            name: "detection_classes".to_string(),
            shape: raw.classes.shape().to_vec(),
        });
    }

    let count = match raw.num_detections.iter().next() {
        Some(n) if *n >= 0.0 => (*n as usize).min(rows),
        Some(_) => 0,
        None => rows,
    };

    let (w, h) = (img_width as f32, img_height as f32);
    let boxes: Vec<f32> = raw.boxes.iter().copied().collect();

    let mut detections = vec![];

    for (bbox, score, class) in izip!(boxes.chunks_exact(4), raw.scores.iter(), raw.classes.iter())
        .take(count)
        .filter(|(_, score, _)| **score > confidence_threshold)
    {
        let [ymin, xmin, ymax, xmax] = vec_to_bbox(bbox);
        let class_id = *class as i64;
        let label = label_map.get(class_id).unwrap_or_else(|| {
            tracing::warn!("class id {class_id} missing from label map");
            UNKNOWN_LABEL
        });

        tracing::trace!("det {label} ({class_id}) score {score} at {xmin},{ymin} - {xmax},{ymax}");

        detections.push(Detection::new(
            xmin * w,
            ymin * h,
            xmax * w,
            ymax * h,
            class_id,
            label,
            *score,
            source,
        ));
    }

    tracing::debug!(
        "{} of {count} detections above threshold {confidence_threshold}",
        detections.len()
    );

    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, arr3, ArrayD};

    struct Outputs {
        num: ArrayD<f32>,
        boxes: ArrayD<f32>,
        scores: ArrayD<f32>,
        classes: ArrayD<f32>,
    }

    impl Outputs {
        fn raw(&self) -> RawDetections<'_> {
            RawDetections {
                num_detections: self.num.view(),
                boxes: self.boxes.view(),
                scores: self.scores.view(),
                classes: self.classes.view(),
            }
        }
    }

    fn sample() -> Outputs {
        Outputs {
            num: arr1(&[3.0_f32]).into_dyn(),
            boxes: arr3(&[[
                [0.125_f32, 0.25, 0.5, 0.625],
                [0.0, 0.0, 1.0, 1.0],
                [0.25, 0.5, 0.75, 1.0],
                [0.3, 0.3, 0.4, 0.4],
            ]])
            .into_dyn(),
            scores: arr2(&[[0.9_f32, 0.5, 0.7, 0.95]]).into_dyn(),
            classes: arr2(&[[1.0_f32, 18.0, 12.0, 3.0]]).into_dyn(),
        }
    }

    fn labels() -> LabelMap {
        LabelMap::from_pairs(&[(1, "person"), (3, "car"), (18, "dog")])
    }

    #[test]
    fn keeps_scores_strictly_above_threshold() {
        let out = sample();
        let dets = decode_detections(&out.raw(), 200, 100, 0.5, &labels(), "test").unwrap();

        // the 0.5 row is dropped, the 0.95 row is past num_detections
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].score, 0.9);
        assert_eq!(dets[1].score, 0.7);
    }

    #[test]
    fn scales_normalized_boxes_to_pixels() {
        let out = sample();
        let dets = decode_detections(&out.raw(), 200, 100, 0.5, &labels(), "test").unwrap();

        let first = &dets[0];
        assert_eq!(first.bbox.min().x, 50.0);
        assert_eq!(first.bbox.min().y, 12.5);
        assert_eq!(first.bbox.max().x, 125.0);
        assert_eq!(first.bbox.max().y, 50.0);
        assert_eq!(first.label, "person");
        assert_eq!(first.class_id, 1);
        assert_eq!(first.source, "test");
    }

    #[test]
    fn unknown_class_gets_placeholder_label() {
        let out = sample();
        let dets = decode_detections(&out.raw(), 200, 100, 0.5, &labels(), "test").unwrap();
        assert_eq!(dets[1].class_id, 12);
        assert_eq!(dets[1].label, UNKNOWN_LABEL);
    }

    #[test]
    fn threshold_zero_keeps_everything_counted() {
        let out = sample();
        let dets = decode_detections(&out.raw(), 10, 10, 0.0, &labels(), "test").unwrap();
        assert_eq!(dets.len(), 3);
        assert_eq!(dets[1].label, "dog");
    }

    #[test]
    fn nan_scores_are_dropped() {
        let mut out = sample();
        out.scores = arr2(&[[f32::NAN, 0.5, 0.7, 0.95]]).into_dyn();
        let dets = decode_detections(&out.raw(), 10, 10, 0.5, &labels(), "test").unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].score, 0.7);
    }

    #[test]
    fn missing_count_reads_all_rows() {
        let mut out = sample();
        out.num = ArrayD::zeros(vec![0]);
        let dets = decode_detections(&out.raw(), 10, 10, 0.5, &labels(), "test").unwrap();
        assert_eq!(dets.len(), 3);
        assert_eq!(dets[2].label, "car");
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let mut out = sample();
        out.boxes = arr2(&[[0.0_f32, 0.0, 1.0]]).into_dyn();
        assert!(matches!(
            decode_detections(&out.raw(), 10, 10, 0.5, &labels(), "test"),
            Err(Error::InvalidOutput { .. })
        ));

        let mut out = sample();
        out.classes = arr1(&[1.0_f32]).into_dyn();
        assert!(matches!(
            decode_detections(&out.raw(), 10, 10, 0.5, &labels(), "test"),
            Err(Error::InvalidOutput { .. })
        ));
    }

    #[test]
    fn preprocess_packs_nhwc() {
        let mut img = image::RgbImage::new(3, 2);
        img.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        let (w, h, input) = preprocess(&image::DynamicImage::ImageRgb8(img)).unwrap();

        assert_eq!((w, h), (3, 2));
        assert_eq!(input.shape(), &[1, 2, 3, 3]);
        assert_eq!(input[[0, 1, 2, 0]], 10);
        assert_eq!(input[[0, 1, 2, 2]], 30);
        assert_eq!(input[[0, 0, 0, 0]], 0);
    }

    #[test]
    fn pretrained_variants_have_distinct_names() {
        assert_eq!(SsdPretrainedModel::SSD_MOBILENET_V1_COCO.name(), "ssd_mobilenet_v1_12");
        assert_eq!(
            SsdPretrainedModel::SSD_MOBILENET_V1_COCO_INT8.name(),
            "ssd_mobilenet_v1_12-int8"
        );
    }

    #[test]
    fn session_without_inputs_is_an_error() {
        assert!(matches!(
            first_input(std::iter::empty()),
            Err(Error::MissingInput)
        ));
        assert_eq!(first_input(["image_tensor:0", "extra"].into_iter()).unwrap(), "image_tensor:0");
    }

    #[test]
    fn output_names_accept_port_suffix() {
        let names = OutputNames::default()
            .resolve([
                "detection_boxes:0",
                "detection_scores:0",
                "detection_classes",
                "num_detections:0",
                "detection_multiclass_scores:0",
            ])
            .unwrap();
        assert_eq!(names.boxes, "detection_boxes:0");
        assert_eq!(names.classes, "detection_classes");

        assert!(!matches_output("detection_boxes_raw", "detection_boxes"));
        assert!(!matches_output("detection_boxes:", "detection_boxes"));
        assert!(matches!(
            OutputNames::default().resolve(["detection_boxes"]),
            Err(Error::MissingOutput(name)) if name == "num_detections"
        ));
    }
}
