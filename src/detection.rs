use geo_types::{coord, Rect};

/// A detected object, with its bounding box in pixel coordinates of the source image.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Detection {
    pub bbox: Rect<f32>,
    pub class_id: i64,
    pub label: String,
    pub score: f32,
    pub source: String,
}

/// Integer rectangle, as written to reports: top-left corner plus extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

impl Detection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        class_id: i64,
        label: &str,
        score: f32,
        source: &str,
    ) -> Self {
        let bbox = Rect::new(coord! { x: x1, y: y1 }, coord! { x: x2, y: y2 });

        Self {
            bbox,
            class_id,
            label: label.to_string(),
            score,
            source: source.to_string(),
        }
    }

    /// Truncates the box to whole pixels. Width and height are taken from the
    /// float extent before truncation, so `x + width` may differ from `right as i32`.
    pub fn pixel_rect(&self) -> PixelRect {
        let (min, max) = (self.bbox.min(), self.bbox.max());

        PixelRect {
            x: min.x as i32,
            y: min.y as i32,
            width: (max.x - min.x) as i32,
            height: (max.y - min.y) as i32,
        }
    }

    /// `label:NN%`, score truncated to a whole percent.
    pub fn caption(&self) -> String {
        format!("{}:{}%", self.label, (self.score * 100.0) as i32)
    }
}

/// Orders detections left to right, then top to bottom, by their integer rectangles.
pub fn sort_by_position(detections: &mut [Detection]) {
    detections.sort_by_key(|d| {
        let rect = d.pixel_rect();
        (rect.x, rect.y)
    });
}
