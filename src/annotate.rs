use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::{Detection, Result};

const BOX_COLOR: [u8; 3] = [255, 0, 0];
const BOX_THICKNESS: u32 = 2;
const CAPTION_FONT_SIZE: f32 = 14.0;
/// Caption offset from the top-right corner of the box.
const CAPTION_OFFSET: i32 = 5;
const DEFAULT_FONT: &[u8] = include_bytes!("data/DejaVuSans.ttf");

/// Draws detection boxes with `label:NN%` captions.
pub struct Annotator {
    font: Option<FontArc>,
    font_scale: PxScale,
    color: Rgb<u8>,
    thickness: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// Captions use the embedded DejaVu Sans; see [`Annotator::with_font_file`] to override.
    pub fn new() -> Self {
        let font = FontArc::try_from_slice(DEFAULT_FONT)
            .map_err(|err| tracing::warn!("embedded caption font unusable: {err}"))
            .ok();

        Self {
            font,
            font_scale: PxScale::from(CAPTION_FONT_SIZE),
            color: Rgb(BOX_COLOR),
            thickness: BOX_THICKNESS,
        }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Boxes only.
    pub fn without_font(mut self) -> Self {
        self.font = None;
        self
    }

    /// Loads a TrueType/OpenType font for captions.
    pub fn with_font_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let font = FontArc::try_from_vec(data)?;
        tracing::debug!("caption font loaded from {}", path.as_ref().display());
        Ok(self.with_font(font))
    }

    pub fn with_font_size(mut self, size: f32) -> Self {
        self.font_scale = PxScale::from(size);
        self
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = Rgb(color);
        self
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
        for detection in detections {
            self.draw_detection(image, detection);
        }
    }

    pub fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let rect = detection.pixel_rect();
        if rect.width <= 0 || rect.height <= 0 {
            tracing::debug!("skipping empty box for {}", detection.label);
            return;
        }

        let (width, height) = (rect.width as u32, rect.height as u32);

        // thicker pens grow inwards so the outer edge stays on the detected box
        for t in 0..self.thickness {
            if width <= 2 * t || height <= 2 * t {
                break;
            }
            let ring = Rect::at(rect.x + t as i32, rect.y + t as i32)
                .of_size(width - 2 * t, height - 2 * t);
            draw_hollow_rect_mut(image, ring, self.color);
        }

        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                self.color,
                rect.right() + CAPTION_OFFSET,
                rect.y + CAPTION_OFFSET,
                self.font_scale,
                font,
                &detection.caption(),
            );
        }
    }

    /// Returns an RGB copy of `img` with all detections drawn.
    pub fn annotate(&self, img: &image::DynamicImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = img.to_rgb8();
        self.draw_detections(&mut canvas, detections);
        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(x1, y1, x2, y2, 1, "person", 0.9, "test")
    }

    #[test]
    fn draws_two_pixel_border() {
        let mut img = RgbImage::new(50, 50);
        Annotator::new()
            .without_font()
            .draw_detections(&mut img, &[det(10.0, 10.0, 30.0, 30.0)]);

        assert_eq!(*img.get_pixel(10, 10), RED);
        assert_eq!(*img.get_pixel(29, 20), RED);
        assert_eq!(*img.get_pixel(11, 20), RED);
        assert_eq!(*img.get_pixel(28, 20), RED);
        assert_eq!(*img.get_pixel(12, 20), BLACK);
        assert_eq!(*img.get_pixel(20, 20), BLACK);
        assert_eq!(*img.get_pixel(30, 20), BLACK);
    }

    #[test]
    fn clips_boxes_past_the_edge() {
        let mut img = RgbImage::new(20, 20);
        Annotator::new()
            .without_font()
            .with_thickness(1)
            .draw_detections(&mut img, &[det(5.0, 5.0, 40.0, 40.0)]);

        assert_eq!(*img.get_pixel(5, 10), RED);
        assert_eq!(*img.get_pixel(10, 5), RED);
        assert_eq!(*img.get_pixel(19, 10), BLACK);
    }

    #[test]
    fn skips_empty_boxes() {
        let mut img = RgbImage::new(20, 20);
        Annotator::new().draw_detections(&mut img, &[det(5.0, 5.0, 5.5, 15.0)]);
        assert!(img.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn annotate_leaves_source_untouched() {
        let src = image::DynamicImage::ImageRgb8(RgbImage::new(16, 16));
        let out = Annotator::new()
            .without_font()
            .with_color([0, 255, 0])
            .annotate(&src, &[det(2.0, 2.0, 10.0, 10.0)]);

        assert_eq!(*out.get_pixel(2, 2), Rgb([0, 255, 0]));
        assert_eq!(src.to_rgb8().get_pixel(2, 2), &BLACK);
        assert!(!Annotator::new().without_font().has_font());
    }

    fn on_border(x: u32, y: u32) -> bool {
        let in_span = |v: u32| (10..=29).contains(&v);
        let on_edge = |v: u32| matches!(v, 10 | 11 | 28 | 29);
        (on_edge(x) && in_span(y)) || (on_edge(y) && in_span(x))
    }

    #[test]
    fn default_draws_caption_right_of_box() {
        let annotator = Annotator::default();
        assert!(annotator.has_font());

        let mut img = RgbImage::new(160, 60);
        let detection = det(10.0, 10.0, 30.0, 30.0);
        annotator.draw_detections(&mut img, &[detection.clone()]);

        let rect = detection.pixel_rect();
        let (text_x, text_y) = ((rect.right() + 5) as u32, (rect.y + 5) as u32);

        let caption_pixels = img
            .enumerate_pixels()
            .filter(|(x, y, p)| *x >= text_x && *y >= text_y && **p != BLACK)
            .count();
        assert!(caption_pixels > 0);

        let stray = img
            .enumerate_pixels()
            .filter(|(x, y, p)| *x < text_x && **p != BLACK && !on_border(*x, *y))
            .count();
        assert_eq!(stray, 0);
    }

    #[test]
    fn rejects_invalid_font_data() {
        let path = std::env::temp_dir().join(format!("objdetect-font-{}.ttf", std::process::id()));
        std::fs::write(&path, b"not a font").unwrap();

        let result = Annotator::new().with_font_file(&path);
        assert!(matches!(result, Err(crate::Error::Font(_))));

        std::fs::remove_file(&path).unwrap();
    }
}
