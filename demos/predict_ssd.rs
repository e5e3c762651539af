use objdetect_ort::{
    models::{SsdModel, SsdPretrainedModel},
    Result,
};

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "images/input.jpg".to_string());
    let img = image::open(&path)?;

    let model = SsdModel::pretrained(SsdPretrainedModel::SSD_MOBILENET_V1_COCO)?;

    let predictions = model.predict(&img)?;

    for pred in &predictions {
        println!("{}: {:?}", pred.caption(), pred.pixel_rect());
    }

    Ok(())
}
