//! Plain-text detection reports.
//!
//! ```text
//! New results. 2024.05.01 12:30:45.1234
//! i: 0, Name:person, Rect.X: 12, Rect.Y: 40, Rect.Width: 88, Rect.Height: 210, Score: 0.93
//! ```

use std::io::Write;
use std::path::Path;

use chrono::{Local, NaiveDateTime, Timelike};

use crate::{detection::sort_by_position, utils::ensure_parent_dir, Detection, Result};

pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

/// `yyyy.mm.dd HH:MM:SS.ffff`, with the fraction truncated to four digits.
pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    format!(
        "{}.{:04}",
        timestamp.format(TIMESTAMP_FORMAT),
        timestamp.nanosecond() % 1_000_000_000 / 100_000
    )
}

/// Writes the header and one line per detection, ordered by position (x, then y).
pub fn write_report<W: Write>(
    mut writer: W,
    detections: &[Detection],
    timestamp: NaiveDateTime,
) -> Result<()> {
    writeln!(writer, "New results. {}", format_timestamp(timestamp))?;

    let mut sorted = detections.to_vec();
    sort_by_position(&mut sorted);

    for (i, det) in sorted.iter().enumerate() {
        let rect = det.pixel_rect();
        writeln!(
            writer,
            "i: {i}, Name:{}, Rect.X: {}, Rect.Y: {}, Rect.Width: {}, Rect.Height: {}, Score: {}",
            det.label, rect.x, rect.y, rect.width, rect.height, det.score
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes the report to `path`, replacing any previous contents, stamped with the local time.
pub fn save_report(path: impl AsRef<Path>, detections: &[Detection]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;

    let file = std::fs::File::create(path)?;
    write_report(
        std::io::BufWriter::new(file),
        detections,
        Local::now().naive_local(),
    )?;

    tracing::info!("report with {} detections saved as {}", detections.len(), path.display());
    Ok(())
}
