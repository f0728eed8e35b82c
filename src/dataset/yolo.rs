//! YOLO label export
//!
//! One text file per page, one `class x_center y_center width height` line
//! per measure, coordinates relative to the annotated page size.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use super::{MeasureDataset, PageAnnotation};
use crate::detection::{DetectError, DetectResult};

/// YOLO class id for measures
pub const YOLO_MEASURE_CLASS: u32 = 0;

/// Label lines for one page
pub fn to_yolo_lines(page: &PageAnnotation) -> DetectResult<Vec<String>> {
    if page.width == 0 || page.height == 0 {
        return Err(DetectError::InvalidImage(format!(
            "annotation page size is {}x{}",
            page.width, page.height
        )));
    }
    let (w, h) = (page.width as f32, page.height as f32);

    Ok(page
        .system_measures
        .iter()
        .map(|m| {
            let x_center = (m.left + m.width / 2.0) / w;
            let y_center = (m.top + m.height / 2.0) / h;
            format!(
                "{YOLO_MEASURE_CLASS} {x_center} {y_center} {} {}",
                m.width / w,
                m.height / h
            )
        })
        .collect())
}

/// Write `<stem>.txt` for every page of `dataset` into `out_dir`
///
/// Returns the written label paths in dataset order.
pub fn export_labels(dataset: &MeasureDataset, out_dir: &Path) -> DetectResult<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;

    let written = dataset
        .entries()
        .par_iter()
        .map(|entry| -> DetectResult<PathBuf> {
            let page = PageAnnotation::from_file(&entry.annotation_path)?;
            let lines = to_yolo_lines(&page)?;
            let stem = entry
                .image_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let label_path = out_dir.join(format!("{stem}.txt"));
            std::fs::write(&label_path, lines.join("\n"))?;
            Ok(label_path)
        })
        .collect::<DetectResult<Vec<_>>>()?;

    tracing::info!(count = written.len(), out = %out_dir.display(), "wrote YOLO labels");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MeasureAnnotation;

    fn page(measures: Vec<MeasureAnnotation>) -> PageAnnotation {
        PageAnnotation {
            width: 200,
            height: 100,
            system_measures: measures,
        }
    }

    #[test]
    fn test_yolo_line_is_normalized() {
        let lines = to_yolo_lines(&page(vec![MeasureAnnotation {
            left: 50.0,
            top: 25.0,
            width: 100.0,
            height: 50.0,
        }]))
        .unwrap();
        assert_eq!(lines, vec!["0 0.5 0.5 0.5 0.5"]);
    }

    #[test]
    fn test_no_measures_no_lines() {
        assert!(to_yolo_lines(&page(vec![])).unwrap().is_empty());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut p = page(vec![]);
        p.width = 0;
        assert!(to_yolo_lines(&p).is_err());
    }

    #[test]
    fn test_export_writes_one_file_per_page() {
        let root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["a", "b"] {
            let img_dir = root.path().join("score/img");
            let json_dir = root.path().join("score/json");
            std::fs::create_dir_all(&img_dir).unwrap();
            std::fs::create_dir_all(&json_dir).unwrap();
            image::GrayImage::new(4, 4)
                .save(img_dir.join(format!("{name}.png")))
                .unwrap();
            std::fs::write(
                json_dir.join(format!("{name}.json")),
                r#"{"width": 100, "height": 100, "system_measures": [
                    {"left": 0, "top": 0, "width": 50, "height": 20},
                    {"left": 50, "top": 0, "width": 50, "height": 20}
                ]}"#,
            )
            .unwrap();
        }

        let dataset = MeasureDataset::open(root.path(), 0).unwrap();
        let written = export_labels(&dataset, out.path()).unwrap();
        assert_eq!(written.len(), 2);

        let text = std::fs::read_to_string(out.path().join("a.txt")).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec!["0 0.25 0.1 0.5 0.2", "0 0.75 0.1 0.5 0.2"]);
    }
}
