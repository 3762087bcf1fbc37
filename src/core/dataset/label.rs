use std::fs;
use std::path::Path;
use tracing::{debug, trace};

use crate::core::operations::write_atomic;
use crate::error::MergeResult;

/// One YOLO box: class id plus normalized center/size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloDetection {
    pub class_id: u32,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl YoloDetection {
    /// Same box with a different class id.
    pub fn with_class(self, class_id: u32) -> Self {
        Self { class_id, ..self }
    }

    /// Format as a label line with 6 decimal places.
    pub fn to_line(&self) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }

    /// Parse one label line.
    ///
    /// Returns `None` for blank lines, lines with fewer than 5 fields, and
    /// lines with non-numeric values or a negative class. The class field
    /// accepts integral floats such as `3.0`. Extra fields are ignored.
    pub fn parse_line(line: &str) -> Option<Self> {
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() < 5 {
            return None;
        }

        let class_id = parse_class_id(values[0])?;
        let coord = |s: &str| s.parse::<f64>().ok().filter(|v| v.is_finite());

        Some(YoloDetection {
            class_id,
            x_center: coord(values[1])?,
            y_center: coord(values[2])?,
            width: coord(values[3])?,
            height: coord(values[4])?,
        })
    }
}

fn parse_class_id(raw: &str) -> Option<u32> {
    if let Ok(id) = raw.parse::<u32>() {
        return Some(id);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value <= u32::MAX as f64 {
        Some(value.trunc() as u32)
    } else {
        None
    }
}

/// Parse a YOLO format label file.
///
/// A missing or unreadable file means "no boxes". Malformed rows are skipped
/// individually; the remaining rows of the file are still returned.
pub fn parse_label_file(label_path: &Path) -> Vec<YoloDetection> {
    let content = match fs::read_to_string(label_path) {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Unreadable label file {:?}: {}", label_path, e);
            }
            return Vec::new();
        }
    };

    let mut detections = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match YoloDetection::parse_line(line) {
            Some(detection) => detections.push(detection),
            None => trace!("Skipping malformed label row in {:?}: {:?}", label_path, line),
        }
    }
    detections
}

/// Write detections to a label file atomically (`<name>.tmp` then rename).
/// An empty slice produces an empty file.
pub fn save_label_file(label_path: &Path, detections: &[YoloDetection]) -> MergeResult<()> {
    let mut content = String::new();
    for detection in detections {
        content.push_str(&detection.to_line());
        content.push('\n');
    }
    write_atomic(label_path, content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: u32, x: f64, y: f64, w: f64, h: f64) -> YoloDetection {
        YoloDetection {
            class_id,
            x_center: x,
            y_center: y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn test_parse_line_valid() {
        let d = YoloDetection::parse_line("1 0.5 0.25 0.1 0.2").unwrap();
        assert_eq!(d, det(1, 0.5, 0.25, 0.1, 0.2));
    }

    #[test]
    fn test_parse_line_float_class_and_extra_fields() {
        let d = YoloDetection::parse_line("3.0 0.5 0.5 0.1 0.1 0.9").unwrap();
        assert_eq!(d.class_id, 3);
    }

    #[test]
    fn test_parse_line_rejects_malformed() {
        assert!(YoloDetection::parse_line("0 0.5 0.5 0.1").is_none());
        assert!(YoloDetection::parse_line("cat 0.5 0.5 0.1 0.1").is_none());
        assert!(YoloDetection::parse_line("0 0.5 x 0.1 0.1").is_none());
        assert!(YoloDetection::parse_line("-1 0.5 0.5 0.1 0.1").is_none());
        assert!(YoloDetection::parse_line("0 NaN 0.5 0.1 0.1").is_none());
    }

    #[test]
    fn test_parse_label_file_skips_bad_rows_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(
            &path,
            "0 0.5 0.5 0.2 0.2\n\ngarbage line\n1 0.1 0.1\n# comment\n2 0.3 0.3 0.1 0.1\n",
        )
        .unwrap();

        let rows = parse_label_file(&path);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].class_id, 0);
        assert_eq!(rows[1].class_id, 2);
    }

    #[test]
    fn test_missing_label_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_label_file(&dir.path().join("nope.txt")).is_empty());
    }

    #[test]
    fn test_save_then_parse_keeps_six_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels/img.txt");
        let rows = vec![
            det(0, 0.123456789, 0.5, 0.25, 0.75),
            det(4, 1.0, 0.0, 0.333333333, 0.1),
        ];
        save_label_file(&path, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "0 0.123457 0.500000 0.250000 0.750000\n4 1.000000 0.000000 0.333333 0.100000\n"
        );

        let back = parse_label_file(&path);
        assert_eq!(back.len(), 2);
        for (a, b) in rows.iter().zip(&back) {
            assert_eq!(a.class_id, b.class_id);
            assert!((a.x_center - b.x_center).abs() < 5e-7);
            assert!((a.width - b.width).abs() < 5e-7);
        }
    }

    #[test]
    fn test_save_empty_rows_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        save_label_file(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
