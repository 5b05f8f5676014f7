//! YOLO landmark label files and image lists.
//!
//! Each non-blank line describes one instance, normalized to `[0, 1]`:
//! `class cx cy w h [x1 y1 x2 y2 x3 y3 x4 y4 [score]]`. Lines with only the
//! box carry no landmarks and become sentinel sets.

use std::path::{Path, PathBuf};

use crate::error::{EvalError, Result};
use crate::types::{
    Detection, Frame, ImageAnnotation, ImagePrediction, KeypointSet, Point, COORDS_PER_SET,
    NUM_KEYPOINTS, SENTINEL,
};

const BOX_FIELDS: usize = 5;
const LANDMARK_FIELDS: usize = BOX_FIELDS + COORDS_PER_SET;

/// One parsed label line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelRecord {
    pub class: u32,
    /// Normalized `[cx, cy, w, h]`.
    pub bbox: [f64; 4],
    pub keypoints: KeypointSet,
    pub score: Option<f64>,
}

fn parse_line(line_no: usize, line: &str, allow_score: bool, frame: Frame) -> Result<LabelRecord> {
    let err = |reason: String| EvalError::LabelParse {
        line: line_no,
        reason,
    };
    let fields: Vec<f64> = line
        .split_whitespace()
        .map(|f| {
            f.parse::<f64>()
                .map_err(|_| err(format!("'{f}' is not a number")))
        })
        .collect::<Result<_>>()?;

    let max_fields = if allow_score {
        LANDMARK_FIELDS + 1
    } else {
        LANDMARK_FIELDS
    };
    if fields.len() != BOX_FIELDS && !(LANDMARK_FIELDS..=max_fields).contains(&fields.len()) {
        return Err(err(format!(
            "expected {BOX_FIELDS} or {LANDMARK_FIELDS} fields, got {}",
            fields.len()
        )));
    }
    if fields[0] < 0.0 || fields[0].fract() != 0.0 {
        return Err(err(format!("invalid class id {}", fields[0])));
    }

    let keypoints = if fields.len() >= LANDMARK_FIELDS {
        let mut points = [Point::SENTINEL; NUM_KEYPOINTS];
        for (p, xy) in points
            .iter_mut()
            .zip(fields[BOX_FIELDS..LANDMARK_FIELDS].chunks_exact(2))
        {
            // Missing landmarks stay sentinel instead of being scaled.
            if xy[0] != SENTINEL || xy[1] != SENTINEL {
                *p = Point::new(
                    xy[0] * frame.width as f64,
                    xy[1] * frame.height as f64,
                );
            }
        }
        KeypointSet { points }
    } else {
        KeypointSet::sentinel()
    };

    Ok(LabelRecord {
        class: fields[0] as u32,
        bbox: [fields[1], fields[2], fields[3], fields[4]],
        keypoints,
        score: fields.get(LANDMARK_FIELDS).copied(),
    })
}

fn parse_lines(text: &str, allow_score: bool, frame: Frame) -> Result<Vec<LabelRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| parse_line(i + 1, l, allow_score, frame))
        .collect()
}

/// Parse a ground-truth label file body, scaling landmarks into `frame`.
pub fn parse_ground_truth(text: &str, frame: Frame) -> Result<ImageAnnotation> {
    let records = parse_lines(text, false, frame)?;
    Ok(ImageAnnotation::new(
        frame,
        records.into_iter().map(|r| r.keypoints).collect(),
    ))
}

/// Parse a prediction label file body; a trailing 14th field is the confidence.
pub fn parse_predictions(text: &str, frame: Frame) -> Result<ImagePrediction> {
    let records = parse_lines(text, true, frame)?;
    Ok(ImagePrediction::new(
        frame,
        records
            .into_iter()
            .map(|r| Detection::new(r.keypoints, r.score.unwrap_or(1.0)))
            .collect(),
    ))
}

pub fn load_ground_truth(path: &Path, frame: Frame) -> Result<ImageAnnotation> {
    let text = std::fs::read_to_string(path)?;
    parse_ground_truth(&text, frame)
}

/// Load predictions; a missing file means the detector found nothing.
pub fn load_predictions(path: &Path, frame: Frame) -> Result<ImagePrediction> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_predictions(&text, frame),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(ImagePrediction::new(frame, Vec::new()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Read an image list: one path per line, blank lines skipped.
pub fn read_file_list(path: &Path) -> Result<Vec<PathBuf>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Map `.../JPEGImages/name.jpg` to `.../<labels_dir_name>/name.txt`.
///
/// Only the last `JPEGImages` component is replaced; without one the label
/// sits next to the image.
pub fn label_path_for_image(image: &Path, labels_dir_name: &str) -> PathBuf {
    let mut components: Vec<_> = image
        .components()
        .map(|c| c.as_os_str().to_os_string())
        .collect();
    if let Some(i) = components
        .iter()
        .rposition(|c| c.as_os_str() == "JPEGImages")
    {
        components[i] = labels_dir_name.into();
    }
    let mut out: PathBuf = components.iter().collect();
    out.set_extension("txt");
    out
}
