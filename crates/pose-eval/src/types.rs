use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Number of landmarks in every keypoint set (the 4 object corners).
pub const NUM_KEYPOINTS: usize = 4;

/// Number of scalar coordinates in one keypoint set.
pub const COORDS_PER_SET: usize = NUM_KEYPOINTS * 2;

/// Coordinate value marking a landmark that was not annotated.
pub const SENTINEL: f64 = -1.0;

/// A single landmark in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const SENTINEL: Point = Point {
        x: SENTINEL,
        y: SENTINEL,
    };

    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Whether this point is the `(-1, -1)` "not annotated" placeholder.
    pub fn is_sentinel(&self) -> bool {
        self.x == SENTINEL && self.y == SENTINEL
    }

    pub fn dist_sq(&self, other: &Point) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }
}

/// The 4 ordered landmarks of one object instance.
///
/// Point `i` of a ground-truth set only ever compares with point `i` of a
/// predicted set; there is no permutation search.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct KeypointSet {
    pub points: [Point; NUM_KEYPOINTS],
}

impl KeypointSet {
    pub fn new(points: [[f64; 2]; NUM_KEYPOINTS]) -> Self {
        KeypointSet {
            points: points.map(|[x, y]| Point::new(x, y)),
        }
    }

    /// A set carrying no landmark information (box-only annotation).
    pub fn sentinel() -> Self {
        KeypointSet {
            points: [Point::SENTINEL; NUM_KEYPOINTS],
        }
    }

    /// Build a set from `[x1, y1, x2, y2, x3, y3, x4, y4]`.
    pub fn from_flat(coords: &[f64]) -> Result<Self> {
        if coords.len() != COORDS_PER_SET {
            return Err(EvalError::shape(
                format!("{COORDS_PER_SET} coordinates"),
                format!("{}", coords.len()),
            ));
        }
        let mut points = [Point::SENTINEL; NUM_KEYPOINTS];
        for (p, xy) in points.iter_mut().zip(coords.chunks_exact(2)) {
            *p = Point::new(xy[0], xy[1]);
        }
        Ok(KeypointSet { points })
    }

    /// Flatten back to `[x1, y1, ..., x4, y4]`.
    pub fn to_flat(&self) -> [f64; COORDS_PER_SET] {
        let mut out = [0.0; COORDS_PER_SET];
        for (k, p) in self.points.iter().enumerate() {
            out[k * 2] = p.x;
            out[k * 2 + 1] = p.y;
        }
        out
    }

    /// True when every landmark is a sentinel.
    pub fn is_degenerate(&self) -> bool {
        self.points.iter().all(Point::is_sentinel)
    }

    /// Bounding box `[x, y, w, h]` of the non-sentinel landmarks.
    pub fn bbox(&self) -> Option<[f64; 4]> {
        let mut it = self.points.iter().filter(|p| !p.is_sentinel()).peekable();
        it.peek()?;
        let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
        let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in it {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Some([x0, y0, x1 - x0, y1 - y0])
    }

    /// Area of [`Self::bbox`]; the squared OKS scale. Zero for degenerate sets.
    pub fn area(&self) -> f64 {
        self.bbox().map(|bb| bb[2] * bb[3]).unwrap_or(0.0)
    }
}

/// Split a flat coordinate buffer into keypoint sets of 8 values each.
pub fn keypoint_sets_from_flat(coords: &[f64]) -> Result<Vec<KeypointSet>> {
    if coords.len() % COORDS_PER_SET != 0 {
        return Err(EvalError::shape(
            format!("a multiple of {COORDS_PER_SET} coordinates"),
            format!("{}", coords.len()),
        ));
    }
    coords
        .chunks_exact(COORDS_PER_SET)
        .map(KeypointSet::from_flat)
        .collect()
}

/// The pixel canvas both ground truth and predictions are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        Frame { width, height }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Frame {
            width: 640,
            height: 400,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// All ground-truth keypoint sets of one image.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ImageAnnotation {
    pub frame: Frame,
    pub sets: Vec<KeypointSet>,
}

impl ImageAnnotation {
    pub fn new(frame: Frame, sets: Vec<KeypointSet>) -> Self {
        ImageAnnotation { frame, sets }
    }

    pub fn from_flat(frame: Frame, coords: &[f64]) -> Result<Self> {
        Ok(ImageAnnotation {
            frame,
            sets: keypoint_sets_from_flat(coords)?,
        })
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// One detector output: landmarks plus confidence.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Detection {
    pub keypoints: KeypointSet,
    /// Detector confidence; only used to rank detections for precision/recall.
    #[serde(default = "default_score")]
    pub score: f64,
}

fn default_score() -> f64 {
    1.0
}

impl Detection {
    pub fn new(keypoints: KeypointSet, score: f64) -> Self {
        Detection { keypoints, score }
    }
}

impl From<KeypointSet> for Detection {
    fn from(keypoints: KeypointSet) -> Self {
        Detection {
            keypoints,
            score: default_score(),
        }
    }
}

/// All detections of one image, already suppressed and rescaled upstream.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ImagePrediction {
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

impl ImagePrediction {
    pub fn new(frame: Frame, detections: Vec<Detection>) -> Self {
        ImagePrediction { frame, detections }
    }

    /// Detections without confidences; every score defaults to 1.0.
    pub fn from_sets(frame: Frame, sets: Vec<KeypointSet>) -> Self {
        ImagePrediction {
            frame,
            detections: sets.into_iter().map(Detection::from).collect(),
        }
    }

    pub fn from_flat(frame: Frame, coords: &[f64]) -> Result<Self> {
        Ok(Self::from_sets(frame, keypoint_sets_from_flat(coords)?))
    }

    pub fn with_scores(frame: Frame, coords: &[f64], scores: &[f64]) -> Result<Self> {
        let sets = keypoint_sets_from_flat(coords)?;
        if sets.len() != scores.len() {
            return Err(EvalError::shape(
                format!("{} scores", sets.len()),
                format!("{}", scores.len()),
            ));
        }
        let detections = sets
            .into_iter()
            .zip(scores)
            .map(|(kp, &s)| Detection::new(kp, s))
            .collect();
        Ok(ImagePrediction { frame, detections })
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
