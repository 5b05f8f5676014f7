pub mod error;
pub mod labels;
pub mod matching;
pub mod oks;
pub mod params;
pub mod score;
pub mod types;

pub use error::{EvalError, Result};
pub use matching::{greedy_match, Match, MatchResult};
pub use oks::{compare_image, compute_oks, ImageEval, OksMatrix};
pub use params::Params;
pub use score::{Counts, RunningScore, ScoreSummary, ThresholdScore};
pub use types::{Detection, Frame, ImageAnnotation, ImagePrediction, KeypointSet, Point};
