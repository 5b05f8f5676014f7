use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use pose_eval::labels::{label_path_for_image, load_ground_truth, load_predictions, read_file_list};
use pose_eval::{Frame, ImageAnnotation, ImagePrediction, Params, RunningScore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pose-eval")]
#[command(
    about = "OKS keypoint evaluation tool — compute AP/AR for four-landmark detections from YOLO label files"
)]
struct Cli {
    /// Text file listing evaluated images, one path per line
    #[arg(long)]
    images: PathBuf,

    /// Directory holding one prediction label file per image (<stem>.txt)
    #[arg(long)]
    pred_dir: PathBuf,

    /// Directory name that replaces `JPEGImages` in image paths to locate ground truth
    #[arg(long, default_value = "labels")]
    labels_dir_name: String,

    /// JSON file with evaluation parameters
    #[arg(long)]
    params: Option<PathBuf>,

    /// Reference frame width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Reference frame height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// OKS thresholds (comma-separated, e.g., "0.5,0.75")
    #[arg(long, value_delimiter = ',')]
    oks_thr: Option<Vec<f64>>,

    /// Minimum OKS for a pair to be matched
    #[arg(long)]
    match_thr: Option<f64>,

    /// Abort on the first malformed image instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn load_params(cli: &Cli) -> anyhow::Result<Params> {
    let mut params = match &cli.params {
        Some(path) => Params::from_json_file(path)
            .with_context(|| format!("loading params from {}", path.display()))?,
        None => Params::new(),
    };
    if let Some(w) = cli.width {
        params.frame.width = w;
    }
    if let Some(h) = cli.height {
        params.frame.height = h;
    }
    if let Some(thrs) = &cli.oks_thr {
        params.oks_thrs = thrs.clone();
    }
    if let Some(t) = cli.match_thr {
        params.match_threshold = t;
    }
    params.validate()?;
    Ok(params)
}

fn load_image(
    image: &Path,
    cli: &Cli,
    frame: Frame,
) -> anyhow::Result<(ImageAnnotation, ImagePrediction)> {
    let gt_path = label_path_for_image(image, &cli.labels_dir_name);
    let gt = load_ground_truth(&gt_path, frame)
        .with_context(|| format!("ground truth {}", gt_path.display()))?;

    let Some(stem) = image.file_stem() else {
        bail!("image path {} has no file name", image.display());
    };
    let pred_path = cli.pred_dir.join(Path::new(stem).with_extension("txt"));
    let pred = load_predictions(&pred_path, frame)
        .with_context(|| format!("predictions {}", pred_path.display()))?;
    Ok((gt, pred))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let params = load_params(&cli)?;

    tracing::info!("Loading image list from {:?}...", cli.images);
    let image_paths = read_file_list(&cli.images)
        .with_context(|| format!("reading image list {}", cli.images.display()))?;

    tracing::info!("Loading labels for {} images...", image_paths.len());
    let mut images = Vec::with_capacity(image_paths.len());
    for path in &image_paths {
        match load_image(path, &cli, params.frame) {
            Ok(pair) => images.push(pair),
            Err(e) if !cli.strict => {
                tracing::warn!(image = %path.display(), error = %format!("{e:#}"), "skipping image");
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!("Evaluating...");
    let mut score = RunningScore::new(params)?;
    score.extend_par(&images)?;

    tracing::info!("Accumulating...");
    let summary = score.finalize();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
        // Machine-readable stats line for parity testing
        let stats_strs: Vec<String> = summary.stats().iter().map(|v| format!("{:.15}", v)).collect();
        println!("stats: [{}]", stats_strs.join(", "));
    }

    Ok(())
}
