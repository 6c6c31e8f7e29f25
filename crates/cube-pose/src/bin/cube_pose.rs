//! cube-pose CLI: intrinsics, synthetic scenarios and per-frame estimation.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use cube_pose::core::{CameraIntrinsics, CameraPose, MarkerGeometryParams};
use cube_pose::{
    CaptureTarget, CubePoseEstimator, EstimatorParams, FixedDetections, MarkerDetection,
    SimCameraPose, StaticScene,
};
use image::{ImageReader, RgbImage};
use log::LevelFilter;
use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "cube-pose")]
#[command(about = "Estimate the world position of a marker-tagged cube from a camera frame")]
#[command(version)]
struct Cli {
    /// Log level for the stderr logger.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print pinhole intrinsics for a resolution and vertical field of view.
    Intrinsics {
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        /// Vertical field of view in degrees.
        #[arg(long, default_value_t = 90.0)]
        fovy: f64,
    },

    /// Write a synthetic scenario with projected marker corners.
    Synth(SynthArgs),

    /// Run the estimator on a scenario file and validate against ground truth.
    Estimate {
        /// Scenario JSON.
        scenario: PathBuf,
        /// Where to write the frame report (stdout when omitted).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct SynthArgs {
    /// Camera position in world coordinates, `x,y,z`.
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    camera_pos: Point3<f64>,

    /// Point the camera looks at (default: center of the marker face).
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    target: Option<Point3<f64>>,

    /// True cube center in world coordinates.
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true, default_value = "-0.3,-0.3,0.05")]
    cube: Point3<f64>,

    #[arg(long, default_value_t = 0.1)]
    marker_size: f64,

    #[arg(long, default_value_t = 0)]
    marker_id: u32,

    /// Where to write the scenario (stdout when omitted).
    #[arg(long)]
    out: Option<PathBuf>,
}

/// Scenario file consumed by `estimate` and produced by `synth`.
#[derive(Debug, Serialize, Deserialize)]
struct Scenario {
    #[serde(default)]
    params: EstimatorParams,
    scene: StaticScene,
    camera_name: String,
    body_name: String,
    /// Detections replayed in place of a live detector.
    #[serde(default)]
    detections: Vec<MarkerDetection>,
    /// Frame to process; a blank frame is used when omitted.
    #[serde(default)]
    image_path: Option<PathBuf>,
    #[serde(default)]
    capture: Option<CaptureTarget>,
}

#[derive(Serialize)]
struct IntrinsicsReport {
    #[serde(flatten)]
    intrinsics: CameraIntrinsics,
    k: [[f64; 3]; 3],
    /// OpenCV order `(k1, k2, p1, p2)`.
    dist_coeffs: [f64; 4],
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.into())?;

    match cli.command {
        Commands::Intrinsics {
            width,
            height,
            fovy,
        } => run_intrinsics(width, height, fovy),
        Commands::Synth(args) => run_synth(&args),
        Commands::Estimate { scenario, out } => run_estimate(&scenario, out.as_deref()),
    }
}

#[cfg(feature = "tracing")]
fn init_logging(_level: LevelFilter) -> CliResult<()> {
    cube_pose::core::init_tracing(false);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LevelFilter) -> CliResult<()> {
    cube_pose::core::init_with_level(level)?;
    Ok(())
}

fn parse_point(s: &str) -> Result<Point3<f64>, String> {
    let parts = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate in `{s}`: {e}"))?;
    match parts.as_slice() {
        [x, y, z] => Ok(Point3::new(*x, *y, *z)),
        _ => Err(format!("expected `x,y,z`, got `{s}`")),
    }
}

fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, json)?;
            log::info!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ── intrinsics ─────────────────────────────────────────────────────────

fn run_intrinsics(width: u32, height: u32, fovy: f64) -> CliResult<()> {
    let intrinsics = CameraIntrinsics::from_fovy(width, height, fovy)?;
    let m = intrinsics.matrix();
    let report = IntrinsicsReport {
        k: [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ],
        dist_coeffs: intrinsics.distortion().coefficients(),
        intrinsics,
    };
    write_json(&report, None)
}

// ── synth ──────────────────────────────────────────────────────────────

fn run_synth(args: &SynthArgs) -> CliResult<()> {
    let params = EstimatorParams {
        marker: MarkerGeometryParams {
            marker_size: args.marker_size,
            ..MarkerGeometryParams::default()
        },
        ..EstimatorParams::default()
    };
    let geometry = params.marker.build()?;
    let intrinsics = params.camera.intrinsics()?;

    // Object frame is axis aligned with the world, offset to the true cube.
    let offset = args.cube - geometry.cube_center();
    let target = args.target.unwrap_or(geometry.face_center() + offset);
    let camera = CameraPose::look_at(args.camera_pos, target, Vector3::z())
        .ok_or("camera position and target give a degenerate view")?;

    let mut corners = [Point2::origin(); 4];
    for (px, p) in corners.iter_mut().zip(geometry.corners()) {
        *px = intrinsics
            .project(&camera.world_to_camera(&(*p + offset)))
            .ok_or("marker corner is behind the camera")?;
    }
    if !corners.iter().all(|px| intrinsics.contains(px)) {
        log::warn!("some marker corners fall outside the image");
    }

    let scenario = Scenario {
        params,
        scene: StaticScene::default()
            .with_camera("camera", SimCameraPose::from_camera_pose(&camera))
            .with_body("cube", args.cube),
        camera_name: "camera".to_owned(),
        body_name: "cube".to_owned(),
        detections: vec![MarkerDetection::new(args.marker_id, corners)],
        image_path: None,
        capture: None,
    };
    write_json(&scenario, args.out.as_deref())
}

// ── estimate ───────────────────────────────────────────────────────────

fn run_estimate(path: &Path, out: Option<&Path>) -> CliResult<()> {
    let scenario: Scenario = {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)?
    };

    let estimator =
        CubePoseEstimator::from_scene(scenario.params, &scenario.scene, &scenario.camera_name)?;
    let image = match &scenario.image_path {
        Some(p) => ImageReader::open(p)?.decode()?.to_rgb8(),
        None => {
            let k = estimator.intrinsics();
            RgbImage::new(k.width, k.height)
        }
    };
    let detector = FixedDetections(scenario.detections);

    let report = estimator.process_frame(
        &image,
        &detector,
        &scenario.scene,
        &scenario.body_name,
        scenario.capture.as_ref(),
    )?;
    write_json(&report, out)?;
    report.check()?;
    Ok(())
}
