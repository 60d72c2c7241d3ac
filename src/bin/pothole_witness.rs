//! pothole_witness - Camera + GPS pothole logger backed by a remote detector.
//!
//! Modes:
//! 1. detect - capture frames, analyze one per interval, record detections
//! 2. camera - five-second camera preview
//! 3. gps    - thirty seconds of GPS readings, one every two seconds
//!
//! Without `--mode` an interactive menu asks which one to run.

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

use pothole_witness::diagnostics::{camera_preview, gps_readings};
use pothole_witness::ui::Ui;
use pothole_witness::{
    client_from_settings, CameraSource, CaptureLoop, DetectionRecorder, LocationProvider,
    PotholeConfig, SessionEnd, StopSignal,
};

const CAMERA_PREVIEW: Duration = Duration::from_secs(5);
const GPS_TEST_READINGS: usize = 15;
const GPS_TEST_EVERY: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Full detection session with GPS tagging.
    Detect,
    /// Camera smoke test.
    Camera,
    /// GPS smoke test.
    Gps,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Capture road frames, tag them with GPS and log potholes found by a remote detector"
)]
struct Args {
    /// Skip the menu and run this mode.
    #[arg(long, value_enum, env = "POTHOLE_MODE")]
    mode: Option<Mode>,

    /// Camera identifier: index, device path, or stub://name.
    #[arg(long)]
    camera: Option<String>,

    /// Frame width.
    #[arg(long)]
    width: Option<u32>,

    /// Frame height.
    #[arg(long)]
    height: Option<u32>,

    /// Seconds between analyses.
    #[arg(long)]
    interval: Option<f64>,

    /// Minimum confidence for a detection.
    #[arg(long)]
    threshold: Option<f64>,

    /// Disable the live status line and quit key.
    #[arg(long)]
    no_display: bool,

    /// GPS method (auto|gpsd|serial|mock).
    #[arg(long)]
    gps: Option<String>,

    /// Serial port of a USB GPS receiver.
    #[arg(long)]
    serial_port: Option<String>,

    /// Output directory for screenshots and logs.
    #[arg(long)]
    output_dir: Option<String>,

    /// Stop after this many analyses.
    #[arg(long, env = "POTHOLE_MAX_ANALYSES")]
    max_analyses: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn apply(&self, config: &mut PotholeConfig) -> Result<()> {
        if let Some(camera) = &self.camera {
            config.camera.device = camera.clone();
        }
        if let Some(width) = self.width {
            config.camera.width = width;
        }
        if let Some(height) = self.height {
            config.camera.height = height;
        }
        if let Some(interval) = self.interval {
            config.session.capture_interval = Duration::try_from_secs_f64(interval)
                .map_err(|e| anyhow!("--interval must be a non-negative number of seconds: {}", e))?;
        }
        if let Some(threshold) = self.threshold {
            config.session.confidence_threshold = threshold;
        }
        if self.no_display {
            config.session.show_camera = false;
        }
        if let Some(method) = &self.gps {
            config.gps.method = method.parse()?;
        }
        if let Some(port) = &self.serial_port {
            config.gps.serial_port = port.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.into();
        }
        config.validate()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = PotholeConfig::load()?;
    args.apply(&mut config)?;

    let is_tty = io::stderr().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mode = match args.mode {
        Some(mode) => mode,
        None => match prompt_menu()? {
            Some(mode) => mode,
            None => {
                println!("Invalid choice");
                return Ok(());
            }
        },
    };

    let stop = StopSignal::new();
    stop.install_ctrlc()?;

    match mode {
        Mode::Detect => run_detection(&config, &args, &ui, &stop),
        Mode::Camera => run_camera_test(&config, &stop),
        Mode::Gps => run_gps_test(&config, &stop),
    }
}

fn prompt_menu() -> Result<Option<Mode>> {
    println!("POTHOLE DETECTION WITH GPS");
    println!("{}", "=".repeat(40));
    println!("1. Start Detection with GPS");
    println!("2. Test Camera Only");
    println!("3. Test GPS Only");
    print!("\nEnter choice (1-3): ");
    io::stdout().flush()?;

    let mut choice = String::new();
    io::stdin().lock().read_line(&mut choice)?;
    Ok(match choice.trim() {
        "1" => Some(Mode::Detect),
        "2" => Some(Mode::Camera),
        "3" => Some(Mode::Gps),
        _ => None,
    })
}

fn run_detection(config: &PotholeConfig, args: &Args, ui: &Ui, stop: &StopSignal) -> Result<()> {
    config.detector.validate_credentials()?;

    let camera = {
        let _stage = ui.stage("Open camera");
        CameraSource::open(config.camera.clone())?
    };
    let gps = {
        let _stage = ui.stage("Initialize GPS");
        LocationProvider::initialize(&config.gps)
    };
    let client = client_from_settings(&config.detector)?;
    let recorder = DetectionRecorder::new(&config.output_dir)?;
    log::info!("writing detections under {}", config.output_dir.display());

    let mut options = config.session_options();
    options.max_analyses = args.max_analyses;
    if options.show_status {
        stop.spawn_quit_key_watcher();
        eprintln!("Press 'q' then Enter (or Ctrl-C) to stop");
    }

    let summary = CaptureLoop::new(camera, gps, client, recorder, options)
        .with_ui(ui.clone())
        .with_stop_signal(stop.clone())
        .run()?;
    println!("{summary}");

    match summary.end {
        SessionEnd::Failed(reason) => Err(anyhow!("session ended with error: {}", reason)),
        SessionEnd::StoppedByUser | SessionEnd::AnalysisLimit => Ok(()),
    }
}

fn run_camera_test(config: &PotholeConfig, stop: &StopSignal) -> Result<()> {
    println!("Testing camera {}...", config.camera.device);
    println!(
        "Showing {}-second preview (Ctrl-C to skip)",
        CAMERA_PREVIEW.as_secs()
    );
    let check = camera_preview(config.camera.clone(), CAMERA_PREVIEW, stop)?;
    println!(
        "Camera test complete - {} frames at {}x{} in {:.1}s",
        check.stats.frames_captured,
        check.resolution.0,
        check.resolution.1,
        check.elapsed.as_secs_f64()
    );
    Ok(())
}

fn run_gps_test(config: &PotholeConfig, stop: &StopSignal) -> Result<()> {
    println!("Testing GPS...");
    println!(
        "Getting GPS readings for {} seconds...",
        GPS_TEST_READINGS as u64 * GPS_TEST_EVERY.as_secs()
    );
    let mut successful = 0;
    let check = gps_readings(
        &config.gps,
        GPS_TEST_READINGS,
        GPS_TEST_EVERY,
        stop,
        |_, reading| match reading {
            Some(location) => {
                successful += 1;
                println!(
                    "Reading {}: {} (Sats: {})",
                    successful,
                    location.coordinates(),
                    location.satellite_count
                );
            }
            None => println!("No GPS fix available"),
        },
    );
    println!(
        "GPS test complete - {} successful readings",
        check.successful()
    );
    Ok(())
}
