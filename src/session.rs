//! The capture loop: acquire a frame, show status, throttle, analyze.
//!
//! A session ends on a stop request (quit key or Ctrl-C), a camera failure,
//! or an optional analysis limit. Camera, GPS and status line are released on
//! every exit path and the daily log always gets a closing line.

use anyhow::{Context, Result};
use chrono::Local;
use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::CameraSource;
use crate::detect::{qualifying_detections, AnalysisContext, DetectionClient, RetryPolicy};
use crate::frame::Frame;
use crate::gps::{Location, LocationProvider};
use crate::record::{timestamp_stem, ArtifactCounts, CaptureSettings, DetectionRecorder};
use crate::ui::{SessionStatus, StatusLine, Ui};

/// Successful analyses between two summary lines.
const SUMMARY_EVERY: u64 = 5;

/// Shared stop flag set by the interrupt handler and the quit-key watcher.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Route Ctrl-C to this signal. Can only be installed once per process.
    pub fn install_ctrlc(&self) -> Result<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            signal.request();
        })
        .context("failed to set Ctrl-C handler")
    }

    /// Request a stop when a line reading `q` arrives on stdin.
    pub fn spawn_quit_key_watcher(&self) {
        let signal = self.clone();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                        signal.request();
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
    }
}

/// Per-session knobs.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub capture_interval: Duration,
    pub confidence_threshold: f64,
    pub show_status: bool,
    pub retry: RetryPolicy,
    /// End the session after this many analyses.
    pub max_analyses: Option<u64>,
    pub camera_id: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_secs(1),
            confidence_threshold: 0.5,
            show_status: false,
            retry: RetryPolicy::default(),
            max_analyses: None,
            camera_id: "0".to_string(),
        }
    }
}

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    StoppedByUser,
    AnalysisLimit,
    Failed(String),
}

/// Totals reported when a session ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u64,
    pub analyses: u64,
    pub successful_analyses: u64,
    pub detections: u64,
    pub artifacts: ArtifactCounts,
    pub end: SessionEnd,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "FINAL SUMMARY:")?;
        writeln!(f, "Total frames captured: {}", self.frames)?;
        writeln!(f, "Frames analyzed: {}", self.analyses)?;
        writeln!(f, "Potholes detected: {}", self.detections)?;
        writeln!(f, "Images saved: {}", self.artifacts.images_saved)?;
        writeln!(f, "Data files created: {}", self.artifacts.data_files)?;
        writeln!(f, "Log files: {}", self.artifacts.log_files)?;
        if let SessionEnd::Failed(reason) = &self.end {
            writeln!(f, "Ended with error: {}", reason)?;
        }
        write!(f, "{}", "=".repeat(50))
    }
}

enum Exit {
    Stopped,
    Limit,
}

/// Drives one detection session.
pub struct CaptureLoop<C: DetectionClient> {
    camera: Option<CameraSource>,
    gps: LocationProvider,
    client: C,
    recorder: DetectionRecorder,
    options: SessionOptions,
    ui: Ui,
    stop: StopSignal,
    sleep: Box<dyn FnMut(Duration)>,
    capture: CaptureSettings,
    frames: u64,
    analyses: u64,
    successful: u64,
    detections: u64,
    last_analysis: Option<Instant>,
    last_stamp: Option<String>,
}

impl<C: DetectionClient> CaptureLoop<C> {
    pub fn new(
        camera: CameraSource,
        gps: LocationProvider,
        client: C,
        recorder: DetectionRecorder,
        options: SessionOptions,
    ) -> Self {
        let (width, height) = camera.resolution();
        let capture = CaptureSettings {
            width,
            height,
            camera_id: options.camera_id.clone(),
        };
        Self {
            camera: Some(camera),
            gps,
            client,
            recorder,
            options,
            ui: Ui::plain(),
            stop: StopSignal::new(),
            sleep: Box::new(std::thread::sleep),
            capture,
            frames: 0,
            analyses: 0,
            successful: 0,
            detections: 0,
            last_analysis: None,
            last_stamp: None,
        }
    }

    pub fn with_ui(mut self, ui: Ui) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Replace the backoff sleep used between rate-limited attempts.
    pub fn with_sleep(mut self, sleep: impl FnMut(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run until a stop condition, then release everything.
    pub fn run(mut self) -> Result<SessionSummary> {
        self.recorder.log(&format!(
            "Session started - Camera {}, Interval {}s",
            self.options.camera_id,
            self.options.capture_interval.as_secs_f64()
        ));
        log::info!(
            "detection session started (client {}, threshold {:.2}, output {})",
            self.client.name(),
            self.options.confidence_threshold,
            self.recorder.screenshots_dir().display()
        );

        let mut status = self
            .options
            .show_status
            .then(|| self.ui.status_line());
        let outcome = self.drive(status.as_mut());

        let end = match outcome {
            Ok(Exit::Stopped) => {
                log::info!("session stopped by user");
                self.recorder.log("Session stopped by user");
                SessionEnd::StoppedByUser
            }
            Ok(Exit::Limit) => SessionEnd::AnalysisLimit,
            Err(err) => {
                log::error!("session error: {:#}", err);
                self.recorder.log(&format!("Session error: {:#}", err));
                SessionEnd::Failed(format!("{:#}", err))
            }
        };

        if let Some(camera) = self.camera.take() {
            camera.release();
        }
        self.gps.close();
        if let Some(status) = status.as_mut() {
            status.close();
        }
        self.recorder.log(&format!(
            "Session ended - Total: {} potholes in {} analyses",
            self.detections, self.analyses
        ));

        Ok(SessionSummary {
            frames: self.frames,
            analyses: self.analyses,
            successful_analyses: self.successful,
            detections: self.detections,
            artifacts: self.recorder.artifact_counts()?,
            end,
        })
    }

    fn drive(&mut self, mut status: Option<&mut StatusLine>) -> Result<Exit> {
        loop {
            if self.stop.is_requested() {
                return Ok(Exit::Stopped);
            }

            let frame = match self.camera.as_mut() {
                Some(camera) => camera.next_frame().context("failed to read from camera")?,
                None => return Ok(Exit::Stopped),
            };
            let location = self.gps.get_location();

            if let Some(status) = status.as_deref_mut() {
                status.update(&SessionStatus {
                    frames: self.frames,
                    analyses: self.analyses,
                    detections: self.detections,
                    next_analysis_in: self.time_until_next_analysis(),
                    location: location.clone(),
                });
                if self.stop.is_requested() {
                    return Ok(Exit::Stopped);
                }
            }

            self.frames += 1;

            if self.time_until_next_analysis() > Duration::ZERO {
                continue;
            }
            self.last_analysis = Some(Instant::now());
            self.analyze(&frame, location, status.as_deref());

            if let Some(limit) = self.options.max_analyses {
                if self.analyses >= limit {
                    return Ok(Exit::Limit);
                }
            }
        }
    }

    fn time_until_next_analysis(&self) -> Duration {
        match self.last_analysis {
            Some(at) => self.options.capture_interval.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Artifact stem for a new analysis, distinct from the previous one.
    fn next_stamp(&mut self) -> String {
        loop {
            let stamp = timestamp_stem(Local::now());
            if self.last_stamp.as_deref() != Some(stamp.as_str()) {
                self.last_stamp = Some(stamp.clone());
                return stamp;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// One analysis. Failures are logged and abandon the frame; they never end
    /// the session.
    fn analyze(&mut self, frame: &Frame, location: Option<Location>, status: Option<&StatusLine>) {
        self.analyses += 1;
        let sequence = self.analyses;
        let stamp = self.next_stamp();
        let temp_frame = self.recorder.temp_frame_path(&stamp);

        let line = match &location {
            Some(location) => format!(
                "Analysis {} (Frame {}): {} at {}",
                sequence,
                self.frames,
                stamp,
                location.coordinates()
            ),
            None => format!("Analysis {} (Frame {}): {}", sequence, self.frames, stamp),
        };
        match status {
            Some(status) => status.println(&line),
            None => log::info!("{}", line),
        }

        match self.submit(frame, &temp_frame, &stamp, sequence, location) {
            Ok(found) => {
                self.successful += 1;
                self.detections += found as u64;
                if found > 0 {
                    log::info!("POTHOLE DETECTED: {} in analysis #{}", found, sequence);
                }
                if self.successful % SUMMARY_EVERY == 0 {
                    let summary = format!(
                        "Summary: {} analyses, {} potholes found",
                        self.analyses, self.detections
                    );
                    log::info!("{}", summary);
                    self.recorder.log(&summary);
                }
            }
            Err(err) => {
                log::error!("analysis #{} failed: {:#}", sequence, err);
                self.recorder.record_failure(Some(&temp_frame), &err);
            }
        }
    }

    fn submit(
        &mut self,
        frame: &Frame,
        temp_frame: &Path,
        stamp: &str,
        sequence: u64,
        location: Option<Location>,
    ) -> Result<usize> {
        frame.write_jpeg(temp_frame)?;

        let policy = self.options.retry;
        let client = &mut self.client;
        let sleep = &mut self.sleep;
        let predictions = policy.run(|delay| (*sleep)(delay), |_| client.predict(temp_frame))?;

        let context = AnalysisContext {
            sequence,
            timestamp: stamp.to_string(),
            location,
        };
        let detections =
            qualifying_detections(&predictions, self.options.confidence_threshold, &context);
        if detections.is_empty() {
            self.recorder.discard_frame(temp_frame, sequence);
            return Ok(0);
        }

        let recorded = self.recorder.record_detections(
            temp_frame,
            stamp,
            sequence,
            &detections,
            context.location.as_ref(),
            &self.capture,
        )?;
        log::info!("saved {}", recorded.image_path.display());
        Ok(recorded.count)
    }
}
