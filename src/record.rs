//! Detection artifacts on disk.
//!
//! Layout under the output directory:
//!
//! ```text
//! screenshots/temp_frame_<ts>.jpg      frame in flight, removed or renamed
//! screenshots/pothole_<ts>.jpg         frame with at least one detection
//! logs/pothole_<ts>_data.json          batch record for that frame
//! logs/detection_log_<YYYYMMDD>.log    append-only daily log
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::detect::Detection;
use crate::gps::Location;

pub const SCREENSHOTS_DIR: &str = "screenshots";
pub const LOGS_DIR: &str = "logs";
const TEMP_PREFIX: &str = "temp_frame_";

/// Filename stem shared by a frame's image and JSON record.
pub fn timestamp_stem(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Capture parameters copied into every batch record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub camera_id: String,
}

/// Persisted JSON record for one analyzed frame with detections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub timestamp: String,
    pub analysis_sequence_number: u64,
    pub image_filename: String,
    pub location: Option<Location>,
    pub detections: Vec<Detection>,
    pub total_count: usize,
    pub capture_settings: CaptureSettings,
}

/// Where a recorded batch ended up.
#[derive(Clone, Debug)]
pub struct RecordedBatch {
    pub image_path: PathBuf,
    pub data_path: PathBuf,
    pub count: usize,
}

/// File counts reported in the end-of-session summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArtifactCounts {
    pub images_saved: usize,
    pub data_files: usize,
    pub log_files: usize,
}

/// Append-only text log, one file per calendar day.
///
/// The file name is derived from the write time, so a session that crosses
/// midnight continues in the next day's file.
#[derive(Clone, Debug)]
pub struct DailyLog {
    dir: PathBuf,
}

impl DailyLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, at: DateTime<Local>) -> PathBuf {
        self.dir
            .join(format!("detection_log_{}.log", at.format("%Y%m%d")))
    }

    pub fn current_path(&self) -> PathBuf {
        self.path_for(Local::now())
    }

    pub fn append(&self, message: &str) -> Result<()> {
        self.append_at(Local::now(), message)
    }

    pub fn append_at(&self, at: DateTime<Local>, message: &str) -> Result<()> {
        let path = self.path_for(at);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open daily log {}", path.display()))?;
        writeln!(file, "[{}] {}", at.format("%Y-%m-%d %H:%M:%S"), message)
            .with_context(|| format!("append to {}", path.display()))?;
        Ok(())
    }
}

/// Writes detection images, batch records and the daily log.
pub struct DetectionRecorder {
    screenshots: PathBuf,
    logs: PathBuf,
    daily: DailyLog,
}

impl DetectionRecorder {
    /// Create the output layout under `output_dir`.
    pub fn new(output_dir: &Path) -> Result<Self> {
        let screenshots = output_dir.join(SCREENSHOTS_DIR);
        let logs = output_dir.join(LOGS_DIR);
        for dir in [&screenshots, &logs] {
            fs::create_dir_all(dir)
                .with_context(|| format!("create output directory {}", dir.display()))?;
        }
        Ok(Self {
            daily: DailyLog::new(&logs),
            screenshots,
            logs,
        })
    }

    pub fn screenshots_dir(&self) -> &Path {
        &self.screenshots
    }

    pub fn daily_log(&self) -> &DailyLog {
        &self.daily
    }

    /// Append a line to today's log. Failures are reported but never fatal.
    pub fn log(&self, message: &str) {
        if let Err(err) = self.daily.append(message) {
            log::error!("daily log write failed: {:#}", err);
        }
    }

    pub fn temp_frame_path(&self, stamp: &str) -> PathBuf {
        self.screenshots.join(format!("{}{}.jpg", TEMP_PREFIX, stamp))
    }

    /// Persist the batch, then promote the temporary frame to its final name.
    ///
    /// On error no finished image or record is left behind; the temporary
    /// frame stays for the caller to clean up.
    pub fn record_detections(
        &self,
        temp_frame: &Path,
        stamp: &str,
        sequence: u64,
        detections: &[Detection],
        location: Option<&Location>,
        settings: &CaptureSettings,
    ) -> Result<RecordedBatch> {
        let image_filename = format!("pothole_{}.jpg", stamp);
        let image_path = self.screenshots.join(&image_filename);

        let batch = DetectionBatch {
            timestamp: stamp.to_string(),
            analysis_sequence_number: sequence,
            image_filename: image_filename.clone(),
            location: location.cloned(),
            detections: detections.to_vec(),
            total_count: detections.len(),
            capture_settings: settings.clone(),
        };
        let data_path = self.logs.join(format!("pothole_{}_data.json", stamp));
        let json = serde_json::to_string_pretty(&batch).context("serialize detection batch")?;
        fs::write(&data_path, json)
            .with_context(|| format!("write {}", data_path.display()))?;

        // The image is only promoted once its record exists.
        if let Err(err) = fs::rename(temp_frame, &image_path) {
            remove_if_present(&data_path);
            return Err(anyhow::Error::new(err).context(format!(
                "rename {} to {}",
                temp_frame.display(),
                image_path.display()
            )));
        }

        let mut message = format!(
            "POTHOLE DETECTED - Count: {}, Image: {}",
            detections.len(),
            image_filename
        );
        if let Some(location) = location {
            message.push_str(&format!(
                ", GPS: {:.6},{:.6}",
                location.latitude, location.longitude
            ));
        }
        self.log(&message);

        Ok(RecordedBatch {
            image_path,
            data_path,
            count: detections.len(),
        })
    }

    /// Drop a frame that produced no qualifying detection.
    pub fn discard_frame(&self, temp_frame: &Path, sequence: u64) {
        remove_if_present(temp_frame);
        self.log(&format!(
            "Frame analyzed - No detections (Analysis #{})",
            sequence
        ));
    }

    /// Record a per-frame failure and clean up whatever the frame left behind.
    pub fn record_failure(&self, temp_frame: Option<&Path>, err: &anyhow::Error) {
        if let Some(path) = temp_frame {
            remove_if_present(path);
        }
        self.log(&format!("Analysis failed - Error: {:#}", err));
    }

    /// Count finished artifacts; temporary frames are not images.
    pub fn artifact_counts(&self) -> Result<ArtifactCounts> {
        let images_saved = count_files(&self.screenshots, |name| {
            name.ends_with(".jpg") && !name.starts_with("temp_")
        })?;
        let data_files = count_files(&self.logs, |name| name.ends_with(".json"))?;
        let log_files = count_files(&self.logs, |name| name.ends_with(".log"))?;
        Ok(ArtifactCounts {
            images_saved,
            data_files,
            log_files,
        })
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => log::warn!("failed to remove {}: {}", path.display(), err),
    }
}

fn count_files(dir: &Path, matches: impl Fn(&str) -> bool) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if matches(&entry.file_name().to_string_lossy()) {
            count += 1;
        }
    }
    Ok(count)
}
