use anyhow::{anyhow, Result};
use serde_json::json;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use pothole_witness::{
    CameraConfig, CameraSource, CaptureLoop, DetectionBatch, DetectionClient, DetectionRecorder,
    GpsMethod, GpsSettings, LocationProvider, RateLimited, RawPrediction, SessionEnd,
    SessionOptions, StopSignal,
};

/// Replays canned responses; answers with no predictions once the script runs out.
struct ScriptedClient {
    script: VecDeque<Result<Vec<RawPrediction>>>,
    calls: Rc<RefCell<usize>>,
}

impl ScriptedClient {
    fn new(script: Vec<Result<Vec<RawPrediction>>>) -> (Self, Rc<RefCell<usize>>) {
        let calls = Rc::new(RefCell::new(0));
        (
            Self {
                script: script.into(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl DetectionClient for ScriptedClient {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn predict(&mut self, image_path: &Path) -> Result<Vec<RawPrediction>> {
        assert!(image_path.is_file(), "frame must exist while it is analyzed");
        *self.calls.borrow_mut() += 1;
        self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn rate_limited() -> Result<Vec<RawPrediction>> {
    Err(anyhow::Error::new(RateLimited {
        service: "scripted".to_string(),
    }))
}

fn session(
    output: &Path,
    camera: &str,
    client: ScriptedClient,
    max_analyses: Option<u64>,
) -> (CaptureLoop<ScriptedClient>, Rc<RefCell<Vec<Duration>>>) {
    let camera = CameraSource::open(CameraConfig {
        device: camera.to_string(),
        width: 64,
        height: 48,
        target_fps: 0,
    })
    .expect("open stub camera");
    let gps = LocationProvider::initialize(&GpsSettings {
        method: GpsMethod::Mock,
        ..GpsSettings::default()
    });
    let recorder = DetectionRecorder::new(output).expect("output dirs");
    let options = SessionOptions {
        capture_interval: Duration::ZERO,
        confidence_threshold: 0.5,
        max_analyses,
        camera_id: camera_id(),
        ..SessionOptions::default()
    };
    let sleeps = Rc::new(RefCell::new(Vec::new()));
    let recorded = sleeps.clone();
    let capture = CaptureLoop::new(camera, gps, client, recorder, options)
        .with_sleep(move |delay| recorded.borrow_mut().push(delay));
    (capture, sleeps)
}

fn camera_id() -> String {
    "stub://road".to_string()
}

fn files_in(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .expect("list dir")
        .map(|entry| entry.expect("entry").path())
        .filter(|path| {
            path.file_name()
                .map_or(false, |name| name.to_string_lossy().ends_with(suffix))
        })
        .collect();
    files.sort();
    files
}

fn daily_log(output: &Path) -> String {
    files_in(&output.join("logs"), ".log")
        .iter()
        .map(|path| fs::read_to_string(path).expect("read log"))
        .collect()
}

fn batches(output: &Path) -> Vec<DetectionBatch> {
    let mut batches: Vec<DetectionBatch> = files_in(&output.join("logs"), "_data.json")
        .iter()
        .map(|path| serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json"))
        .collect();
    batches.sort_by_key(|batch| batch.analysis_sequence_number);
    batches
}

#[test]
fn qualifying_prediction_is_recorded_with_image_json_and_log_line() {
    let output = tempfile::tempdir().expect("tempdir");
    let (client, calls) = ScriptedClient::new(vec![Ok(vec![
        RawPrediction::new(0.8).with_bbox(json!({"left": 5, "top": 6, "right": 30, "bottom": 40})),
        RawPrediction::new(0.3),
    ])]);
    let (capture, _) = session(output.path(), "stub://road", client, Some(1));

    let summary = capture.run().expect("session");

    assert_eq!(*calls.borrow(), 1);
    assert_eq!(summary.end, SessionEnd::AnalysisLimit);
    assert_eq!(summary.analyses, 1);
    assert_eq!(summary.detections, 1);
    assert_eq!(summary.artifacts.images_saved, 1);
    assert_eq!(summary.artifacts.data_files, 1);

    let images = files_in(&output.path().join("screenshots"), ".jpg");
    assert_eq!(images.len(), 1);
    let image_name = images[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(image_name.starts_with("pothole_"));
    assert!(image::open(&images[0]).is_ok());

    let batches = batches(output.path());
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.total_count, 1);
    assert_eq!(batch.analysis_sequence_number, 1);
    assert_eq!(batch.image_filename, image_name);
    assert_eq!(format!("pothole_{}.jpg", batch.timestamp), image_name);
    assert_eq!(batch.capture_settings.width, 64);
    assert_eq!(batch.capture_settings.camera_id, "stub://road");
    assert!(batch.location.is_some());
    let detection = &batch.detections[0];
    assert_eq!(detection.confidence, 0.8);
    assert_eq!(detection.label, "pothole");
    let bbox = detection.bounding_box.expect("bbox");
    assert_eq!((bbox.x1, bbox.y1, bbox.x2, bbox.y2), (5, 6, 30, 40));

    let log = daily_log(output.path());
    assert!(log.contains("Session started - Camera stub://road, Interval 0s"));
    let detected: Vec<&str> = log
        .lines()
        .filter(|line| line.contains("POTHOLE DETECTED"))
        .collect();
    assert_eq!(detected.len(), 1);
    assert!(detected[0].contains(&format!("Count: 1, Image: {}, GPS: ", image_name)));
    assert!(log.contains("Session ended - Total: 1 potholes in 1 analyses"));
}

#[test]
fn frame_without_qualifying_prediction_is_discarded() {
    let output = tempfile::tempdir().expect("tempdir");
    let (client, _) = ScriptedClient::new(vec![Ok(vec![RawPrediction::new(0.3)])]);
    let (capture, _) = session(output.path(), "stub://road", client, Some(1));

    let summary = capture.run().expect("session");

    assert_eq!(summary.detections, 0);
    assert!(files_in(&output.path().join("screenshots"), "").is_empty());
    assert!(files_in(&output.path().join("logs"), ".json").is_empty());
    let log = daily_log(output.path());
    assert_eq!(
        log.matches("Frame analyzed - No detections (Analysis #1)")
            .count(),
        1
    );
}

#[test]
fn sequence_numbers_count_every_analysis() {
    let output = tempfile::tempdir().expect("tempdir");
    let script = (0..4)
        .map(|_| Ok(vec![RawPrediction::new(0.9)]))
        .collect();
    let (client, _) = ScriptedClient::new(script);
    let (capture, _) = session(output.path(), "stub://road", client, Some(4));

    let summary = capture.run().expect("session");

    assert_eq!(summary.analyses, 4);
    let sequences: Vec<u64> = batches(output.path())
        .iter()
        .map(|batch| batch.analysis_sequence_number)
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
    assert_eq!(files_in(&output.path().join("screenshots"), ".jpg").len(), 4);
}

#[test]
fn persistent_rate_limit_abandons_frame_and_session_continues() {
    let output = tempfile::tempdir().expect("tempdir");
    let (client, calls) = ScriptedClient::new(vec![
        rate_limited(),
        rate_limited(),
        rate_limited(),
        Ok(vec![RawPrediction::new(0.95)]),
    ]);
    let (capture, sleeps) = session(output.path(), "stub://road", client, Some(2));

    let summary = capture.run().expect("session");

    assert_eq!(*calls.borrow(), 4);
    assert_eq!(
        *sleeps.borrow(),
        vec![Duration::from_secs(5), Duration::from_secs(10)]
    );
    assert_eq!(summary.analyses, 2);
    assert_eq!(summary.successful_analyses, 1);
    assert_eq!(summary.detections, 1);

    let batches = batches(output.path());
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].analysis_sequence_number, 2);

    let temp_frames: Vec<PathBuf> = files_in(&output.path().join("screenshots"), ".jpg")
        .into_iter()
        .filter(|path| path.to_string_lossy().contains("temp_frame_"))
        .collect();
    assert!(temp_frames.is_empty());

    let log = daily_log(output.path());
    assert!(log.contains("Analysis failed - Error: rate limit exceeded after 3 attempts"));
}

#[test]
fn other_remote_errors_are_not_retried() {
    let output = tempfile::tempdir().expect("tempdir");
    let (client, calls) =
        ScriptedClient::new(vec![Err(anyhow!("landing ai returned HTTP 500: boom"))]);
    let (capture, sleeps) = session(output.path(), "stub://road", client, Some(1));

    let summary = capture.run().expect("session");

    assert_eq!(*calls.borrow(), 1);
    assert!(sleeps.borrow().is_empty());
    assert_eq!(summary.successful_analyses, 0);
    assert!(files_in(&output.path().join("screenshots"), "").is_empty());
    assert!(daily_log(output.path()).contains("Analysis failed - Error: landing ai returned HTTP 500"));
}

#[test]
fn camera_failure_ends_session_with_cleanup() {
    let output = tempfile::tempdir().expect("tempdir");
    let (client, calls) = ScriptedClient::new(Vec::new());
    let (capture, _) = session(output.path(), "stub://road?frames=3", client, None);

    let summary = capture.run().expect("session");

    assert!(matches!(summary.end, SessionEnd::Failed(_)));
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.analyses, 3);
    assert_eq!(*calls.borrow(), 3);

    let log = daily_log(output.path());
    assert!(log.contains("Session error: failed to read from camera"));
    assert!(log
        .trim_end()
        .ends_with("Session ended - Total: 0 potholes in 3 analyses"));
}

#[test]
fn summary_line_every_fifth_successful_analysis() {
    let output = tempfile::tempdir().expect("tempdir");
    let (client, _) = ScriptedClient::new(Vec::new());
    let (capture, _) = session(output.path(), "stub://road", client, Some(10));

    capture.run().expect("session");

    let log = daily_log(output.path());
    assert_eq!(log.matches("Summary: ").count(), 2);
    assert!(log.contains("Summary: 5 analyses, 0 potholes found"));
    assert!(log.contains("Summary: 10 analyses, 0 potholes found"));
}

#[test]
fn stop_request_ends_session_before_next_frame() {
    let output = tempfile::tempdir().expect("tempdir");
    let (client, calls) = ScriptedClient::new(Vec::new());
    let (capture, _) = session(output.path(), "stub://road", client, None);
    let stop = StopSignal::new();
    stop.request();

    let summary = capture.with_stop_signal(stop).run().expect("session");

    assert_eq!(summary.end, SessionEnd::StoppedByUser);
    assert_eq!(summary.analyses, 0);
    assert_eq!(*calls.borrow(), 0);
    let log = daily_log(output.path());
    assert!(log.contains("Session stopped by user"));
    assert!(log.contains("Session ended - Total: 0 potholes in 0 analyses"));
}
