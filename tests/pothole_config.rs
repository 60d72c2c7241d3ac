use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use pothole_witness::config::PotholeConfig;
use pothole_witness::GpsMethod;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "POTHOLE_CONFIG",
        "POTHOLE_OUTPUT_DIR",
        "POTHOLE_CAMERA_ID",
        "POTHOLE_CAPTURE_INTERVAL",
        "POTHOLE_CONFIDENCE_THRESHOLD",
        "POTHOLE_SHOW_CAMERA",
        "POTHOLE_GPS_METHOD",
        "POTHOLE_GPSD_ADDR",
        "POTHOLE_SERIAL_PORT",
        "POTHOLE_BAUD_RATE",
        "LANDING_AI_ENDPOINT_ID",
        "LANDING_AI_API_KEY",
        "LANDING_AI_PREDICT_URL",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PotholeConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "0");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.session.capture_interval, Duration::from_secs(1));
    assert_eq!(cfg.session.confidence_threshold, 0.5);
    assert!(cfg.session.show_camera);
    assert_eq!(cfg.gps.method, GpsMethod::Auto);
    assert_eq!(cfg.gps.gpsd_addr, "127.0.0.1:2947");
    assert_eq!(cfg.gps.serial_port, "/dev/ttyUSB0");
    assert_eq!(cfg.gps.baud_rate, 9600);
    assert_eq!(cfg.output_dir.to_str(), Some("pothole_detections"));
    assert!(cfg.detector.validate_credentials().is_err());

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "output_dir": "/var/lib/potholes",
            "camera": {"id": "2", "width": 1280, "height": 720},
            "session": {"capture_interval_secs": 2.5, "confidence_threshold": 0.4, "show_camera": false},
            "gps": {"method": "serial", "serial_port": "/dev/ttyACM0", "baud_rate": 4800},
            "landing_ai": {"endpoint_id": "ep-123", "api_key": "land_sk_abc"}
        }"#,
    );
    std::env::set_var("POTHOLE_CONFIG", file.path());
    std::env::set_var("POTHOLE_CONFIDENCE_THRESHOLD", "0.65");
    std::env::set_var("POTHOLE_GPS_METHOD", "mock");
    std::env::set_var("LANDING_AI_API_KEY", "land_sk_from_env");

    let cfg = PotholeConfig::load().expect("load config");

    assert_eq!(cfg.output_dir.to_str(), Some("/var/lib/potholes"));
    assert_eq!(cfg.camera.device, "2");
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(cfg.session.capture_interval, Duration::from_millis(2500));
    assert_eq!(cfg.session.confidence_threshold, 0.65);
    assert!(!cfg.session.show_camera);
    assert_eq!(cfg.gps.method, GpsMethod::Mock);
    assert_eq!(cfg.gps.serial_port, "/dev/ttyACM0");
    assert_eq!(cfg.gps.baud_rate, 4800);
    assert_eq!(cfg.detector.endpoint_id, "ep-123");
    assert_eq!(cfg.detector.api_key, "land_sk_from_env");
    assert!(cfg.detector.validate_credentials().is_ok());

    let options = cfg.session_options();
    assert_eq!(options.camera_id, "2");
    assert_eq!(options.capture_interval, Duration::from_millis(2500));
    assert!(!options.show_status);

    clear_env();
}

#[test]
fn rejects_out_of_range_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("POTHOLE_CONFIDENCE_THRESHOLD", "1.5");
    assert!(PotholeConfig::load().is_err());
    clear_env();

    std::env::set_var("POTHOLE_CAPTURE_INTERVAL", "-1");
    assert!(PotholeConfig::load().is_err());
    clear_env();

    std::env::set_var("POTHOLE_CAPTURE_INTERVAL", "1e30");
    assert!(PotholeConfig::load().is_err());
    clear_env();

    let huge = write_config(r#"{"session": {"capture_interval_secs": 1e30}}"#);
    std::env::set_var("POTHOLE_CONFIG", huge.path());
    assert!(PotholeConfig::load().is_err());
    clear_env();

    std::env::set_var("POTHOLE_GPS_METHOD", "carrier-pigeon");
    assert!(PotholeConfig::load().is_err());
    clear_env();

    std::env::set_var("LANDING_AI_PREDICT_URL", "not a url");
    assert!(PotholeConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{"camera": {"width": 0}}"#);
    std::env::set_var("POTHOLE_CONFIG", file.path());
    assert!(PotholeConfig::load().is_err());

    clear_env();
}

#[test]
fn placeholder_credentials_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LANDING_AI_ENDPOINT_ID", "your-endpoint-id-here");
    std::env::set_var("LANDING_AI_API_KEY", "land_sk_your-api-key-here");
    let cfg = PotholeConfig::load().expect("load config");
    assert!(cfg.detector.validate_credentials().is_err());

    std::env::set_var("LANDING_AI_ENDPOINT_ID", "stub://bench");
    let cfg = PotholeConfig::load().expect("load config");
    assert!(cfg.detector.validate_credentials().is_ok());

    clear_env();
}
