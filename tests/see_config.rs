use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use see_kernel::config::SeeConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SEE_CONFIG",
        "SEE_SOURCE_URL",
        "SEE_DETECTOR_MODEL",
        "SEE_DEPTH_MODEL",
        "SEE_DEPTH_INTERVAL_MS",
        "SEE_APPROACH_BOOST",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let cfg = SeeConfig::load().expect("load defaults");
    assert_eq!(cfg.source.url, "stub://front_camera");
    assert_eq!(cfg.depth.input_edge, 252);
    assert_eq!(cfg.depth.patch_size, 14);
    assert_eq!(cfg.depth.min_interval, Duration::from_millis(333));
    assert!(cfg.depth.enabled);
    assert!(cfg.detector.model_path.is_none());
    assert_eq!(cfg.trend.capacity, 5);
    assert_eq!(cfg.context.update_interval, Duration::from_secs(3));
    assert!((cfg.haptic.approach_boost - 0.2).abs() < f32::EPSILON);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "source": { "url": "stub://hallway", "fps": 12, "width": 640, "height": 480, "rotation": 90 },
            "detector": { "min_confidence": 0.4, "input_size": 416 },
            "depth": { "input_edge": 518, "patch_size": 14, "min_interval_ms": 500 },
            "trend": { "capacity": 8, "stale_after_ms": 2000 },
            "context": { "update_interval_ms": 5000 },
            "haptic": { "min_interval_ms": 250, "approach_boost": 0.1 },
            "session": { "empty_streak_limit": 40 }
        }"#,
    );

    std::env::set_var("SEE_CONFIG", file.path());
    std::env::set_var("SEE_SOURCE_URL", "stub://front_door");
    std::env::set_var("SEE_DEPTH_INTERVAL_MS", "400");
    std::env::set_var("SEE_APPROACH_BOOST", "0.3");

    let cfg = SeeConfig::load().expect("load config");
    assert_eq!(cfg.source.url, "stub://front_door");
    assert_eq!(cfg.source.fps, 12);
    assert_eq!(cfg.source.width, 640);
    assert_eq!(cfg.source.rotation, 90);
    assert_eq!(cfg.detector.input_size, 416);
    assert!((cfg.detector.min_confidence - 0.4).abs() < f32::EPSILON);
    assert_eq!(cfg.depth.input_edge, 518);
    assert_eq!(cfg.depth.min_interval, Duration::from_millis(400));
    assert_eq!(cfg.trend.capacity, 8);
    assert_eq!(cfg.trend.stale_after, Duration::from_secs(2));
    assert_eq!(cfg.context.update_interval, Duration::from_secs(5));
    assert_eq!(cfg.haptic.min_interval, Duration::from_millis(250));
    assert!((cfg.haptic.approach_boost - 0.3).abs() < f32::EPSILON);
    assert_eq!(cfg.session.empty_streak_limit, 40);

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let file = write_config(
        ".toml",
        r#"
[source]
url = "stub://kitchen"

[depth]
enabled = false

[haptic]
approach_boost = 0.25
"#,
    );
    std::env::set_var("SEE_CONFIG", file.path());

    let cfg = SeeConfig::load().expect("load toml");
    assert_eq!(cfg.source.url, "stub://kitchen");
    assert!(!cfg.depth.enabled);
    assert!((cfg.haptic.approach_boost - 0.25).abs() < f32::EPSILON);

    clear_env();
}

#[test]
fn model_paths_come_from_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    std::env::set_var("SEE_DETECTOR_MODEL", "/models/detector.onnx");
    std::env::set_var("SEE_DEPTH_MODEL", "/models/depth_anything_v2.onnx");
    let cfg = SeeConfig::load().expect("load config");
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/detector.onnx"))
    );
    assert_eq!(
        cfg.depth.model_path.as_deref(),
        Some(std::path::Path::new("/models/depth_anything_v2.onnx"))
    );

    clear_env();
}

#[test]
fn rejects_edge_that_is_not_whole_patches() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let file = write_config(".json", r#"{ "depth": { "input_edge": 250 } }"#);
    std::env::set_var("SEE_CONFIG", file.path());
    let err = SeeConfig::load().expect_err("edge 250 is not a multiple of 14");
    assert!(err.to_string().contains("multiple of patch_size"));

    clear_env();
}

#[test]
fn rejects_out_of_range_boost() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    std::env::set_var("SEE_APPROACH_BOOST", "0.9");
    assert!(SeeConfig::load().is_err());

    std::env::set_var("SEE_APPROACH_BOOST", "lots");
    let err = SeeConfig::load().expect_err("non-numeric boost");
    assert!(err.to_string().contains("SEE_APPROACH_BOOST"));

    clear_env();
}

#[test]
fn rejects_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let file = write_config(".json", "{ not json");
    std::env::set_var("SEE_CONFIG", file.path());
    let err = SeeConfig::load().expect_err("malformed config");
    assert!(err.to_string().contains("invalid config file"));

    std::env::set_var("SEE_CONFIG", "/nonexistent/see.json");
    let err = SeeConfig::load().expect_err("missing config");
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
