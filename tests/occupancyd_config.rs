use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use wagon_occupancy::config::EngineConfig;
use wagon_occupancy::RetentionPolicy;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "OCCUPANCY_CONFIG",
        "OCCUPANCY_DB_PATH",
        "OCCUPANCY_INPUT_DIR",
        "OCCUPANCY_CAPACITY",
        "OCCUPANCY_EMIT_INTERVAL_SECS",
        "OCCUPANCY_RETENTION",
        "OCCUPANCY_HISTORY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = EngineConfig::load().expect("load defaults");
    assert_eq!(cfg.db_path, "occupancy.db");
    assert_eq!(cfg.input_dir.to_str(), Some("data/detections"));
    assert_eq!(cfg.session.capacity, 25);
    assert_eq!((cfg.session.frame_width, cfg.session.frame_height), (1200, 750));
    assert_eq!(cfg.session.zone.len(), 4);
    assert_eq!(cfg.session.iou_threshold, 0.4);
    assert_eq!(cfg.session.retention, RetentionPolicy::Sticky);
    assert!(cfg.session.emit.history);

    clear_env();
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "wagons_prod.db",
        "input_dir": "/var/lib/occupancy/in",
        "fps": 30.0,
        "session": {
            "capacity": 40,
            "zone": [[0, 0], [600, 0], [600, 400], [0, 400]],
            "size_filter": {"min_width": 15.0},
            "emit": {"min_interval_secs": 2.5}
        },
        "sessions": {
            "wagon_3": {"capacity": 30}
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("OCCUPANCY_CONFIG", file.path());
    std::env::set_var("OCCUPANCY_CAPACITY", "50");
    std::env::set_var("OCCUPANCY_RETENTION", "distance:250");
    std::env::set_var("OCCUPANCY_HISTORY", "false");

    let cfg = EngineConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "wagons_prod.db");
    assert_eq!(cfg.input_dir.to_str(), Some("/var/lib/occupancy/in"));
    assert_eq!(cfg.fps, 30.0);
    assert_eq!(cfg.session.capacity, 50);
    assert_eq!(cfg.session.zone[2], [600.0, 400.0]);
    assert_eq!(cfg.session.size_filter.min_width, 15.0);
    assert_eq!(cfg.session.size_filter.min_height, 40.0);
    assert_eq!(cfg.session.emit.min_interval_secs, 2.5);
    assert!(!cfg.session.emit.history);
    assert_eq!(
        cfg.session.retention,
        RetentionPolicy::DistanceEvict { threshold: 250.0 }
    );
    assert_eq!(cfg.session_config("wagon_3").capacity, 30);
    assert_eq!(cfg.session_config("wagon_9").capacity, 50);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
db_path = "from_toml.db"

[session]
capacity = 18
person_class_id = 1

[session.retention]
policy = "exit_on_leave"
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("OCCUPANCY_CONFIG", file.path());
    std::env::set_var("OCCUPANCY_DB_PATH", "override.db");

    let cfg = EngineConfig::load().expect("load config");
    assert_eq!(cfg.db_path, "override.db");
    assert_eq!(cfg.session.capacity, 18);
    assert_eq!(cfg.session.person_class_id, 1);
    assert_eq!(cfg.session.retention, RetentionPolicy::ExitOnLeave);

    clear_env();
}

#[test]
fn rejects_invalid_configuration() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("OCCUPANCY_CAPACITY", "0");
    let err = EngineConfig::load().expect_err("zero capacity");
    assert!(err.to_string().contains("capacity"), "{}", err);
    clear_env();

    std::env::set_var("OCCUPANCY_RETENTION", "forever");
    assert!(EngineConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"session": {"zone": [[0, 0], [10, 10]]}}"#)
        .expect("write config");
    std::env::set_var("OCCUPANCY_CONFIG", file.path());
    let err = EngineConfig::load().expect_err("two-point zone");
    assert!(err.to_string().contains("at least 3 points"), "{}", err);
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"sessions": {"bad id": {}}}"#)
        .expect("write config");
    std::env::set_var("OCCUPANCY_CONFIG", file.path());
    assert!(EngineConfig::load().is_err());

    clear_env();
}
