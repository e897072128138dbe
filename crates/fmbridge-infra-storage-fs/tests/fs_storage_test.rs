use fmbridge_infra_storage_fs::FsStorage;
use fmbridge_ports::engine::VolumeModel;
use fmbridge_ports::storage::{BridgeConfig, StorageError, StoragePort};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("fmbridge-{name}-{nanos}"))
}

#[test]
fn missing_config_loads_defaults() {
    let storage = FsStorage::new(temp_dir("missing"));
    let config = storage.load_config().expect("defaults");
    assert_eq!(config, BridgeConfig::default());
    assert_eq!(config.init_timeout_ms, 10_000);
    assert_eq!(config.settings.num_chips, 4);
}

#[test]
fn saved_config_round_trips() {
    let dir = temp_dir("roundtrip");
    let storage = FsStorage::new(dir.clone());

    let mut config = BridgeConfig {
        sample_rate_hz: 48_000,
        block_frames: 256,
        ..BridgeConfig::default()
    };
    config.settings.bank = 72;
    config.settings.volume_model = VolumeModel::Dmx;
    config.settings.loop_enabled = true;

    storage.save_config(&config).expect("save");
    assert!(storage.config_path().exists());
    assert_eq!(storage.load_config().expect("load"), config);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn partial_config_fills_defaults() {
    let dir = temp_dir("partial");
    std::fs::create_dir_all(&dir).expect("dir");
    std::fs::write(
        dir.join("config.json"),
        br#"{ "sample_rate_hz": 22050, "settings": { "deep_tremolo": true } }"#,
    )
    .expect("write");

    let config = FsStorage::new(dir.clone()).load_config().expect("load");
    assert_eq!(config.sample_rate_hz, 22_050);
    assert_eq!(config.command_queue_capacity, 1024);
    assert!(config.settings.deep_tremolo);
    assert!(config.settings.soft_pan);
    assert_eq!(config.settings.num_four_op_channels, -1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn malformed_config_is_a_serde_error() {
    let dir = temp_dir("malformed");
    std::fs::create_dir_all(&dir).expect("dir");
    std::fs::write(dir.join("config.json"), b"{ not json").expect("write");

    let err = FsStorage::new(dir.clone()).load_config().expect_err("bad json");
    assert!(matches!(err, StorageError::Serde(_)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn save_leaves_no_temp_file_behind() {
    let dir = temp_dir("atomic");
    let storage = FsStorage::new(dir.clone());

    storage.save_config(&BridgeConfig::default()).expect("first save");
    let config = BridgeConfig {
        block_frames: 128,
        ..BridgeConfig::default()
    };
    storage.save_config(&config).expect("overwrite");

    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["config.json".to_string()]);
    assert_eq!(storage.load_config().expect("load"), config);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn save_into_a_file_path_fails_without_clobbering() {
    let dir = temp_dir("blocked");
    std::fs::create_dir_all(&dir).expect("dir");
    let blocker = dir.join("not-a-dir");
    std::fs::write(&blocker, b"keep").expect("write");

    let err = FsStorage::new(blocker.clone())
        .save_config(&BridgeConfig::default())
        .expect_err("base dir is a file");
    assert!(matches!(err, StorageError::Io(_)));
    assert_eq!(std::fs::read(&blocker).expect("read"), b"keep".to_vec());

    let _ = std::fs::remove_dir_all(&dir);
}
