use models::{BackboneKind, FpnDbNetConfig};
use std::path::PathBuf;
use training::{LearnerConfig, LrSchedule, TrainConfig};

#[test]
fn empty_file_is_all_defaults() {
    let cfg = TrainConfig::from_toml("").unwrap();
    assert_eq!(cfg, TrainConfig::default());
    assert_eq!(cfg.train.prob_threshold, 0.5);
    assert_eq!(cfg.train.loss.class_weights, [0.1, 1.0]);
}

#[test]
fn partial_sections_fall_back_to_defaults() {
    let raw = r#"
[model]
backbone = "large"

[data]
root = "datasets/polyps"

[data.loader]
target_size = [128, 128]

[train]
epochs = 40
schedule = { kind = "step_decay", lr = 0.001, decay_rate = 0.5, decay_every = 10 }
"#;
    let cfg = TrainConfig::from_toml(raw).unwrap();
    assert_eq!(cfg.model.backbone, BackboneKind::Large);
    assert_eq!(cfg.model.hidden_dim, FpnDbNetConfig::default().hidden_dim);
    assert_eq!(cfg.data.root, PathBuf::from("datasets/polyps"));
    assert_eq!(cfg.data.val_ratio, 0.2);
    assert_eq!(cfg.data.loader.mask_threshold, 127);
    assert_eq!(cfg.train.epochs, 40);
    assert_eq!(cfg.train.batch_size, LearnerConfig::default().batch_size);
    assert!((cfg.train.schedule.lr(10) - 5e-4).abs() < 1e-12);
    assert!(matches!(cfg.train.schedule, LrSchedule::StepDecay { .. }));
    assert_eq!(cfg.output.monitor, "Score 00");
}

#[test]
fn invalid_values_are_rejected() {
    assert!(TrainConfig::from_toml("[model]\nhidden_dim = 255\n").is_err());
    assert!(TrainConfig::from_toml("[train]\nbatch_size = 0\n").is_err());
    assert!(TrainConfig::from_toml("[data]\nval_ratio = 1.5\n").is_err());
}

#[test]
fn reads_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ptrseg.toml");
    std::fs::write(&path, "[output]\ncheckpoint_dir = \"runs/a\"\nearly_stop_threshold = 0.99\n").unwrap();
    let cfg = TrainConfig::from_path(&path).unwrap();
    assert_eq!(cfg.output.checkpoint_dir, PathBuf::from("runs/a"));
    assert_eq!(cfg.output.early_stop_threshold, Some(0.99));
    assert!(TrainConfig::from_path(&dir.path().join("missing.toml")).is_err());
}

#[test]
fn target_size_must_suit_the_backbone() {
    // 112 is a multiple of 16 but not of 32.
    let err = TrainConfig::from_toml("[model]\nbackbone = \"large\"\n").unwrap_err();
    assert!(err.to_string().contains("multiples of 32"), "{err}");

    let cfg = TrainConfig::from_toml(
        "[model]\nbackbone = \"large\"\n\n[data.loader]\ntarget_size = [128, 96]\n",
    )
    .unwrap();
    assert_eq!(cfg.data.loader.target_size, Some((128, 96)));
    assert!(TrainConfig::from_toml("[data.loader]\ntarget_size = [100, 112]\n").is_err());
}
