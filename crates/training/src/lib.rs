//! Loss, metrics, schedule, callbacks and the explicit training loop for the
//! FPN + DB segmentation network.

#![recursion_limit = "256"]

pub mod callbacks;
pub mod checkpoint;
pub mod config;
pub mod learner;
pub mod loss;
pub mod metric;
pub mod schedule;
pub mod sink;
pub mod util;

pub use callbacks::{Callback, CheckpointCallback, Control, EarlyStopping, EpochReport};
pub use checkpoint::{load_checkpoint, read_meta, save_checkpoint, CheckpointMeta};
pub use config::TrainConfig;
pub use learner::{evaluate, Evaluation, FitOutcome, Learner, LearnerConfig};
pub use loss::SegmentationLoss;
pub use metric::{predict_mask, BestScores, BinaryConfusion, JaccardIndex, ScoreAccumulator};
pub use schedule::LrSchedule;
pub use sink::{JsonlSink, LogSink, MetricSink};
pub use util::{run_train, TrainArgs};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

pub type ADBackend = burn::backend::Autodiff<TrainBackend>;
