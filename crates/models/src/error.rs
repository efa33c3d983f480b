use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Configuration errors caught while building modules.
///
/// Shape errors at forward time are preconditions and panic instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("feature pyramid needs at least one input level")]
    NoLevels,
    #[error("output width {out_channels} is not divisible by {levels} pyramid levels")]
    IndivisibleWidth { out_channels: usize, levels: usize },
    #[error("head hidden dim {hidden_dim} must be divisible by 4")]
    IndivisibleHidden { hidden_dim: usize },
    #[error("backbone tap {tap} out of range for {stages} stages")]
    TapOutOfRange { tap: usize, stages: usize },
    #[error("unknown backbone variant {0:?}")]
    UnknownBackbone(String),
}
