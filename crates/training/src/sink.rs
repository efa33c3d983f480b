use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Destination for per-epoch metric maps.
pub trait MetricSink {
    fn emit(&mut self, epoch: usize, metrics: &BTreeMap<String, f32>) -> anyhow::Result<()>;
}

/// Writes each metric as a `log::info!` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn emit(&mut self, epoch: usize, metrics: &BTreeMap<String, f32>) -> anyhow::Result<()> {
        for (name, value) in metrics {
            log::info!("[epoch {epoch}] {name}: {value:.4}");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonlRecord<'a> {
    epoch: usize,
    metrics: &'a BTreeMap<String, f32>,
}

/// Appends one JSON object per epoch.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricSink for JsonlSink {
    fn emit(&mut self, epoch: usize, metrics: &BTreeMap<String, f32>) -> anyhow::Result<()> {
        let line = serde_json::to_string(&JsonlRecord { epoch, metrics })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
