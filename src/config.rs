//! Harness configuration
//! Parsed from a TOML file; every section and field has a default.

use crate::error::{HarnessError, Result};
use crate::executor::ConfigFaultPolicy;
use crate::sink::{DiagnosticSink, RetryPolicy, WriterSink};
use crate::workloads::WorkloadSpec;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub workload: WorkloadSpec,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory acting as the mounted partition
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Input resource names; empty means derived from the workload
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Golden resource name; derived from the workload when absent
    #[serde(default)]
    pub golden: Option<String>,
    #[serde(default = "default_true")]
    pub verify_manifest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Per-iteration mismatch cap, 0 = unbounded
    #[serde(default = "default_max_mismatches")]
    pub max_mismatches: usize,
    #[serde(default)]
    pub on_config_fault: ConfigFaultPolicy,
    #[serde(default = "default_beacon_interval_ms")]
    pub beacon_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Stdout,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    /// Device node or file for `kind = "file"`
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    /// 0 = block and retry forever
    #[serde(default)]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// 0 = unbounded
    #[serde(default)]
    pub iterations: u64,
}

// Default functions for serde
fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_true() -> bool {
    true
}

fn default_max_mismatches() -> usize {
    64
}

fn default_beacon_interval_ms() -> u64 {
    1000
}

fn default_retry_initial_ms() -> u64 {
    1
}

fn default_retry_max_ms() -> u64 {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            inputs: Vec::new(),
            golden: None,
            verify_manifest: true,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_mismatches: default_max_mismatches(),
            on_config_fault: ConfigFaultPolicy::default(),
            beacon_interval_ms: default_beacon_interval_ms(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            path: None,
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
            max_attempts: 0,
        }
    }
}

impl HarnessConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: HarnessConfig =
            toml::from_str(content).map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sink.kind == SinkKind::File && self.sink.path.is_none() {
            return Err(HarnessError::InvalidConfig(
                "sink.kind = \"file\" requires sink.path".to_string(),
            ));
        }

        if self.sink.retry_max_ms < self.sink.retry_initial_ms {
            return Err(HarnessError::InvalidConfig(format!(
                "sink.retry_max_ms {} is below sink.retry_initial_ms {}",
                self.sink.retry_max_ms, self.sink.retry_initial_ms
            )));
        }

        let size_ok = match &self.workload {
            WorkloadSpec::Identity { len } | WorkloadSpec::Sort { len } => *len > 0,
            WorkloadSpec::Matmul { n } | WorkloadSpec::Lud { n } => *n > 0,
            WorkloadSpec::Hotspot { rows, cols, .. } => *rows > 0 && *cols > 0,
            WorkloadSpec::Lavamd { boxes1d, .. } => *boxes1d > 0,
            WorkloadSpec::Fft { log2_len } => *log2_len < 32,
            WorkloadSpec::Retention { len, .. } => *len > 0,
        };
        if !size_ok {
            return Err(HarnessError::InvalidConfig(format!(
                "workload {} has an empty or oversized shape",
                self.workload.kind()
            )));
        }

        // Flat indices travel as one 32-bit word
        match self.workload.output_elements() {
            Some(n) if n <= u32::MAX as usize => {}
            _ => {
                return Err(HarnessError::InvalidConfig(format!(
                    "workload {} output exceeds {} elements",
                    self.workload.kind(),
                    u32::MAX
                )))
            }
        }

        Ok(())
    }

    /// Mismatch cap as the reporter takes it
    pub fn mismatch_cap(&self) -> Option<usize> {
        match self.report.max_mismatches {
            0 => None,
            n => Some(n),
        }
    }

    /// Iteration limit as the loop takes it
    pub fn iteration_limit(&self) -> Option<u64> {
        match self.run.iterations {
            0 => None,
            n => Some(n),
        }
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_millis(self.report.beacon_interval_ms)
    }
}

impl SinkConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.retry_initial_ms),
            max_backoff: Duration::from_millis(self.retry_max_ms),
            max_attempts: match self.max_attempts {
                0 => None,
                n => Some(n),
            },
        }
    }

    /// Open the configured carrier
    pub fn open(&self) -> Result<Box<dyn DiagnosticSink + Send>> {
        match self.kind {
            SinkKind::Stdout => Ok(Box::new(WriterSink::new(std::io::stdout()))),
            SinkKind::File => {
                let path = self.path.as_ref().ok_or_else(|| {
                    HarnessError::InvalidConfig("sink.path is not set".to_string())
                })?;
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(Box::new(WriterSink::new(file)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = HarnessConfig::from_toml("").unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.mismatch_cap(), Some(64));
        assert_eq!(config.iteration_limit(), None);
        assert_eq!(config.report.on_config_fault, ConfigFaultPolicy::Halt);
    }

    #[test]
    fn test_full_file() {
        let config = HarnessConfig::from_toml(
            r#"
[workload]
kind = "matmul"
n = 64

[storage]
root = "/mnt/sd"
inputs = ["a.bin"]
golden = "g.bin"
verify_manifest = false

[report]
max_mismatches = 0
on_config_fault = "beacon"

[sink]
kind = "file"
path = "/dev/ttyAMA0"
max_attempts = 5

[run]
iterations = 10
"#,
        )
        .unwrap();

        assert_eq!(config.workload, WorkloadSpec::Matmul { n: 64 });
        assert_eq!(config.storage.root, PathBuf::from("/mnt/sd"));
        assert_eq!(config.storage.golden.as_deref(), Some("g.bin"));
        assert_eq!(config.mismatch_cap(), None);
        assert_eq!(config.report.on_config_fault, ConfigFaultPolicy::Beacon);
        assert_eq!(config.iteration_limit(), Some(10));

        let policy = config.sink.retry_policy();
        assert_eq!(policy.max_attempts, Some(5));
        assert_eq!(policy.initial_backoff, Duration::from_millis(1));
    }

    #[test]
    fn test_file_sink_requires_path() {
        let err = HarnessConfig::from_toml("[sink]\nkind = \"file\"\n").unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_workload_rejected() {
        let err = HarnessConfig::from_toml("[workload]\nkind = \"raytrace\"\n").unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = HarnessConfig::from_toml("[workload]\nkind = \"lud\"\nn = 0\n").unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn test_output_beyond_index_word_rejected() {
        let err = HarnessConfig::from_toml("[workload]\nkind = \"lud\"\nn = 70000\n").unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
        assert!(HarnessConfig::from_toml("[workload]\nkind = \"lud\"\nn = 65535\n").is_ok());
    }

    #[test]
    fn test_file_sink_opens() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let sink = SinkConfig {
            kind: SinkKind::File,
            path: Some(temp_dir.path().join("serial.bin")),
            ..SinkConfig::default()
        };
        let mut opened = sink.open().unwrap();
        opened.write_words(&[1, 2]).unwrap();
        opened.flush().unwrap();
        drop(opened);
        assert_eq!(std::fs::read(temp_dir.path().join("serial.bin")).unwrap().len(), 8);
    }
}
