//! Error types for the harness

use thiserror::Error;

/// Storage-level failure reported by a [`crate::storage::Storage`] backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// The storage root (partition) does not exist
    #[error("partition not found: {0}")]
    PartitionMissing(String),

    /// The storage root exists but cannot be used as a filesystem
    #[error("mount failed for {path}: {reason}")]
    Mount {
        /// Storage root
        path: String,
        /// Why the mount was refused
        reason: String,
    },

    /// A named resource could not be opened
    #[error("cannot open {name}: {source}")]
    Open {
        /// Resource name
        name: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A read on an open resource failed
    #[error("read failed on {name}: {source}")]
    Read {
        /// Resource name
        name: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Closing a resource failed
    #[error("close failed on {name}: {reason}")]
    Close {
        /// Resource name
        name: String,
        /// Why the close failed
        reason: String,
    },
}

/// Which of the two datasets a load fault concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    /// The workload input
    Input,
    /// The reference output
    Golden,
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dataset::Input => f.write_str("input"),
            Dataset::Golden => f.write_str("golden"),
        }
    }
}

/// Fatal configuration fault. Each variant owns a reserved status word.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigFault {
    /// Storage root missing
    #[error("storage partition missing")]
    PartitionMissing,

    /// Storage root unusable
    #[error("storage mount failed")]
    MountFailed,

    /// Resource could not be opened
    #[error("{0} open failed")]
    Open(Dataset),

    /// Resource read failed
    #[error("{0} read failed")]
    Read(Dataset),

    /// Resource held the wrong number of bytes
    #[error("{dataset} size mismatch: expected {expected} bytes, found {found}")]
    Size {
        /// Dataset concerned
        dataset: Dataset,
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        found: usize,
    },

    /// Resource close failed
    #[error("{0} close failed")]
    Close(Dataset),

    /// Golden digest or element count disagrees with its manifest
    #[error("golden integrity check failed: {0}")]
    Integrity(String),

    /// Observed and golden outputs differ in length at compare time
    #[error("output shape mismatch: observed {observed} elements, golden {golden}")]
    Shape {
        /// Observed element count
        observed: usize,
        /// Golden element count
        golden: usize,
    },
}

impl ConfigFault {
    /// Map a storage failure to the fault for the dataset being loaded
    pub fn from_storage(dataset: Dataset, err: &StorageError) -> Self {
        match err {
            StorageError::PartitionMissing(_) => ConfigFault::PartitionMissing,
            StorageError::Mount { .. } => ConfigFault::MountFailed,
            StorageError::Open { .. } => ConfigFault::Open(dataset),
            StorageError::Read { .. } => ConfigFault::Read(dataset),
            StorageError::Close { .. } => ConfigFault::Close(dataset),
        }
    }
}

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration fault; the instance cannot proceed
    #[error("configuration fault: {0}")]
    Config(#[from] ConfigFault),

    /// Storage failure outside of dataset loading
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The diagnostic sink refused every attempt allowed by the retry policy
    #[error("diagnostic sink unavailable after {attempts} attempts: {source}")]
    SinkUnavailable {
        /// Attempts made
        attempts: u32,
        /// Last sink error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A workload produced different bits for the same input
    #[error("workload {workload} is not deterministic: {differing} elements differ between runs")]
    NonDeterministic {
        /// Workload name
        workload: String,
        /// Elements that differed
        differing: usize,
    },

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest (de)serialization failed
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    /// The configuration fault carried by this error, if any
    pub fn config_fault(&self) -> Option<&ConfigFault> {
        match self {
            Self::Config(fault) => Some(fault),
            _ => None,
        }
    }

    /// Whether the instance has to stop (or fall back to the fault beacon)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Storage(_) | Self::InvalidConfig(_) | Self::NonDeterministic { .. }
        )
    }
}
