use crate::launch::ExitOutcome;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code used when the emulator binary cannot be found, as a shell would
pub const EXIT_NOT_FOUND: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Kernel,
    Ramdisk,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Kernel => write!(f, "kernel image"),
            ImageKind::Ramdisk => write!(f, "ramdisk image"),
        }
    }
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Virtualization tool `{name}` not found: {source}")]
    MissingBinary {
        name: String,
        #[source]
        source: which::Error,
    },

    #[error("The {kind} does not exist: {}", path.display())]
    MissingImage { kind: ImageKind, path: PathBuf },

    #[error("Virtualization tool {status}")]
    SubprocessFailure { status: ExitOutcome },

    #[error("Launcher has already run the virtualization tool")]
    AlreadyLaunched,

    #[error("Failed to spawn `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for the virtualization tool: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Failed to set up signal forwarding: {0}")]
    Signals(#[source] std::io::Error),

    #[error("Failed to read profile {}: {source}", path.display())]
    ProfileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid profile {}: {source}", path.display())]
    ProfileParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to resolve working directory {}: {source}", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Process exit code the launcher reports for this error.
    ///
    /// A failing emulator's own status is passed through unchanged.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::SubprocessFailure { status } => status.exit_code(),
            LaunchError::MissingBinary { .. } => EXIT_NOT_FOUND,
            _ => 1,
        }
    }
}
