use crate::cmdline::KernelCmdline;
use crate::error::{ImageKind, LaunchError};
use crate::qemu::{self, Props, QemuArg};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Emulator started when nothing else is configured
pub const DEFAULT_EMULATOR: &str = "qemu-system-x86_64";

/// Kernel image of a sibling kernel source checkout
pub const DEFAULT_KERNEL: &str = "../linux/arch/x86/boot/bzImage";

/// Ramdisk image expected in the working directory
pub const ROOTFS_IMAGE: &str = "rootfs_img";

pub const NETDEV_ID: &str = "eth0";

pub const NIC_MODEL: &str = "e1000";

/// Packet capture written by the emulator into the working directory
pub const CAPTURE_FILE: &str = "dump.dat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetBackend {
    /// User-mode NAT, no host privileges needed
    User,
}

impl NetBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetBackend::User => "user",
        }
    }
}

/// Guest network: one backend with one NIC attached to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub backend: NetBackend,
    /// Identifier shared by the backend, the NIC and the capture filter
    pub id: String,
    pub nic_model: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            backend: NetBackend::User,
            id: NETDEV_ID.to_string(),
            nic_model: NIC_MODEL.to_string(),
        }
    }
}

/// Packet capture on the network backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    pub enabled: bool,
    /// Output file, relative paths land in the working directory
    pub file: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from(CAPTURE_FILE),
        }
    }
}

/// Launch settings before they are bound to a working directory.
///
/// A TOML profile deserializes into this type and replaces the built-in
/// defaults as a whole; fields it leaves out take the same defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub emulator: String,
    pub kernel: PathBuf,
    /// Ramdisk file name, resolved against the working directory
    pub rootfs: PathBuf,
    pub network: NetworkConfig,
    pub capture: CaptureConfig,
    pub cmdline: KernelCmdline,
    pub graphics: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            emulator: DEFAULT_EMULATOR.to_string(),
            kernel: PathBuf::from(DEFAULT_KERNEL),
            rootfs: PathBuf::from(ROOTFS_IMAGE),
            network: NetworkConfig::default(),
            capture: CaptureConfig::default(),
            cmdline: KernelCmdline::default(),
            graphics: false,
        }
    }
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self, LaunchError> {
        let text = std::fs::read_to_string(path).map_err(|source| LaunchError::ProfileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| LaunchError::ProfileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Bind the profile to the directory the emulator will run in.
    ///
    /// A relative `work_dir` is made absolute against the current directory,
    /// since the emulator itself runs inside `work_dir`.
    pub fn resolve(self, work_dir: impl AsRef<Path>) -> Result<LaunchConfig, LaunchError> {
        let work_dir = work_dir.as_ref();
        let work_dir = std::path::absolute(work_dir).map_err(|source| LaunchError::WorkDir {
            path: work_dir.to_path_buf(),
            source,
        })?;
        Ok(LaunchConfig {
            rootfs: work_dir.join(&self.rootfs),
            work_dir,
            emulator: self.emulator,
            kernel: self.kernel,
            network: self.network,
            capture: self.capture.enabled.then_some(self.capture.file),
            cmdline: self.cmdline,
            graphics: self.graphics,
        })
    }
}

/// Everything needed to start the emulator once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Emulator binary name or path
    pub emulator: String,
    /// Kernel image, passed to the emulator as given
    pub kernel: PathBuf,
    /// Ramdisk image, always rooted in `work_dir`
    pub rootfs: PathBuf,
    /// Absolute directory the emulator runs in
    pub work_dir: PathBuf,
    pub network: NetworkConfig,
    /// Packet capture file, if capturing
    pub capture: Option<PathBuf>,
    pub cmdline: KernelCmdline,
    pub graphics: bool,
}

impl LaunchConfig {
    /// Built-in configuration for the given working directory
    pub fn resolve(work_dir: impl AsRef<Path>) -> Result<Self, LaunchError> {
        Profile::default().resolve(work_dir)
    }

    /// Kernel path as the emulator sees it from its working directory
    pub fn kernel_location(&self) -> PathBuf {
        self.work_dir.join(&self.kernel)
    }

    /// Check that both images exist, kernel first
    pub fn validate(&self) -> Result<(), LaunchError> {
        let kernel = self.kernel_location();
        if !kernel.is_file() {
            return Err(LaunchError::MissingImage {
                kind: ImageKind::Kernel,
                path: kernel,
            });
        }
        if !self.rootfs.is_file() {
            return Err(LaunchError::MissingImage {
                kind: ImageKind::Ramdisk,
                path: self.rootfs.clone(),
            });
        }
        Ok(())
    }

    pub fn qemu_args(&self) -> Vec<QemuArg> {
        let id = self.network.id.as_str();

        let mut args = vec![
            QemuArg::props(
                "netdev",
                Props::typed(self.network.backend.as_str()).with("id", id),
            ),
            QemuArg::props(
                "device",
                Props::typed(self.network.nic_model.as_str()).with("netdev", id),
            ),
        ];

        if let Some(file) = &self.capture {
            args.push(QemuArg::props(
                "object",
                Props::typed("filter-dump")
                    .with("id", id)
                    .with("netdev", id)
                    .with("file", file.to_string_lossy()),
            ));
        }

        args.push(QemuArg::path("kernel", &self.kernel));
        args.push(QemuArg::text("append", self.cmdline.to_string()));
        if !self.graphics {
            args.push(QemuArg::switch("nographic"));
        }
        args.push(QemuArg::path("initrd", &self.rootfs));

        args
    }

    pub fn argv(&self) -> Vec<OsString> {
        qemu::render(&self.qemu_args())
    }
}
