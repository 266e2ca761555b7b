use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use qemu_boot_launcher::{LaunchConfig, LaunchError, Launcher, Profile};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Boot ../linux's bzImage with ./rootfs_img under QEMU, capturing guest
/// traffic to ./dump.dat
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Kernel image, relative to the working directory
    #[arg(long, env = "BOOT_KERNEL")]
    kernel: Option<PathBuf>,

    /// Emulator binary name or path
    #[arg(long, env = "BOOT_QEMU")]
    qemu: Option<String>,

    /// TOML profile replacing the built-in launch settings
    #[arg(long, env = "BOOT_PROFILE")]
    profile: Option<PathBuf>,

    /// Print the emulator command line instead of running it
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn launch_config(&self, work_dir: &Path) -> Result<LaunchConfig, LaunchError> {
        let mut profile = match &self.profile {
            Some(path) => Profile::load(path)?,
            None => Profile::default(),
        };
        if let Some(kernel) = &self.kernel {
            profile.kernel = kernel.clone();
        }
        if let Some(qemu) = &self.qemu {
            profile.emulator = qemu.clone();
        }
        profile.resolve(work_dir)
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    // stdout carries the guest console, keep our own output on stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let work_dir = std::env::current_dir().wrap_err("Failed to determine working directory")?;

    let result = cli
        .launch_config(&work_dir)
        .and_then(|config| {
            let mut launcher = Launcher::new(config);
            if cli.dry_run {
                println!("{}", launcher.command_line());
                return Ok(());
            }
            launcher.launch().map(|_| ())
        });

    match result {
        Ok(()) => Ok(()),
        // The emulator already spoke for itself on the inherited streams
        Err(e @ LaunchError::SubprocessFailure { .. }) => {
            tracing::error!("{}", e);
            std::process::exit(e.exit_code());
        }
        Err(e) => {
            let code = e.exit_code();
            eprintln!("Error: {:?}", eyre::Report::new(e));
            std::process::exit(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_profile(dir: &Path) -> PathBuf {
        let path = dir.join("boot.toml");
        std::fs::write(
            &path,
            r#"
            emulator = "qemu-system-aarch64"
            kernel = "../linux/arch/arm64/boot/Image"

            [network]
            nic_model = "virtio-net-pci"
            "#,
        )
        .unwrap();
        path
    }

    #[test]
    fn flags_override_a_loaded_profile() {
        let dir = tempfile::tempdir().unwrap();
        let profile = write_profile(dir.path());

        let cli = Cli::try_parse_from([
            "qemu-boot-launcher",
            "--profile",
            profile.to_str().unwrap(),
            "--kernel",
            "/boot/bzImage",
            "--qemu",
            "/opt/qemu/bin/qemu-system-x86_64",
        ])
        .unwrap();
        let config = cli.launch_config(dir.path()).unwrap();

        assert_eq!(config.kernel, PathBuf::from("/boot/bzImage"));
        assert_eq!(config.emulator, "/opt/qemu/bin/qemu-system-x86_64");
        // settings without a flag still come from the profile
        assert_eq!(config.network.nic_model, "virtio-net-pci");
        assert_eq!(config.rootfs, dir.path().join("rootfs_img"));
    }

    #[test]
    fn profile_applies_when_no_flag_overrides_it() {
        let dir = tempfile::tempdir().unwrap();
        let profile = write_profile(dir.path());

        let cli = Cli::try_parse_from([
            "qemu-boot-launcher",
            "--profile",
            profile.to_str().unwrap(),
            "--dry-run",
        ])
        .unwrap();
        let config = cli.launch_config(dir.path()).unwrap();

        assert!(cli.dry_run);
        assert_eq!(config.emulator, "qemu-system-aarch64");
        assert_eq!(
            config.kernel,
            PathBuf::from("../linux/arch/arm64/boot/Image")
        );
    }

    #[test]
    fn missing_profile_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        let cli = Cli::try_parse_from([
            "qemu-boot-launcher",
            "--profile",
            missing.to_str().unwrap(),
        ])
        .unwrap();

        assert!(matches!(
            cli.launch_config(dir.path()),
            Err(LaunchError::ProfileRead { .. })
        ));
    }
}
