//! Boots a kernel and initial ramdisk under QEMU with user-mode networking
//! and a packet capture on the guest NIC.

pub mod cmdline;
pub mod config;
pub mod error;
pub mod launch;
pub mod qemu;

pub use config::{LaunchConfig, Profile};
pub use error::LaunchError;
pub use launch::{ExitOutcome, LaunchState, Launcher};
