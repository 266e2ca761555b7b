use crate::config::LaunchConfig;
use crate::error::LaunchError;
use crate::qemu;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{Id, WaitPidFlag, waitid};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

/// How the emulator process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited on its own with this code
    Code(i32),
    /// Killed by this signal
    Signal(i32),
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Code(0))
    }

    /// Exit code as a shell reports it, 128 + N for a fatal signal N
    pub fn exit_code(&self) -> i32 {
        match *self {
            ExitOutcome::Code(code) => code,
            ExitOutcome::Signal(signal) => 128 + signal,
        }
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => ExitOutcome::Code(code),
            (None, Some(signal)) => ExitOutcome::Signal(signal),
            (None, None) => ExitOutcome::Code(1),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(code) => write!(f, "exited with code {code}"),
            ExitOutcome::Signal(signal) => write!(f, "was killed by signal {signal}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    NotLaunched,
    /// The emulator ran and exited
    Launched(ExitOutcome),
}

/// Resolve the emulator binary on `PATH`, or check an explicit path
pub fn locate_emulator(name: &str) -> Result<PathBuf, LaunchError> {
    which::which(name).map_err(|source| LaunchError::MissingBinary {
        name: name.to_string(),
        source,
    })
}

/// Boots a kernel once under the configured emulator
pub struct Launcher {
    config: LaunchConfig,
    state: LaunchState,
}

impl Launcher {
    pub fn new(config: LaunchConfig) -> Self {
        Self {
            config,
            state: LaunchState::NotLaunched,
        }
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    /// Emulator invocation as a shell command line, without resolving anything
    pub fn command_line(&self) -> String {
        qemu::display_command(&self.config.emulator, &self.config.argv())
    }

    /// Prepare the emulator command: resolved binary, argv, working
    /// directory and inherited stdio.
    pub fn command(&self) -> Result<Command, LaunchError> {
        let binary = locate_emulator(&self.config.emulator)?;

        let mut command = Command::new(binary);
        command
            .args(self.config.argv())
            .current_dir(&self.config.work_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        Ok(command)
    }

    /// Run the emulator and block until it exits.
    ///
    /// Any exit other than code 0 is returned as
    /// [`LaunchError::SubprocessFailure`] carrying the original status.
    pub fn launch(&mut self) -> Result<ExitOutcome, LaunchError> {
        if let LaunchState::Launched(_) = self.state {
            return Err(LaunchError::AlreadyLaunched);
        }

        self.config.validate()?;
        let mut command = self.command()?;

        tracing::info!(
            "Launching {} in {}",
            self.command_line(),
            self.config.work_dir.display()
        );

        // Registered before the spawn so nothing is lost in between
        let signals = Signals::new([SIGINT, SIGTERM, SIGQUIT]).map_err(LaunchError::Signals)?;

        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            name: self.config.emulator.clone(),
            source,
        })?;
        let pid = child.id();
        tracing::debug!("Emulator started (PID: {})", pid);

        let forwarder = SignalForwarder::start(signals, pid);
        // The child stays a zombie until reaped, so its PID cannot be reused
        // while signals may still be forwarded to it.
        let exited = wait_until_exited(pid);
        forwarder.stop();
        exited?;

        let status = child.wait().map_err(LaunchError::Wait)?;
        let outcome = ExitOutcome::from(status);
        self.state = LaunchState::Launched(outcome);

        tracing::info!("Emulator (PID: {}) {}", pid, outcome);
        if outcome.success() {
            Ok(outcome)
        } else {
            Err(LaunchError::SubprocessFailure { status: outcome })
        }
    }
}

/// Block until the child has exited, leaving it unreaped
fn wait_until_exited(pid: u32) -> Result<(), LaunchError> {
    let pid = Pid::from_raw(pid as i32);
    loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(LaunchError::Wait(e.into())),
        }
    }
}

/// Relays termination signals received by the launcher to the emulator
struct SignalForwarder {
    handle: Handle,
    thread: JoinHandle<()>,
}

impl SignalForwarder {
    fn start(mut signals: Signals, pid: u32) -> Self {
        let handle = signals.handle();
        let child = Pid::from_raw(pid as i32);

        let thread = std::thread::spawn(move || {
            for raw in signals.forever() {
                let signal = match Signal::try_from(raw) {
                    Ok(signal) => signal,
                    Err(e) => {
                        tracing::warn!("Ignoring unknown signal {}: {}", raw, e);
                        continue;
                    }
                };
                tracing::info!("Forwarding {} to emulator (PID: {})", signal, pid);
                if let Err(e) = kill(child, signal) {
                    tracing::warn!("Failed to forward {} to emulator: {}", signal, e);
                }
            }
        });

        Self { handle, thread }
    }

    fn stop(self) {
        self.handle.close();
        if self.thread.join().is_err() {
            tracing::warn!("Signal forwarding thread panicked");
        }
    }
}
