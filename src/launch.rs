//! Starting participant processes.
//!
//! The tested program is located next to its `run.sh`: `bin/da_proc` if
//! present, otherwise `bin/da_proc.jar` run through `java -jar`. Every
//! participant gets the same hosts/config files and rendezvous addresses,
//! its own output log, and its stdout/stderr captured under the logs dir.

use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fault::{ControlSignal, ProcessControl};
use crate::participant::ParticipantId;

pub const RUNSCRIPT_NAME: &str = "run.sh";

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("`{0}` is not a file")]
    NotAFile(PathBuf),

    #[error("`{0}` is not a runscript")]
    NotARunscript(PathBuf),

    #[error("`{0}` is not a directory")]
    NotADirectory(PathBuf),

    #[error("`{0}` could not find a binary to execute. Make sure you build before validating")]
    BinaryNotFound(PathBuf),

    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start participant {participant}: {source}")]
    Spawn {
        participant: ParticipantId,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// Problems with the supplied paths, detectable before anything starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotAFile(_) | Self::NotARunscript(_) | Self::NotADirectory(_) | Self::BinaryNotFound(_)
        )
    }
}

/// Protocol knobs passed to every participant as trailing positional args.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTuning {
    pub send_delay_ms: u64,
    pub deliver_delay_ms: u64,
    pub ack_timeout_ms: u64,
    pub retries: u64,
    /// Outstanding-message window.
    pub window: u64,
    pub window_delay_ms: u64,
}

impl Default for ProtocolTuning {
    fn default() -> Self {
        Self {
            send_delay_ms: 25,
            deliver_delay_ms: 150,
            ack_timeout_ms: 10,
            retries: 2,
            window: 1400,
            window_delay_ms: 50,
        }
    }
}

impl ProtocolTuning {
    pub fn args(&self) -> [String; 6] {
        [
            self.send_delay_ms.to_string(),
            self.deliver_delay_ms.to_string(),
            self.ack_timeout_ms.to_string(),
            self.retries.to_string(),
            self.window.to_string(),
            self.window_delay_ms.to_string(),
        ]
    }
}

impl fmt::Display for ProtocolTuning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "send={}ms deliver={}ms ack_timeout={}ms retries={} window={} window_delay={}ms",
            self.send_delay_ms,
            self.deliver_delay_ms,
            self.ack_timeout_ms,
            self.retries,
            self.window,
            self.window_delay_ms
        )
    }
}

/// The executable found next to a runscript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantBinary {
    Native(PathBuf),
    Jar(PathBuf),
}

impl ParticipantBinary {
    fn command(&self) -> Command {
        match self {
            Self::Native(path) => Command::new(path),
            Self::Jar(path) => {
                let mut cmd = Command::new("java");
                cmd.arg("-jar").arg(path);
                cmd
            }
        }
    }
}

/// Resolve the participant binary for `runscript`.
pub fn locate_binary(runscript: &Path) -> Result<ParticipantBinary, LaunchError> {
    let runscript = absolutize(runscript);
    if !runscript.is_file() {
        return Err(LaunchError::NotAFile(runscript));
    }
    if runscript.file_name().and_then(|n| n.to_str()) != Some(RUNSCRIPT_NAME) {
        return Err(LaunchError::NotARunscript(runscript));
    }

    let base = runscript.parent().unwrap_or_else(|| Path::new("."));
    let native = base.join("bin").join("da_proc");
    let jar = base.join("bin").join("da_proc.jar");
    if native.exists() {
        Ok(ParticipantBinary::Native(native))
    } else if jar.exists() {
        Ok(ParticipantBinary::Jar(jar))
    } else {
        Err(LaunchError::BinaryNotFound(runscript))
    }
}

/// Everything every participant of one run is started with.
#[derive(Debug, Clone)]
pub struct ParticipantLauncher {
    binary: ParticipantBinary,
    logs_dir: PathBuf,
    barrier: SocketAddr,
    signal: SocketAddr,
    tuning: ProtocolTuning,
}

impl ParticipantLauncher {
    pub fn new(
        runscript: &Path,
        logs_dir: &Path,
        barrier: SocketAddr,
        signal: SocketAddr,
        tuning: ProtocolTuning,
    ) -> Result<Self, LaunchError> {
        let binary = locate_binary(runscript)?;
        Self::with_binary(binary, logs_dir, barrier, signal, tuning)
    }

    pub fn with_binary(
        binary: ParticipantBinary,
        logs_dir: &Path,
        barrier: SocketAddr,
        signal: SocketAddr,
        tuning: ProtocolTuning,
    ) -> Result<Self, LaunchError> {
        let logs_dir = absolutize(logs_dir);
        if !logs_dir.is_dir() {
            return Err(LaunchError::NotADirectory(logs_dir));
        }
        Ok(Self {
            binary,
            logs_dir,
            barrier,
            signal,
            tuning,
        })
    }

    pub fn binary(&self) -> &ParticipantBinary {
        &self.binary
    }

    /// Arguments after the program name for participant `id`.
    pub fn arguments(&self, id: ParticipantId, hosts: &Path, config: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--id".into(),
            id.to_string().into(),
            "--hosts".into(),
            hosts.into(),
            "--barrier".into(),
            self.barrier.to_string().into(),
            "--signal".into(),
            self.signal.to_string().into(),
            "--output".into(),
            id.output_path(&self.logs_dir).into(),
            config.into(),
        ];
        args.extend(self.tuning.args().into_iter().map(OsString::from));
        args
    }

    pub fn spawn(
        &self,
        id: ParticipantId,
        hosts: &Path,
        config: &Path,
    ) -> Result<ParticipantProcess, LaunchError> {
        let stdout = create_capture(id.stdout_path(&self.logs_dir))?;
        let stderr = create_capture(id.stderr_path(&self.logs_dir))?;

        let child = self
            .binary
            .command()
            .args(self.arguments(id, hosts, config))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                participant: id,
                source,
            })?;

        tracing::info!(participant = %id, pid = child.id(), "participant started");
        Ok(ParticipantProcess { id, child })
    }

    /// Start participants `1..=n`. Already-started ones are killed if a
    /// later one fails.
    pub fn spawn_all(
        &self,
        n: u32,
        hosts: &Path,
        config: &Path,
    ) -> Result<Vec<(ParticipantId, ParticipantProcess)>, LaunchError> {
        ParticipantId::all(n)
            .map(|id| self.spawn(id, hosts, config).map(|p| (id, p)))
            .collect()
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn create_capture(path: PathBuf) -> Result<File, LaunchError> {
    File::create(&path).map_err(|source| LaunchError::Io { path, source })
}

/// An owned participant process. Killed and reaped when dropped.
#[derive(Debug)]
pub struct ParticipantProcess {
    id: ParticipantId,
    child: Child,
}

impl ParticipantProcess {
    pub fn id(&self) -> ParticipantId {
        self.id
    }
}

impl ProcessControl for ParticipantProcess {
    fn os_pid(&self) -> Option<u32> {
        self.child.os_pid()
    }

    fn send_signal(&mut self, signal: ControlSignal) -> io::Result<()> {
        self.child.send_signal(signal)
    }

    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_exit_status()
    }
}

impl Drop for ParticipantProcess {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(e) = self.child.kill() {
            tracing::debug!(participant = %self.id, error = %e, "kill on drop failed");
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runscript_dir(with: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RUNSCRIPT_NAME), "#!/bin/sh\n").unwrap();
        std::fs::create_dir(dir.path().join("bin")).unwrap();
        for name in with {
            std::fs::write(dir.path().join("bin").join(name), "").unwrap();
        }
        dir
    }

    #[test]
    fn prefers_native_binary() {
        let dir = runscript_dir(&["da_proc", "da_proc.jar"]);
        let binary = locate_binary(&dir.path().join(RUNSCRIPT_NAME)).unwrap();
        assert!(matches!(binary, ParticipantBinary::Native(p) if p.ends_with("bin/da_proc")));
    }

    #[test]
    fn falls_back_to_jar() {
        let dir = runscript_dir(&["da_proc.jar"]);
        let binary = locate_binary(&dir.path().join(RUNSCRIPT_NAME)).unwrap();
        assert!(matches!(binary, ParticipantBinary::Jar(_)));
    }

    #[test]
    fn missing_binary_or_wrong_name_is_configuration_error() {
        let dir = runscript_dir(&[]);
        let err = locate_binary(&dir.path().join(RUNSCRIPT_NAME)).unwrap_err();
        assert!(matches!(err, LaunchError::BinaryNotFound(_)));
        assert!(err.is_configuration());

        let other = dir.path().join("start.sh");
        std::fs::write(&other, "").unwrap();
        assert!(matches!(locate_binary(&other), Err(LaunchError::NotARunscript(_))));
        assert!(matches!(
            locate_binary(&dir.path().join("missing.sh")),
            Err(LaunchError::NotAFile(_))
        ));
    }

    #[test]
    fn argument_vector_follows_contract() {
        let logs = tempfile::tempdir().unwrap();
        let launcher = ParticipantLauncher::with_binary(
            ParticipantBinary::Native(PathBuf::from("/bin/true")),
            logs.path(),
            "127.0.0.1:10000".parse().unwrap(),
            "127.0.0.1:11000".parse().unwrap(),
            ProtocolTuning::default(),
        )
        .unwrap();
        let args = launcher.arguments(ParticipantId(3), Path::new("/tmp/hosts"), Path::new("/tmp/config"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..6], ["--id", "3", "--hosts", "/tmp/hosts", "--barrier", "127.0.0.1:10000"]);
        assert_eq!(args[7], "127.0.0.1:11000");
        assert!(args[9].ends_with("proc03.output"));
        assert_eq!(args[10], "/tmp/config");
        assert_eq!(&args[11..], ["25", "150", "10", "2", "1400", "50"]);
    }

    #[cfg(unix)]
    #[test]
    fn spawn_captures_output_and_drop_kills() {
        let logs = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let script = bin.path().join("da_proc");
        std::fs::write(&script, "#!/bin/sh\necho \"Total message delivered: 4\"\nexec sleep 30\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let launcher = ParticipantLauncher::with_binary(
            ParticipantBinary::Native(script),
            logs.path(),
            "127.0.0.1:10000".parse().unwrap(),
            "127.0.0.1:11000".parse().unwrap(),
            ProtocolTuning::default(),
        )
        .unwrap();

        let mut proc = launcher
            .spawn(ParticipantId(1), Path::new("/dev/null"), Path::new("/dev/null"))
            .unwrap();
        assert!(proc.os_pid().is_some());
        assert!(proc.try_exit_status().unwrap().is_none());
        std::thread::sleep(std::time::Duration::from_millis(300));
        drop(proc);

        let stdout = std::fs::read_to_string(ParticipantId(1).stdout_path(logs.path())).unwrap();
        assert!(stdout.contains("Total message delivered: 4"));
    }
}
