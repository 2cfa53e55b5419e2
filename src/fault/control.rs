//! Signal delivery seam between the fault engine and live processes.

use std::io;
use std::process::{Child, ExitStatus};

use super::state::ControlSignal;

/// Something the fault engine can signal and reap.
///
/// Implemented for [`std::process::Child`] and for the launcher's owned
/// participant handles. Tests substitute recorders.
pub trait ProcessControl: Send {
    /// OS process id, if the process has one.
    fn os_pid(&self) -> Option<u32>;

    fn send_signal(&mut self, signal: ControlSignal) -> io::Result<()>;

    /// Non-blocking reap. `Ok(None)` while the process is still running.
    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>>;
}

impl<T: ProcessControl + ?Sized> ProcessControl for Box<T> {
    fn os_pid(&self) -> Option<u32> {
        (**self).os_pid()
    }

    fn send_signal(&mut self, signal: ControlSignal) -> io::Result<()> {
        (**self).send_signal(signal)
    }

    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        (**self).try_exit_status()
    }
}

impl ProcessControl for Child {
    fn os_pid(&self) -> Option<u32> {
        Some(self.id())
    }

    fn send_signal(&mut self, signal: ControlSignal) -> io::Result<()> {
        deliver(self, signal)
    }

    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        self.try_wait()
    }
}

#[cfg(unix)]
fn deliver(child: &mut Child, signal: ControlSignal) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    let sig = match signal {
        ControlSignal::Stop => Signal::SIGSTOP,
        ControlSignal::Continue => Signal::SIGCONT,
        ControlSignal::Terminate => Signal::SIGTERM,
        ControlSignal::Kill => Signal::SIGKILL,
    };
    kill(Pid::from_raw(raw), sig).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, signal: ControlSignal) -> io::Result<()> {
    match signal {
        ControlSignal::Terminate | ControlSignal::Kill => child.kill(),
        ControlSignal::Stop | ControlSignal::Continue => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} is not available on this platform", signal),
        )),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    fn wait_for_exit(child: &mut Child) -> Option<ExitStatus> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(status) = child.try_exit_status().unwrap() {
                return Some(status);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }

    #[test]
    fn stop_continue_terminate_a_real_child() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        child.send_signal(ControlSignal::Stop).unwrap();
        child.send_signal(ControlSignal::Continue).unwrap();
        assert!(child.try_exit_status().unwrap().is_none());

        child.send_signal(ControlSignal::Terminate).unwrap();
        let status = wait_for_exit(&mut child).expect("child did not exit");
        assert_eq!(status.signal(), Some(15));
    }
}
