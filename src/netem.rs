//! Scoped `tc netem` impairment on a network interface.
//!
//! [`NetemGuard::apply`] installs the profile; dropping the guard removes
//! the qdisc again, on every exit path.

use std::fmt;
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetemError {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Delay, loss and reordering applied to one interface. Values use tc's
/// own notation, e.g. `100ms` or `5%`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetemProfile {
    pub interface: String,
    pub delay: String,
    pub delay_jitter: String,
    pub loss: String,
    pub loss_correlation: String,
    pub reorder: String,
    pub reorder_correlation: String,
    /// Run tc through non-interactive `sudo -n`.
    pub sudo: bool,
}

impl Default for NetemProfile {
    fn default() -> Self {
        Self {
            interface: "lo".to_string(),
            delay: "0ms".to_string(),
            delay_jitter: "0ms".to_string(),
            loss: "0%".to_string(),
            loss_correlation: "0%".to_string(),
            reorder: "0%".to_string(),
            reorder_correlation: "0%".to_string(),
            sudo: true,
        }
    }
}

impl NetemProfile {
    fn add_args(&self) -> Vec<String> {
        args(&["qdisc", "add", "dev", &self.interface, "root", "netem"])
    }

    fn change_args(&self) -> Vec<String> {
        args(&[
            "qdisc",
            "change",
            "dev",
            &self.interface,
            "root",
            "netem",
            "delay",
            &self.delay,
            &self.delay_jitter,
            "distribution",
            "normal",
            "loss",
            &self.loss,
            &self.loss_correlation,
            "reorder",
            &self.reorder,
            &self.reorder_correlation,
        ])
    }

    fn del_args(&self) -> Vec<String> {
        args(&["qdisc", "del", "dev", &self.interface, "root"])
    }
}

impl fmt::Display for NetemProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interface {}: delay {} {} (normal), loss {} {}, reorder {} {}",
            self.interface,
            self.delay,
            self.delay_jitter,
            self.loss,
            self.loss_correlation,
            self.reorder,
            self.reorder_correlation
        )
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Removes the impairment when dropped.
#[derive(Debug)]
pub struct NetemGuard {
    profile: NetemProfile,
}

impl NetemGuard {
    pub fn apply(profile: NetemProfile) -> Result<Self, NetemError> {
        // `add` fails harmlessly when a root netem qdisc already exists.
        if let Err(e) = run_tc(profile.sudo, &profile.add_args()) {
            tracing::debug!(error = %e, "tc qdisc add failed, trying change");
        }
        let guard = Self { profile };
        run_tc(guard.profile.sudo, &guard.profile.change_args())?;
        tracing::info!(profile = %guard.profile, "network impairment applied");
        Ok(guard)
    }

    pub fn profile(&self) -> &NetemProfile {
        &self.profile
    }
}

impl Drop for NetemGuard {
    fn drop(&mut self) {
        match run_tc(self.profile.sudo, &self.profile.del_args()) {
            Ok(()) => tracing::info!(interface = %self.profile.interface, "network impairment removed"),
            Err(e) => tracing::warn!(error = %e, "failed to remove network impairment"),
        }
    }
}

fn tc_command(sudo: bool, args: &[String]) -> Command {
    if sudo {
        let mut cmd = Command::new("sudo");
        cmd.arg("-n").arg("tc").args(args);
        cmd
    } else {
        let mut cmd = Command::new("tc");
        cmd.args(args);
        cmd
    }
}

fn run_tc(sudo: bool, args: &[String]) -> Result<(), NetemError> {
    let command = format!("{}tc {}", if sudo { "sudo -n " } else { "" }, args.join(" "));
    let output = tc_command(sudo, args)
        .output()
        .map_err(|source| NetemError::Spawn {
            command: command.clone(),
            source,
        })?;
    if output.status.success() {
        return Ok(());
    }
    Err(NetemError::Failed {
        command,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_command_carries_every_parameter() {
        let profile = NetemProfile {
            interface: "eth1".into(),
            delay: "100ms".into(),
            delay_jitter: "25ms".into(),
            loss: "5%".into(),
            loss_correlation: "10%".into(),
            reorder: "10%".into(),
            reorder_correlation: "20%".into(),
            sudo: false,
        };
        assert_eq!(
            profile.change_args().join(" "),
            "qdisc change dev eth1 root netem delay 100ms 25ms distribution normal loss 5% 10% reorder 10% 20%"
        );
        assert_eq!(profile.del_args().join(" "), "qdisc del dev eth1 root");
    }

    #[test]
    fn sudo_is_non_interactive() {
        let cmd = tc_command(true, &args(&["qdisc", "show"]));
        assert_eq!(cmd.get_program(), "sudo");
        let argv: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(argv, ["-n", "tc", "qdisc", "show"]);
    }

    #[test]
    fn profile_deserializes_with_defaults() {
        let profile: NetemProfile = toml::from_str("delay = \"100ms\"\nsudo = false\n").unwrap();
        assert_eq!(profile.delay, "100ms");
        assert_eq!(profile.interface, "lo");
        assert!(!profile.sudo);
    }
}
