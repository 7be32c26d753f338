//! Network policy for a sandbox.

use serde::{Deserialize, Serialize};

use super::command::CommandLine;

/// Network access granted to a sandbox.
///
/// Only the binary on/off switch is implemented. Host or port allowlists
/// would become additional variants evaluated by [`NetworkPolicy::permits`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    #[default]
    Disabled,
    Enabled,
}

impl NetworkPolicy {
    pub fn from_flag(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Whether a connection to `host` is permitted.
    pub fn permits(&self, _host: &str) -> bool {
        self.is_enabled()
    }
}

/// Programs whose primary purpose is network transfer.
///
/// Application-level screening only: the host OS sandbox, when present, is
/// the layer that actually removes network access from a subprocess.
pub const NETWORK_PROGRAMS: &[&str] = &[
    "curl", "wget", "ssh", "scp", "sftp", "rsync", "nc", "ncat", "telnet", "ftp",
];

/// Return the first network program any segment of a command line runs.
pub fn network_program(command: &str) -> Option<&'static str> {
    CommandLine::parse(command)
        .segments()
        .iter()
        .filter_map(|s| s.program())
        .find_map(|program| NETWORK_PROGRAMS.iter().copied().find(|p| *p == program))
}
