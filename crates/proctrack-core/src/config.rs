use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of lines retained per stream of a monitored process
pub const DEFAULT_OUTPUT_LIMIT: usize = 10_000;

/// Tunables shared by the session and monitor registries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Lines kept per stream when a monitor spec does not set its own limit
    #[serde(default = "default_output_limit")]
    pub default_output_limit: usize,

    /// How long an exited monitored process stays readable before it is purged
    /// (in milliseconds)
    #[serde(default = "default_monitor_purge_grace_ms")]
    pub monitor_purge_grace_ms: u64,

    /// Delay before a forced kill is re-sent to a process that survived it
    /// (in milliseconds)
    #[serde(default = "default_kill_escalation_grace_ms")]
    pub kill_escalation_grace_ms: u64,

    /// Upper bound on waiting for stream readers to drain after a child exits
    /// (in milliseconds)
    #[serde(default = "default_output_drain_timeout_ms")]
    pub output_drain_timeout_ms: u64,

    /// Finished sessions are purged this long after they stop running.
    /// `None` keeps them until removed explicitly.
    #[serde(default)]
    pub session_retention_ms: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_output_limit: default_output_limit(),
            monitor_purge_grace_ms: default_monitor_purge_grace_ms(),
            kill_escalation_grace_ms: default_kill_escalation_grace_ms(),
            output_drain_timeout_ms: default_output_drain_timeout_ms(),
            session_retention_ms: None,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_output_limit == 0 {
            return Err(anyhow::anyhow!("default_output_limit must be at least 1"));
        }

        if self.kill_escalation_grace_ms > 60_000 {
            return Err(anyhow::anyhow!(
                "kill_escalation_grace_ms should not exceed 60 seconds"
            ));
        }

        if self.output_drain_timeout_ms == 0 {
            return Err(anyhow::anyhow!("output_drain_timeout_ms must be positive"));
        }

        Ok(())
    }

    pub fn monitor_purge_grace(&self) -> Duration {
        Duration::from_millis(self.monitor_purge_grace_ms)
    }

    pub fn kill_escalation_grace(&self) -> Duration {
        Duration::from_millis(self.kill_escalation_grace_ms)
    }

    pub fn output_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.output_drain_timeout_ms)
    }

    pub fn session_retention(&self) -> Option<Duration> {
        self.session_retention_ms.map(Duration::from_millis)
    }
}

/// Parameters for starting a monitored process
#[derive(Default, Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option))]
pub struct MonitorSpec {
    pub command: String,
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,
    #[builder(default)]
    pub working_directory: Option<PathBuf>,
    #[builder(default)]
    pub use_shell: bool,
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    #[builder(default)]
    pub output_limit: Option<usize>,
}

impl MonitorSpec {
    pub fn builder() -> MonitorSpecBuilder {
        MonitorSpecBuilder::default()
    }

    /// Command plus arguments joined for display and pattern matching
    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

impl MonitorSpecBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

// Default value functions for serde
fn default_output_limit() -> usize {
    DEFAULT_OUTPUT_LIMIT
}
fn default_monitor_purge_grace_ms() -> u64 {
    60_000
}
fn default_kill_escalation_grace_ms() -> u64 {
    1_000
}
fn default_output_drain_timeout_ms() -> u64 {
    2_000
}
