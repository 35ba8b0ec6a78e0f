use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration for the channel and read buffers between a child's pipes and the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Number of output chunks that may be queued before the pipe readers stop reading
    #[serde(default = "default_relay_buffer")]
    pub relay_buffer: usize,

    /// Initial read capacity (in bytes) of each pipe decoder
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,

    /// How long to keep relaying after a termination request before giving up on the pipes
    /// (in milliseconds)
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relay_buffer: default_relay_buffer(),
            chunk_capacity: default_chunk_capacity(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl RelayConfig {
    /// Create a new RelayConfig with sensible defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Small buffers, so a slow consumer pushes back on the child almost immediately
    pub fn tight() -> Self {
        Self {
            relay_buffer: 1,
            chunk_capacity: 256,
            drain_timeout_ms: 1_000,
        }
    }

    /// Large buffers for chatty children such as `dotnet run`
    pub fn roomy() -> Self {
        Self {
            relay_buffer: 1024,
            chunk_capacity: 16 * 1024,
            drain_timeout_ms: 10_000,
        }
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.relay_buffer == 0 {
            return Err(anyhow::anyhow!("relay_buffer must be at least 1"));
        }

        if self.chunk_capacity == 0 {
            return Err(anyhow::anyhow!("chunk_capacity must be at least 1"));
        }

        if self.chunk_capacity > 1024 * 1024 {
            return Err(anyhow::anyhow!("chunk_capacity should not exceed 1 MiB"));
        }

        if self.drain_timeout_ms > 60_000 {
            return Err(anyhow::anyhow!("drain_timeout_ms should not exceed 60 seconds"));
        }

        Ok(())
    }

    /// Get the drain timeout as Duration
    pub fn drain_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Which processes receive the termination request
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationScope {
    /// Only the spawned child
    #[default]
    Process,
    /// The child is placed in its own process group and the whole group is signalled
    ProcessGroup,
}

/// An immutable description of one external command to launch
#[derive(Default, Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
    pub command: String,
    #[builder(default)]
    #[builder(setter(custom))]
    #[serde(default)]
    pub args: Vec<String>,
    #[builder(default)]
    #[builder(setter(custom))]
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[builder(default)]
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[builder(default)]
    #[serde(default)]
    pub termination_scope: TerminationScope,
}

impl LaunchSpec {
    pub fn builder() -> LaunchSpecBuilder {
        LaunchSpecBuilder::default()
    }

    /// Shorthand for a spec with only a command and arguments
    pub fn new<S: ToString, I: IntoIterator<Item = S>>(command: impl Into<String>, args: I) -> Self {
        Self {
            command: command.into(),
            args: args.into_iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// `command arg1 arg2`, used in log lines
    pub fn display_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl LaunchSpecBuilder {
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

    fn validate(&self) -> Result<(), String> {
        match &self.command {
            Some(command) if command.trim().is_empty() => Err("command must not be empty".into()),
            _ => Ok(()),
        }
    }
}

// Default value functions for serde
fn default_relay_buffer() -> usize {
    64
}
fn default_chunk_capacity() -> usize {
    1024
}
fn default_drain_timeout_ms() -> u64 {
    5_000
}
