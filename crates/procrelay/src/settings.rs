use crate::bundler::TestBundleConfig;
use crate::error::SettingsError;
use crate::publish::PublishOptions;
use procrelay_core::{LaunchSpec, RelayConfig, TerminationScope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_SETTINGS_FILE: &str = "procrelay.toml";

pub const SERVER_PRESET: &str = "server";
pub const TEST_SERVER_PRESET: &str = "test-server";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishSettings {
    #[serde(default = "default_docs_source")]
    pub source: PathBuf,
    #[serde(flatten)]
    pub options: PublishOptions,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            source: default_docs_source(),
            options: PublishOptions::default(),
        }
    }
}

fn default_docs_source() -> PathBuf {
    PathBuf::from("docs")
}

/// Everything the CLI can be configured with.
///
/// Sections missing from the file keep their built-in values; presets from the
/// file are merged over the built-in `server` / `test-server` presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub presets: BTreeMap<String, LaunchSpec>,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub publish: PublishSettings,
    #[serde(default = "default_bundle")]
    pub bundle: TestBundleConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            presets: builtin_presets(),
            relay: RelayConfig::default(),
            publish: PublishSettings::default(),
            bundle: default_bundle(),
        }
    }
}

fn default_bundle() -> TestBundleConfig {
    TestBundleConfig::fable_signalr_tests("tests/Fable.SignalR.Tests")
}

/// `dotnet run` starts the app as a grandchild that inherits the pipes, so the
/// dotnet presets signal the whole process group.
fn dotnet_run(project: &str) -> LaunchSpec {
    LaunchSpec {
        termination_scope: TerminationScope::ProcessGroup,
        ..LaunchSpec::new("dotnet", ["run", "-p", project])
    }
}

fn builtin_presets() -> BTreeMap<String, LaunchSpec> {
    BTreeMap::from([
        (
            SERVER_PRESET.to_string(),
            dotnet_run("./demo/Server/Server.fsproj"),
        ),
        (
            TEST_SERVER_PRESET.to_string(),
            dotnet_run("./tests/Fable.SignalR.TestServer/Fable.SignalR.TestServer.fsproj"),
        ),
    ])
}

impl Settings {
    /// Parse settings from TOML text, on top of the built-in presets
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, SettingsError> {
        let parsed: Settings = toml::from_str(text).map_err(|source| SettingsError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        let mut presets = builtin_presets();
        presets.extend(parsed.presets);

        let settings = Settings { presets, ..parsed };
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path`, or from `procrelay.toml` if present, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if !default.is_file() {
                    debug!("No {} found, using built-in settings", DEFAULT_SETTINGS_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = std::fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        info!("Loaded settings from {}", path.display());
        Self::from_toml_str(&text, &path)
    }

    pub fn preset(&self, name: &str) -> Result<&LaunchSpec, SettingsError> {
        self.presets
            .get(name)
            .ok_or_else(|| SettingsError::UnknownPreset(name.to_string()))
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.relay
            .validate()
            .map_err(|e| SettingsError::Invalid(format!("relay: {e}")))?;

        if let Some((name, _)) = self
            .presets
            .iter()
            .find(|(_, spec)| spec.command.trim().is_empty())
        {
            return Err(SettingsError::Invalid(format!(
                "preset `{name}` has an empty command"
            )));
        }
        Ok(())
    }
}
