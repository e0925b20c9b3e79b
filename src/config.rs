use crate::models::BackendKind;
use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Full configuration snapshot for one configured instance. Exactly one
/// backend's sections must be present, matching `backend`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendKind,
    #[serde(default)]
    pub server: ServerConfig,
    pub overseerr: Option<OverseerrConfig>,
    pub radarr: Option<ArrInstanceConfig>,
    pub sonarr: Option<SonarrInstanceConfig>,
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub presets: Vec<Preset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8150))
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverseerrConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub defaults: OverseerrDefaults,
}

/// Saved Overseerr destination selections. The single `server_id` /
/// `profile_id` fields are the legacy one-server form kept for existing
/// configs; the per-service fields take precedence over them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverseerrDefaults {
    pub radarr_server_id: Option<i64>,
    pub sonarr_server_id: Option<i64>,
    pub movie_profile_id: Option<i64>,
    pub tv_profile_id: Option<i64>,
    pub server_id: Option<i64>,
    pub profile_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArrInstanceConfig {
    pub base_url: String,
    pub api_key: String,
    pub root_folder: Option<String>,
    pub quality_profile_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SonarrInstanceConfig {
    pub base_url: String,
    pub api_key: String,
    pub root_folder: Option<String>,
    pub quality_profile_id: Option<i64>,
    pub language_profile_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultSeasons {
    Season1,
    All,
}

impl Default for DefaultSeasons {
    fn default() -> Self {
        Self::Season1
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionsConfig {
    #[serde(default)]
    pub default_tv_seasons: DefaultSeasons,
}

/// A named bundle of arr destination choices selectable per call.
#[derive(Debug, Clone, Deserialize)]
pub struct Preset {
    pub name: String,
    pub radarr: Option<PresetTarget>,
    pub sonarr: Option<PresetTarget>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresetTarget {
    pub root_folder: Option<String>,
    pub quality_profile_id: Option<i64>,
    pub language_profile_id: Option<i64>,
}

impl AppConfig {
    /// Load from a TOML file with `FETCHARR_`-prefixed environment
    /// overrides (double underscore as the section separator, e.g.
    /// `FETCHARR_OVERSEERR__API_KEY`).
    pub fn load(path: &Path) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FETCHARR_").split("__"))
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(toml_str: &str) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Toml::string(toml_str))
            .extract()
            .context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.backend {
            BackendKind::Overseerr => {
                if self.overseerr.is_none() {
                    bail!("backend = \"overseerr\" requires an [overseerr] section");
                }
            }
            BackendKind::Arr => {
                if self.radarr.is_none() || self.sonarr.is_none() {
                    bail!("backend = \"arr\" requires both [radarr] and [sonarr] sections");
                }
            }
        }
        for preset in &self.presets {
            if preset.name.trim().is_empty() {
                bail!("presets must have a non-empty name");
            }
        }
        Ok(())
    }
}
