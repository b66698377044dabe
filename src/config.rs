use color_eyre::{eyre::eyre, Result};
use hmis_sync::hmis::StalePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Tenant used when the login response does not name one
  pub tenant_id: Option<String>,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL including the API prefix, e.g. https://hmis.example.org/api/v1
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  pub list_stale_secs: u64,
  pub reference_stale_secs: u64,
  pub gc_secs: u64,
  pub track_board_poll_secs: u64,
  pub critical_values_poll_secs: u64,
  pub dashboard_poll_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    let policy = StalePolicy::default();
    Self {
      list_stale_secs: policy.list.as_secs(),
      reference_stale_secs: policy.reference.as_secs(),
      gc_secs: hmis_sync::cache::DEFAULT_GC_TIME.as_secs(),
      track_board_poll_secs: policy.track_board_poll.as_secs(),
      critical_values_poll_secs: policy.critical_values_poll.as_secs(),
      dashboard_poll_secs: policy.dashboard_poll.as_secs(),
    }
  }
}

impl CacheConfig {
  pub fn stale_policy(&self) -> StalePolicy {
    StalePolicy {
      list: Duration::from_secs(self.list_stale_secs),
      reference: Duration::from_secs(self.reference_stale_secs),
      track_board_poll: Duration::from_secs(self.track_board_poll_secs.max(1)),
      critical_values_poll: Duration::from_secs(self.critical_values_poll_secs.max(1)),
      dashboard_poll: Duration::from_secs(self.dashboard_poll_secs.max(1)),
    }
  }

  pub fn gc_time(&self) -> Duration {
    Duration::from_secs(self.gc_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hmis.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hmis/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/hmis/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("hmis.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hmis").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    if url::Url::parse(&config.api.base_url).is_err() {
      return Err(eyre!("api.base_url is not a valid URL: {}", config.api.base_url));
    }
    Ok(config)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs.max(1))
  }

  /// Header title: configured title, else the API host.
  pub fn display_title(&self) -> String {
    self.title.clone().unwrap_or_else(|| {
      url::Url::parse(&self.api.base_url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| "hmis".to_string())
    })
  }

  /// Get the sign-in password from the environment.
  ///
  /// Checks HMIS_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("HMIS_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set the HMIS_PASSWORD environment variable."))
  }
}
