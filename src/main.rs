mod app;
mod commands;
mod config;
mod db;
mod event;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use hmis_sync::api::ReqwestTransport;
use hmis_sync::hmis::Credentials;
use hmis_sync::{ApiClient, AuthContext, HmisClient, QueryClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::app::StartView;
use crate::db::SessionStore;

#[derive(Parser, Debug)]
#[command(name = "hmis")]
#[command(about = "Terminal client for a hospital information system")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hmis/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Tenant to sign in to, overriding tenant_id from the config file
  #[arg(short, long)]
  tenant: Option<String>,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Cmd {
  /// Sign in (password from HMIS_PASSWORD) and remember the session
  Login {
    #[arg(short, long)]
    email: String,
  },
  /// Forget the stored session
  Logout,
  /// Emergency department track board
  Board,
  /// Pending laboratory worklist
  Labs,
}

/// Log to a daily file in the data directory; the terminal belongs to the UI.
fn init_logging(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir).map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::daily(dir, "hmis.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("HMIS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = init_logging(&SessionStore::data_dir()?.join("logs"))?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override tenant if specified on command line
  let config = if let Some(tenant) = args.tenant {
    config::Config {
      tenant_id: Some(tenant),
      ..config
    }
  } else {
    config
  };

  let store = SessionStore::open()?;
  let auth = match store.load()? {
    Some(session) => AuthContext::with_session(session),
    None => AuthContext::new(),
  };

  let transport = ReqwestTransport::new(config.timeout())?;
  let api = ApiClient::new(&config.api.base_url, Arc::new(transport), auth);
  let cache = QueryClient::with_gc_time(config.cache.gc_time());
  let client = HmisClient::new(api, cache)
    .with_policy(config.cache.stale_policy())
    .with_default_tenant(config.tenant_id.clone());

  tracing::info!(base_url = %config.api.base_url, "starting hmis");

  match args.command.unwrap_or(Cmd::Board) {
    Cmd::Login { email } => {
      let credentials = Credentials {
        email,
        password: config::Config::get_password()?,
        tenant_id: config.tenant_id.clone(),
      };
      let session = client
        .sign_in(&credentials)
        .await
        .map_err(|e| eyre!("Sign-in failed: {}", e.user_message()))?;
      store.save(&session)?;
      println!(
        "Signed in as {} ({})",
        session.user.as_deref().unwrap_or("unknown user"),
        session.tenant_id
      );
    }
    Cmd::Logout => {
      client.sign_out();
      store.clear()?;
      println!("Signed out");
    }
    Cmd::Board => run_tui(config, client, store, StartView::TrackBoard).await?,
    Cmd::Labs => run_tui(config, client, store, StartView::LabWorklist).await?,
  }

  Ok(())
}

async fn run_tui(
  config: config::Config,
  client: HmisClient,
  store: SessionStore,
  start: StartView,
) -> Result<()> {
  if !client.auth().is_signed_in() {
    return Err(eyre!("Not signed in. Run `hmis login --email <EMAIL>` first."));
  }

  let gc = client.cache().spawn_gc(client.cache().gc_time());

  let mut app = app::App::new(config, client, start);
  let result = app.run().await;
  gc.abort();

  // Only a session that ended inside the UI is forgotten on disk
  if app.session_ended() {
    store.clear()?;
  }
  result
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_command_is_none() {
    let args = Args::try_parse_from(["hmis"]).unwrap();
    assert!(args.command.is_none());
    assert!(args.config.is_none());
  }

  #[test]
  fn test_login_requires_email() {
    assert!(Args::try_parse_from(["hmis", "login"]).is_err());

    let args = Args::try_parse_from(["hmis", "--tenant", "north", "login", "--email", "a@b.org"]).unwrap();
    assert_eq!(args.tenant.as_deref(), Some("north"));
    assert_eq!(
      args.command,
      Some(Cmd::Login {
        email: "a@b.org".to_string()
      })
    );
  }

  #[test]
  fn test_labs_subcommand() {
    let args = Args::try_parse_from(["hmis", "labs"]).unwrap();
    assert_eq!(args.command, Some(Cmd::Labs));
  }
}
