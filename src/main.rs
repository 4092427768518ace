mod board;
mod cache;
mod commands;
mod config;
mod error;
mod logging;
mod query;
mod render;
mod session;
mod tracker;
mod validate;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use crate::tracker::types::ProjectId;

#[derive(Parser, Debug)]
#[command(name = "kanbo")]
#[command(about = "A terminal client for a kanban-style project and issue tracker")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/kanbo/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Project id to use instead of default_project
  #[arg(short, long, global = true)]
  project: Option<ProjectId>,

  /// Disable coloured output
  #[arg(long, global = true)]
  no_color: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let log_dir = config::Config::data_dir().ok().map(|dir| dir.join("logs"));
  let _log_guard = logging::init(log_dir.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override project if specified on command line
  let config = if let Some(project) = args.project {
    config::Config {
      default_project: Some(project),
      ..config
    }
  } else {
    config
  };

  let client = tracker::CachedTrackerClient::from_config(&config)?;
  let painter = if args.no_color {
    render::Painter::new(false)
  } else {
    render::Painter::for_stdout()
  };
  let ctx = commands::Context {
    config,
    client,
    painter,
  };

  let result = commands::run(args.command, &ctx).await;
  if let Some(hint) = result
    .as_ref()
    .err()
    .and_then(|report| report.downcast_ref::<error::ApiError>())
    .and_then(commands::hint)
  {
    eprintln!("{}", hint);
  }
  result
}
