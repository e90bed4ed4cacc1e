mod cache;
mod clock;
mod config;
mod db;
mod logging;
mod portal;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use cache::{CacheSource, DurableStore, KeyValueStore, MemoryStore};
use clock::SystemClock;
use config::Config;
use portal::{
  HttpTransport, Location, Notice, Pipeline, Progress, ProgressRequest, ProjectSettings, SkipReason,
};

#[derive(Parser, Debug)]
#[command(name = "portal-progress")]
#[command(about = "Show hours booked in the booking portal for GitLab tickets")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/portal-progress/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Path to the state database (default: $XDG_DATA_HOME/portal-progress/store.db)
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  /// Write logs to stderr instead of the log file
  #[arg(long, global = true)]
  log_stderr: bool,

  /// Print progress as JSON lines
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Progress for the ticket shown at a GitLab URL
  Progress {
    /// GitLab board, issue or drawer URL
    url: String,
    /// Ticket number, when the URL does not carry one
    #[arg(long)]
    issue: Option<String>,
    /// Bypass cache and refresh throttle, and lift a block on the project
    #[arg(long)]
    force: bool,
  },
  /// Progress for several tickets on the board at a GitLab URL
  Board {
    url: String,
    #[arg(required = true)]
    issues: Vec<String>,
  },
  /// Clear cached progress and every project block
  Clear,
  /// Show or store the portal settings of the project at a GitLab URL
  Config {
    url: String,
    #[arg(long)]
    project_id: Option<String>,
    #[arg(long)]
    portal_base_url: Option<String>,
  },
  /// Show or change feature flags
  Flags {
    #[arg(long)]
    debug: Option<Switch>,
    #[arg(long)]
    show: Option<Switch>,
  },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Switch {
  On,
  Off,
}

impl From<Switch> for bool {
  fn from(switch: Switch) -> Self {
    matches!(switch, Switch::On)
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let store = open_store(args.db.as_deref());
  let debug = portal_flags(&store).debug();
  let _log_guard = logging::init(debug, args.log_stderr)?;

  let config = Config::load(args.config.as_deref())?;
  let cookie = Config::get_session_cookie();
  if cookie.is_none() {
    warn!("no portal session cookie set, requests go out anonymously");
  }
  let transport = Arc::new(HttpTransport::new(cookie.as_deref())?);
  let pipeline = Pipeline::open(store, transport, Arc::new(SystemClock), &config.portal);
  let mut notices = pipeline.subscribe_notices();

  match args.command {
    Command::Progress { url, issue, force } => {
      let (location, settings) = resolve(&url, &config, &pipeline)?;
      let issue = issue
        .or_else(|| location.issue_id.clone())
        .ok_or_else(|| eyre!("No ticket in {}; pass --issue", url))?;
      debug!(issue, detail_view = location.is_detail_view(), "resolved ticket");
      let request = request_for(&location, issue);
      let progress = if force {
        pipeline.force_refresh(&settings, &request).await
      } else {
        pipeline.get_or_fetch(&settings, &request).await
      };
      print_progress(&request.issue, &progress, args.json)?;
    }
    Command::Board { url, issues } => {
      let (location, settings) = resolve(&url, &config, &pipeline)?;
      let requests: Vec<ProgressRequest> = issues
        .into_iter()
        .map(|issue| request_for(&location, issue))
        .collect();
      let results = join_all(
        requests
          .iter()
          .map(|request| pipeline.get_or_fetch(&settings, request)),
      )
      .await;
      for (request, progress) in requests.iter().zip(&results) {
        print_progress(&request.issue, progress, args.json)?;
      }
    }
    Command::Clear => {
      pipeline.clear();
      println!("Progress cache cleared");
    }
    Command::Config {
      url,
      project_id,
      portal_base_url,
    } => {
      let (_, mut settings) = resolve(&url, &config, &pipeline)?;
      if let Some(project_id) = project_id {
        pipeline.save_project_id(&mut settings, &project_id)?;
      }
      if let Some(base_url) = portal_base_url {
        pipeline.save_portal_base_url(&mut settings, &base_url)?;
      }
      print_settings(&settings);
    }
    Command::Flags { debug, show } => {
      let flags = pipeline.flags();
      if let Some(debug) = debug {
        flags.set_debug(debug.into());
      }
      if let Some(show) = show {
        flags.set_show(show.into());
      }
      println!("debug: {}", on_off(flags.debug()));
      println!("show:  {}", on_off(flags.show()));
    }
  }

  print_notices(&mut notices);
  Ok(())
}

/// Durable store, or an in-memory one for this run if the database is unusable.
fn open_store(path: Option<&std::path::Path>) -> Arc<dyn KeyValueStore> {
  let opened = match path {
    Some(path) => db::Database::open_at(path),
    None => db::Database::open(),
  };
  match opened {
    Ok(db) => Arc::new(db),
    Err(e) => {
      eprintln!("warning: {}; state is not kept after this run", e);
      Arc::new(MemoryStore::new())
    }
  }
}

fn portal_flags(store: &Arc<dyn KeyValueStore>) -> portal::FeatureFlags {
  portal::FeatureFlags::new(DurableStore::new(store.clone()))
}

fn resolve(url: &str, config: &Config, pipeline: &Pipeline) -> Result<(Location, ProjectSettings)> {
  let location = Location::parse(url)?;
  let settings = ProjectSettings::resolve(&location, config, pipeline.stored_configs())
    .ok_or_else(|| eyre!("Could not determine the GitLab project from {}", url))?;
  Ok((location, settings))
}

fn request_for(location: &Location, issue: String) -> ProgressRequest {
  match &location.board_id {
    Some(board_id) => ProgressRequest::on_board(issue, board_id.clone()),
    None => ProgressRequest::detail(issue),
  }
}

/// Machine-readable form of one lookup.
#[derive(Debug, Serialize)]
struct ProgressLine<'a> {
  issue: &'a str,
  status: &'static str,
  summary: Option<String>,
  spent_hours: Option<f64>,
  remaining_hours: Option<f64>,
  over_hours: Option<f64>,
  booked_hours: Option<f64>,
  spent_percent: Option<f64>,
  cached: bool,
  message: Option<String>,
}

impl<'a> ProgressLine<'a> {
  fn new(issue: &'a str, progress: &Progress) -> Self {
    let mut line = Self {
      issue,
      status: "found",
      summary: None,
      spent_hours: None,
      remaining_hours: None,
      over_hours: None,
      booked_hours: None,
      spent_percent: None,
      cached: false,
      message: None,
    };
    match progress {
      Progress::Found(result) => {
        let record = &result.data;
        line.summary = Some(record.summary());
        line.spent_hours = record.spent_hours();
        line.remaining_hours = record.remaining_hours();
        line.over_hours = record.over_hours();
        line.booked_hours = record.booked_hours();
        line.spent_percent = Some(record.spent_percent());
        line.cached = result.source != CacheSource::Network;
      }
      Progress::NoData => line.status = "no_data",
      Progress::Skipped(reason) => {
        line.status = "skipped";
        line.message = Some(describe(*reason).to_string());
      }
      Progress::Failed(e) => {
        line.status = "failed";
        line.message = Some(e.to_string());
      }
    }
    line
  }
}

fn print_progress(issue: &str, progress: &Progress, json: bool) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string(&ProgressLine::new(issue, progress))?);
  } else {
    println!("{}", render(issue, progress));
  }
  Ok(())
}

fn render(issue: &str, progress: &Progress) -> String {
  match progress {
    Progress::Found(result) => {
      let record = &result.data;
      let percent = record.spent_percent();
      let mut line = format!("#{} {}", issue, record.summary());
      if percent > 0.0 {
        line.push_str(&format!(" [{:.0}% spent]", percent));
      }
      if let (Some(booked), false) = (&record.booked, record.is_booked_only()) {
        let label = record
          .booked_label
          .as_deref()
          .unwrap_or(portal::DEFAULT_BOOKED_LABEL);
        line.push_str(&format!(" ({}: {})", label, booked));
      }
      line.push_str(&format!(" <{}", result.source.label()));
      if let Some(cached_at) = result.cached_at {
        line.push_str(&format!(", {}", cached_at.format("%Y-%m-%d %H:%M UTC")));
      }
      line.push('>');
      line
    }
    Progress::NoData => format!("#{} no progress data", issue),
    Progress::Skipped(reason) => format!("#{} skipped: {}", issue, describe(*reason)),
    Progress::Failed(e) => format!("#{} {}", issue, e),
  }
}

fn describe(reason: SkipReason) -> &'static str {
  match reason {
    SkipReason::NotConfigured => "project id or portal URL not configured",
    SkipReason::Hidden => "progress display is off",
    SkipReason::Throttled => "cached data expired, waiting for the next refresh round",
    SkipReason::Blocked => "portal requests for this project are paused",
  }
}

fn print_settings(settings: &ProjectSettings) {
  println!("project:     {}", settings.project_path);
  println!(
    "project id:  {}",
    settings.project_id.as_deref().unwrap_or("(not set)")
  );
  println!(
    "portal:      {}",
    settings.portal_base().as_deref().unwrap_or("(not set)")
  );
}

fn print_notices(notices: &mut UnboundedReceiver<Notice>) {
  while let Ok(notice) = notices.try_recv() {
    eprintln!("{}", notice.message);
  }
}

fn on_off(value: bool) -> &'static str {
  if value {
    "on"
  } else {
    "off"
  }
}
