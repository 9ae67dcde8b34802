pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod list;
pub mod reminder;
pub mod render;
pub mod task;
pub mod view_state;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::TaskError;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasklane CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir = cfg
    .data_dir(cli.data.as_deref())
    .context(
      "failed to resolve data \
       directory"
    )?;

  let tz = datetime::resolve_timezone(
    cfg.timezone()
  );

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let spool =
    reminder::SpoolCenter::open(
      &data_dir,
      cfg.notifications()?
    )
    .with_context(|| {
      format!(
        "failed to open reminder \
         spool at {}",
        data_dir.display()
      )
    })?;

  let now = Utc::now();
  let mut session =
    commands::Session::new(
      &cfg, store, spool, tz, now
    );
  let mut renderer =
    render::Renderer::new(&cfg, tz)?;

  commands::dispatch(
    &mut session,
    &mut renderer,
    cli.command,
    now
  )?;

  info!("done");
  Ok(())
}
