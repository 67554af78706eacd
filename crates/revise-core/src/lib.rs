pub mod app;
pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod csv;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod merge;
pub mod prompt;
pub mod render;
pub mod store;
pub mod task;
pub mod theme;

use std::ffi::OsString;
use std::rc::Rc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

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
    "starting revise CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.reviserc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

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

  let clock = datetime::Clock::resolve(
    &cfg, &data_dir
  );
  let mut app =
    app::App::open(Rc::new(store), clock)
      .context(
        "failed to load review data"
      )?;

  let mut renderer =
    render::Renderer::new(
      &cfg,
      app.theme()
    )?;
  let command =
    cli.command.unwrap_or(
      cli::Command::List {
        terms: vec![]
      }
    );

  commands::dispatch(
    &mut app,
    &cfg,
    &mut renderer,
    command
  )?;

  info!("done");
  Ok(())
}
