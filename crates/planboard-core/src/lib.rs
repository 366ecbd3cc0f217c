pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod dates;
pub mod filter;
pub mod render;
pub mod report;
pub mod task;
pub mod view;

use std::ffi::OsString;
use std::io;

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
    "starting planboard CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  )?;

  let command = match cli.command {
    | Some(command) => command,
    | None => {
      debug!(
        default = %cfg.default_command(),
        "no subcommand; using default.command"
      );
      cli::Command::from_default(
        cfg.default_command()
      )
    }
  };

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
    datastore::FileTaskStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open task store at \
         {}",
        data_dir.display()
      )
    })?;

  let now = dates::local_now();
  let mut board =
    view::Board::load(store, now.date())?;
  let renderer =
    render::Renderer::new(&cfg);

  let stdout = io::stdout();
  let stdin = io::stdin();
  commands::dispatch(
    &mut board,
    &cfg,
    &renderer,
    command,
    now,
    &mut stdout.lock(),
    &mut stdin.lock()
  )?;

  info!("done");
  Ok(())
}
