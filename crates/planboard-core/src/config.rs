use std::fmt;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::report::ReportScope;

pub const RC_FILE_NAME: &str =
  ".planboardrc";
pub const RC_ENV_VAR: &str =
  "PLANBOARDRC";
const DEFAULT_DATA_DIR: &str =
  ".planboard";

/// View run when no subcommand is
/// given.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq
)]
pub enum DefaultCommand {
  #[default]
  List,
  Calendar,
  Report,
  Stats
}

impl DefaultCommand {
  pub fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "list" => Ok(Self::List),
      | "calendar" => {
        Ok(Self::Calendar)
      }
      | "report" => Ok(Self::Report),
      | "stats" => Ok(Self::Stats),
      | other => {
        Err(anyhow!(
          "default.command must be \
           list, calendar, report or \
           stats, got: {other}"
        ))
      }
    }
  }
}

impl fmt::Display for DefaultCommand {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | Self::List => "list",
      | Self::Calendar => "calendar",
      | Self::Report => "report",
      | Self::Stats => "stats"
    })
  }
}

/// Settings from the rc file and
/// overrides, checked as they are set.
#[derive(Debug, Clone)]
pub struct Config {
  data_location:   PathBuf,
  default_command: DefaultCommand,
  color:           bool,
  report_scope:    ReportScope,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_location:   expand_tilde(
        Path::new(&format!(
          "~/{DEFAULT_DATA_DIR}"
        ))
      ),
      default_command:
        DefaultCommand::default(),
      color:           true,
      report_scope:
        ReportScope::default(),
      loaded_files:    vec![]
    }
  }
}

enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Setting {
    key:   &'a str,
    value: &'a str
  }
}

fn parse_rc_line(
  raw_line: &str
) -> Option<RcLine<'_>> {
  let line = raw_line
    .split_once('#')
    .map_or(raw_line, |(before, _)| {
      before
    })
    .trim();
  if line.is_empty() {
    return Some(RcLine::Blank);
  }
  if let Some(rest) =
    line.strip_prefix("include ")
  {
    return Some(RcLine::Include(
      rest.trim()
    ));
  }
  line.split_once('=').map(|(k, v)| {
    RcLine::Setting {
      key:   k.trim(),
      value: v.trim()
    }
  })
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    if let Some(path) =
      resolve_rc_path(rc_override)
    {
      info!(rc = %path.display(), "loading planboardrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no planboardrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  /// Applies `rc.key=value` and
  /// `--rc key=value` pairs. The first
  /// bad value aborts.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k);
      debug!(key = %key, value = %v, "applying override");
      self.set(key, &v).with_context(
        || {
          format!(
            "invalid override {key}={v}"
          )
        }
      )?;
    }
    Ok(())
  }

  /// Parses `value` for `key` and
  /// stores it. Unknown keys are
  /// ignored with a warning.
  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    match key {
      | "data.location" => {
        if value.is_empty() {
          return Err(anyhow!(
            "data.location cannot be \
             empty"
          ));
        }
        self.data_location =
          expand_tilde(Path::new(value));
      }
      | "default.command" => {
        self.default_command =
          DefaultCommand::parse(value)?;
      }
      | "color" => {
        self.color = parse_bool(value)?;
      }
      | "report.scope" => {
        self.report_scope =
          ReportScope::parse(value)?;
      }
      | other => {
        warn!(key = %other, "unknown config key; ignoring");
      }
    }
    Ok(())
  }

  pub fn data_location(
    &self
  ) -> &Path {
    &self.data_location
  }

  pub fn default_command(
    &self
  ) -> DefaultCommand {
    self.default_command
  }

  pub fn color(&self) -> bool {
    self.color
  }

  pub fn report_scope(
    &self
  ) -> ReportScope {
    self.report_scope
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line_num = idx + 1;
      let at = || {
        format!(
          "{}:{line_num}",
          path.display()
        )
      };

      match parse_rc_line(raw_line) {
        | Some(RcLine::Blank) => {}
        | Some(RcLine::Include(
          include
        )) => {
          let include_path =
            resolve_include_path(
              &base_dir, include
            )
            .with_context(at)?;
          debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num,
            "processing include"
          );

          if self
            .loaded_files
            .contains(&include_path)
          {
            warn!(include = %include_path.display(), "include cycle; skipping");
          } else if include_path
            .exists()
          {
            self.load_file(
              &include_path
            )?;
          } else {
            warn!(include = %include_path.display(), "include file does not exist; skipping");
          }
        }
        | Some(RcLine::Setting {
          key,
          value
        }) => {
          trace!(key = %key, value = %value, "loaded config key");
          self
            .set(key, value)
            .with_context(|| {
              format!(
                "invalid setting at {}",
                at()
              )
            })?;
        }
        | None => {
          return Err(anyhow!(
            "invalid config line {}: \
             {raw_line}",
            at()
          ));
        }
      }
    }

    Ok(())
  }
}

/// `--data` wins over
/// `data.location`. The directory is
/// created when missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => {
      cfg.data_location().to_path_buf()
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

/// `--rc-file`, then `$PLANBOARDRC`,
/// then `~/.planboardrc` if present.
/// `/dev/null` turns the file off.
fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  let explicit = override_path
    .map(Path::to_path_buf)
    .or_else(|| {
      std::env::var_os(RC_ENV_VAR)
        .map(PathBuf::from)
    });

  match explicit {
    | Some(path)
      if path
        == Path::new("/dev/null") =>
    {
      debug!("rc file disabled");
      None
    }
    | Some(path) => Some(path),
    | None => {
      match dirs::home_dir() {
        | Some(home) => {
          Some(home.join(RC_FILE_NAME))
            .filter(|rc| rc.exists())
        }
        | None => {
          warn!(
            "cannot determine home \
             directory; skipping rc \
             file"
          );
          None
        }
      }
    }
  }
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(
  s: &str
) -> anyhow::Result<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Ok(true),
    | "0" | "n" | "no" | "off"
    | "false" => Ok(false),
    | other => {
      Err(anyhow!(
        "expected on/off, got: {other}"
      ))
    }
  }
}
