use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::filter::Tab;

const RC_ENV_VAR: &str = "TASKLANERC";
const RC_FILE_NAME: &str = ".tasklanerc";

/// Settings tasklane reads, with their
/// defaults. `timezone` has none.
const SETTINGS: [(&str, Option<&str>); 5] = [
  ("data.location", Some("~/.tasklane")),
  ("default.tab", Some("Today")),
  ("notifications", Some("on")),
  ("color", Some("on")),
  ("timezone", None)
];

#[derive(Debug, Clone)]
pub struct Config {
  values:           HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// One meaningful line of an rc file.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Entry {
    key:   &'a str,
    value: &'a str
  }
}

impl Default for Config {
  fn default() -> Self {
    let values = SETTINGS
      .iter()
      .filter_map(|(key, default)| {
        default.map(|value| {
          (
            key.to_string(),
            value.to_string()
          )
        })
      })
      .collect();
    Self {
      values,
      loaded_files: vec![]
    }
  }
}

impl Config {
  /// Defaults, then the rc file (with
  /// its includes) if one is found.
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match locate_rc_file(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading rc file");
        let mut chain = Vec::new();
        cfg.read_rc(&path, &mut chain)?;
      }
      | None => {
        debug!(
          "no rc file found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Command-line settings win over
  /// the rc file. Keys may carry an
  /// `rc.` prefix.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key =
        key.strip_prefix("rc.").unwrap_or(&key);
      self.set(key, value.trim(), "override");
    }
  }

  pub fn default_tab(&self) -> Tab {
    self
      .values
      .get("default.tab")
      .map(|name| Tab::from_name(name))
      .unwrap_or_default()
  }

  pub fn notifications(
    &self
  ) -> anyhow::Result<bool> {
    self.switch("notifications")
  }

  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    self.switch("color")
  }

  pub fn timezone(&self) -> Option<&str> {
    self
      .values
      .get("timezone")
      .map(String::as_str)
      .filter(|tz| !tz.is_empty())
  }

  /// Where `tasks.data` and the reminder
  /// spool live. `--data` beats
  /// `data.location`. Created if missing.
  #[tracing::instrument(skip(
    self,
    override_dir
  ))]
  pub fn data_dir(
    &self,
    override_dir: Option<&Path>
  ) -> anyhow::Result<PathBuf> {
    let dir = match (
      override_dir,
      self.values.get("data.location")
    ) {
      | (Some(path), _) => {
        path.to_path_buf()
      }
      | (None, Some(location)) => {
        home_relative(location)?
      }
      | (None, None) => {
        home_relative("~/.tasklane")?
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

  fn switch(
    &self,
    key: &str
  ) -> anyhow::Result<bool> {
    let raw = self
      .values
      .get(key)
      .map(String::as_str)
      .unwrap_or("on");
    match raw.to_ascii_lowercase().as_str()
    {
      | "on" | "yes" | "true" | "1" => {
        Ok(true)
      }
      | "off" | "no" | "false" | "0" => {
        Ok(false)
      }
      | other => {
        bail!(
          "invalid {key} setting: \
           {other}"
        )
      }
    }
  }

  fn set(
    &mut self,
    key: &str,
    value: &str,
    origin: &str
  ) {
    if !SETTINGS
      .iter()
      .any(|(known, _)| *known == key)
    {
      warn!(key, origin, "unknown setting");
    }
    trace!(key, value, origin, "setting");
    self
      .values
      .insert(key.to_string(), value.to_string());
  }

  /// `chain` holds the files currently
  /// being read, outermost first.
  fn read_rc(
    &mut self,
    path: &Path,
    chain: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let path = home_relative(
      &path.to_string_lossy()
    )?;
    if chain.contains(&path) {
      bail!(
        "include cycle: {} includes \
         itself",
        path.display()
      );
    }

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
    chain.push(path.clone());

    let origin = path.display().to_string();
    for (idx, raw) in
      text.lines().enumerate()
    {
      let parsed = parse_rc_line(raw)
        .with_context(|| {
          format!("{origin}:{}", idx + 1)
        })?;
      match parsed {
        | None => {}
        | Some(RcLine::Entry {
          key,
          value
        }) => self.set(key, value, &origin),
        | Some(RcLine::Include(target)) => {
          let target =
            include_target(&path, target)?;
          if !target.exists() {
            warn!(include = %target.display(), "include file does not exist; skipping");
            continue;
          }
          debug!(
            include = %target.display(),
            line = idx + 1,
            "following include"
          );
          self.read_rc(&target, chain)?;
        }
      }
    }

    chain.pop();
    Ok(())
  }
}

/// `None` for blank and comment-only
/// lines. Values are `key = value` or
/// `key: value`; `#` starts a comment.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      bail!("include needs a path");
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }

  let (key, value) = line
    .split_once('=')
    .or_else(|| line.split_once(':'))
    .ok_or_else(|| {
      anyhow!(
        "expected `key = value`, got: \
         {line}"
      )
    })?;
  let key = key.trim();
  if key.is_empty() {
    bail!("setting has no key: {line}");
  }

  Ok(Some(RcLine::Entry {
    key,
    value: value.trim()
  }))
}

fn include_target(
  including: &Path,
  target: &str
) -> anyhow::Result<PathBuf> {
  let target = home_relative(target)?;
  if target.is_absolute() {
    return Ok(target);
  }
  let dir = including
    .parent()
    .unwrap_or_else(|| Path::new("."));
  Ok(dir.join(target))
}

/// `--config`, then `$TASKLANERC`
/// (`/dev/null` disables the rc file),
/// then `~/.tasklanerc` when present.
fn locate_rc_file(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(env_path) =
    std::env::var(RC_ENV_VAR)
  {
    return (env_path != "/dev/null")
      .then(|| PathBuf::from(env_path));
  }

  dirs::home_dir()
    .map(|home| home.join(RC_FILE_NAME))
    .filter(|candidate| {
      candidate.exists()
    })
}

/// Expands a leading `~` to the home
/// directory.
fn home_relative(
  raw: &str
) -> anyhow::Result<PathBuf> {
  let rest = match raw.strip_prefix('~') {
    | None => return Ok(PathBuf::from(raw)),
    | Some("") => "",
    | Some(rest) => {
      match rest.strip_prefix('/') {
        | Some(rest) => rest,
        | None => {
          return Ok(PathBuf::from(raw));
        }
      }
    }
  };
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory for {raw}"
      )
    })?;
  Ok(home.join(rest))
}
