use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Local,
  Months,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "planboard-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "PLANBOARD_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "PLANBOARD_TIME_CONFIG";

pub const INPUT_DATE_FORMAT: &str =
  "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Zone override, if one is configured.
/// `None` means the system local zone.
pub fn configured_timezone()
-> Option<&'static Tz> {
  static CONFIGURED_TZ: OnceLock<
    Option<Tz>
  > = OnceLock::new();
  CONFIGURED_TZ
    .get_or_init(resolve_timezone)
    .as_ref()
}

/// Current local wall-clock time. This
/// is the only place the clock is read;
/// everything downstream takes `now` as
/// a parameter.
#[must_use]
pub fn local_now() -> NaiveDateTime {
  match configured_timezone() {
    | Some(tz) => {
      Utc::now()
        .with_timezone(tz)
        .naive_local()
    }
    | None => Local::now().naive_local()
  }
}

fn resolve_timezone() -> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return Some(tz);
  }

  if let Some(path) =
    timezone_config_path()
  {
    return load_timezone_from_file(
      &path
    );
  }

  None
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found; using system zone"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses a `YYYY-MM-DD` string into a
/// calendar date. No timezone is
/// involved, so the day never drifts.
pub fn parse_local_date(
  s: &str
) -> anyhow::Result<NaiveDate> {
  NaiveDate::parse_from_str(
    s.trim(),
    INPUT_DATE_FORMAT
  )
  .with_context(|| {
    format!(
      "invalid date (expected \
       YYYY-MM-DD): {s}"
    )
  })
}

#[must_use]
pub fn format_date_to_input(
  date: NaiveDate
) -> String {
  date
    .format(INPUT_DATE_FORMAT)
    .to_string()
}

#[must_use]
pub fn format_date_readable(
  date: NaiveDate
) -> String {
  date.format("%-d %b %Y").to_string()
}

pub fn is_same_day<A, B>(
  a: &A,
  b: &B
) -> bool
where
  A: Datelike,
  B: Datelike
{
  a.year() == b.year()
    && a.month() == b.month()
    && a.day() == b.day()
}

/// Local midnight of `date`, the
/// instant every date field is compared
/// at.
#[must_use]
pub fn start_of_day(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(NaiveTime::MIN)
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> anyhow::Result<NaiveDate> {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .ok_or_else(|| {
    anyhow!(
      "invalid month: {year}-{month}"
    )
  })
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> anyhow::Result<NaiveDate> {
  let first =
    first_day_of_month(year, month)?;
  first
    .checked_add_months(Months::new(1))
    .and_then(|next| next.pred_opt())
    .ok_or_else(|| {
      anyhow!(
        "month out of range: \
         {year}-{month}"
      )
    })
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> anyhow::Result<u32> {
  Ok(
    last_day_of_month(year, month)?
      .day()
  )
}

/// Moves `(year, month)` by `step`
/// months, rolling the year over in
/// either direction. Fails when the
/// result is not a representable date.
pub fn shift_months(
  year: i32,
  month: u32,
  step: i32
) -> anyhow::Result<(i32, u32)> {
  let out_of_range = || {
    anyhow!(
      "cannot move {year}-{month} by \
       {step} months"
    )
  };
  let index = i64::from(year)
    .checked_mul(12)
    .and_then(|base| {
      base.checked_add(
        i64::from(month) - 1
          + i64::from(step)
      )
    })
    .ok_or_else(out_of_range)?;
  let shifted_year =
    i32::try_from(index.div_euclid(12))
      .map_err(|_| out_of_range())?;
  let shifted_month =
    index.rem_euclid(12) as u32 + 1;

  first_day_of_month(
    shifted_year,
    shifted_month
  )
  .map_err(|_| out_of_range())?;
  Ok((shifted_year, shifted_month))
}

/// Parses `YYYY-MM`.
pub fn parse_year_month(
  s: &str
) -> anyhow::Result<(i32, u32)> {
  let (year, month) = s
    .trim()
    .split_once('-')
    .ok_or_else(|| {
      anyhow!(
        "invalid month (expected \
         YYYY-MM): {s}"
      )
    })?;
  let year = year
    .parse::<i32>()
    .with_context(|| {
      format!("invalid year in {s}")
    })?;
  let month = month
    .parse::<u32>()
    .with_context(|| {
      format!("invalid month in {s}")
    })?;
  first_day_of_month(year, month)?;
  Ok((year, month))
}
