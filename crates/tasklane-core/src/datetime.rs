use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "tasklane-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKLANE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKLANE_TIME_CONFIG";
const SYSTEM_TZ_ENV_VAR: &str = "TZ";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone from the environment or the
/// timezone file, if either names one.
/// Resolved once per process.
pub fn configured_timezone()
-> Option<Tz> {
  static CONFIGURED_TZ: OnceLock<
    Option<Tz>
  > = OnceLock::new();
  *CONFIGURED_TZ.get_or_init(|| {
    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      return Some(tz);
    }

    timezone_config_path().and_then(
      |path| {
        load_timezone_from_file(&path)
      }
    )
  })
}

/// The calendar used for day
/// boundaries: environment/file first,
/// then the `timezone` config key, then
/// `TZ`, then the host zone, then UTC.
#[tracing::instrument]
pub fn resolve_timezone(
  config_value: Option<&str>
) -> Tz {
  timezone_from_sources(
    configured_timezone(),
    config_value,
    std::env::var(SYSTEM_TZ_ENV_VAR)
      .ok()
      .as_deref(),
    system_timezone_name().as_deref()
  )
}

/// IANA name of the host's zone, as
/// `/etc/localtime` or the platform
/// reports it.
pub fn system_timezone_name()
-> Option<String> {
  match iana_time_zone::get_timezone() {
    | Ok(name) => Some(name),
    | Err(err) => {
      tracing::debug!(
        error = %err,
        "host timezone unavailable"
      );
      None
    }
  }
}

fn timezone_from_sources(
  configured: Option<Tz>,
  config_value: Option<&str>,
  tz_env: Option<&str>,
  system: Option<&str>
) -> Tz {
  if let Some(tz) = configured {
    return tz;
  }

  if let Some(raw) = config_value
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  if let Some(raw) = tz_env
    && let Some(tz) = parse_timezone(
      raw,
      SYSTEM_TZ_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(raw) = system
    && let Some(tz) =
      parse_timezone(raw, "system")
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
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
      "timezone config file not found"
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

/// First instant of `date` in `tz`.
/// Zones that skip midnight for DST
/// start the day at the first hour
/// that exists.
#[must_use]
pub fn local_midnight(
  date: NaiveDate,
  tz: Tz
) -> DateTime<Utc> {
  for hour in 0..24 {
    let Some(time) =
      NaiveTime::from_hms_opt(
        hour, 0, 0
      )
    else {
      continue;
    };
    if let Some(local) = tz
      .from_local_datetime(
        &date.and_time(time)
      )
      .earliest()
    {
      return local
        .with_timezone(&Utc);
    }
  }

  Utc.from_utc_datetime(
    &date.and_time(NaiveTime::MIN)
  )
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> NaiveDate {
  dt.with_timezone(&tz).date_naive()
}

#[must_use]
pub fn start_of_day(
  now: DateTime<Utc>,
  tz: Tz
) -> DateTime<Utc> {
  local_midnight(
    local_date(now, tz),
    tz
  )
}

/// Start of the following calendar
/// day, which is not always 24h after
/// [`start_of_day`].
#[must_use]
pub fn start_of_next_day(
  now: DateTime<Utc>,
  tz: Tz
) -> DateTime<Utc> {
  let today = local_date(now, tz);
  match today.succ_opt() {
    | Some(tomorrow) => {
      local_midnight(tomorrow, tz)
    }
    | None => DateTime::<Utc>::MAX_UTC
  }
}

#[must_use]
pub fn format_local(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  tz.from_local_datetime(&local_naive)
    .earliest()
    .map(|local| {
      local.with_timezone(&Utc)
    })
    .ok_or_else(|| {
      anyhow!(
        "local datetime does not \
         exist in timezone {}: \
         {context}",
        tz.name()
      )
    })
}

#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return Ok(start_of_day(now, tz));
    }
    | "tomorrow" => {
      return Ok(start_of_next_day(
        now, tz
      ));
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    let target_date = next_weekday_date(
      local_date(now, tz),
      target_weekday
    );
    return Ok(local_midnight(
      target_date,
      tz
    ));
  }

  if let Some((hour, minute)) =
    parse_clock_time(token)
  {
    let time =
      NaiveTime::from_hms_opt(
        hour, minute, 0
      )
      .ok_or_else(|| {
        anyhow!(
          "invalid clock time: \
           {token}"
        )
      })?;
    return to_utc_from_local(
      local_date(now, tz)
        .and_time(time),
      tz,
      "clock-time"
    );
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let negative = caps
      .name("sign")
      .is_some_and(|m| m.as_str() == "-");
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let duration = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("d") => {
        Duration::try_days(num)
      }
      | Some("h") => {
        Duration::try_hours(num)
      }
      | Some("m") => {
        Duration::try_minutes(num)
      }
      | other => {
        return Err(anyhow!(
          "unknown relative unit: \
           {other:?}"
        ));
      }
    }
    .ok_or_else(|| {
      anyhow!(
        "relative offset out of range: \
         {token}"
      )
    })?;

    let shifted = if negative {
      now.checked_sub_signed(duration)
    } else {
      now.checked_add_signed(duration)
    };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative offset out of range: \
         {token}"
      )
    });
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(local_midnight(
      date, tz
    ));
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_local(
        ndt, tz, fmt
      );
    }
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow, weekday \
     names (e.g. monday), clock times \
     (e.g. 8:30am or 20:30), \
     +Nd/+Nh/+Nm, RFC3339, \
     YYYY-MM-DD, YYYY-MM-DDTHH:MM, \
     YYYY-MM-DD HH:MM"
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm_match
      .as_str()
      .to_ascii_lowercase()
      .as_str()
    {
      | "am" => raw_hour % 12,
      | "pm" => raw_hour % 12 + 12,
      | _ => return None
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

pub mod utc_stamp_serde {
  use chrono::{
    DateTime,
    NaiveDateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const FORMAT: &str = "%Y%m%dT%H%M%SZ";

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.format(FORMAT).to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            .map_err(serde::de::Error::custom)
  }
}
