use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::config::Config;

pub const TIMEZONE_CONFIG_FILE: &str =
  "revise-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "REVISE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "REVISE_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Source of "today" for calendar
/// highlighting, defaults and export
/// file names.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
  tz:    Tz,
  fixed: Option<NaiveDate>
}

impl Default for Clock {
  fn default() -> Self {
    Self {
      tz:    chrono_tz::UTC,
      fixed: None
    }
  }
}

impl Clock {
  pub fn new(tz: Tz) -> Self {
    Self {
      tz,
      fixed: None
    }
  }

  /// A clock whose today never moves.
  pub fn fixed(today: NaiveDate) -> Self {
    Self {
      tz:    chrono_tz::UTC,
      fixed: Some(today)
    }
  }

  #[tracing::instrument(skip(
    cfg, data_dir
  ))]
  pub fn resolve(
    cfg: &Config,
    data_dir: &Path
  ) -> Self {
    Self::new(resolve_timezone(
      cfg, data_dir
    ))
  }

  pub fn timezone(&self) -> Tz {
    self.tz
  }

  #[must_use]
  pub fn today(&self) -> NaiveDate {
    self.fixed.unwrap_or_else(|| {
      self.date_of(Utc::now())
    })
  }

  #[must_use]
  pub fn date_of(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    dt.with_timezone(&self.tz)
      .date_naive()
  }
}

fn resolve_timezone(
  cfg: &Config,
  data_dir: &Path
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
  {
    return tz;
  }

  if let Some(raw) = cfg.get("timezone")
    && let Some(tz) =
      parse_timezone(&raw, "config")
  {
    return tz;
  }

  let path =
    timezone_config_path(data_dir);
  if let Some(tz) =
    load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path(
  data_dir: &Path
) -> PathBuf {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return PathBuf::from(trimmed);
    }
  }

  data_dir.join(TIMEZONE_CONFIG_FILE)
}

fn load_timezone_from_file(
  path: &Path
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

/// Parses `YYYY-MM-DD` into a real
/// calendar date.
pub fn parse_iso_date(
  input: &str
) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(
    input.trim(),
    "%Y-%m-%d"
  )
  .ok()
}

#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" | "now" => {
      return Ok(today);
    }
    | "yesterday" => {
      return Ok(today - Duration::days(1));
    }
    | "tomorrow" => {
      return Ok(today + Duration::days(1));
    }
    | _ => {}
  }

  if let Some(date) =
    parse_iso_date(token)
  {
    return Ok(date);
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
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
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => Duration::try_days(num),
      | "w" => Duration::try_weeks(num),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    };

    let shifted = duration.and_then(|duration| if sign == "-" {
      today.checked_sub_signed(duration)
    } else {
      today.checked_add_signed(duration)
    });
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative date out of range: \
         {token}"
      )
    });
  }

  Err(anyhow!(
    "unrecognized date: {token} \
     (expected YYYY-MM-DD, today, \
     yesterday, tomorrow or +Nd/-Nw)"
  ))
}
