use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Local,
  Offset,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "xerivo-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "XERIVO_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "XERIVO_TIME_CONFIG";

pub const MILLIS_PER_DAY: i64 =
  86_400_000;

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Zone used to turn wall-clock instants
/// into local calendar days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalZone {
  Named(Tz),
  System
}

impl LocalZone {
  /// Offset from UTC in effect at `now`,
  /// so DST transitions move the day
  /// boundary the way the device does.
  #[must_use]
  pub fn offset_millis(
    &self,
    now: DateTime<Utc>
  ) -> i64 {
    let seconds = match self {
      | LocalZone::Named(tz) => {
        tz.offset_from_utc_datetime(
          &now.naive_utc()
        )
        .fix()
        .local_minus_utc()
      }
      | LocalZone::System => {
        Local
          .offset_from_utc_datetime(
            &now.naive_utc()
          )
          .local_minus_utc()
      }
    };
    i64::from(seconds) * 1_000
  }
}

/// A single evaluation instant: the local
/// epoch day and the raw epoch millis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
  pub today:        i64,
  pub epoch_millis: i64
}

impl Moment {
  #[must_use]
  pub fn now() -> Self {
    Self::at(Utc::now(), local_zone())
  }

  #[must_use]
  pub fn at(
    now: DateTime<Utc>,
    zone: &LocalZone
  ) -> Self {
    let epoch_millis =
      now.timestamp_millis();
    Self {
      today: epoch_day(
        epoch_millis,
        zone.offset_millis(now)
      ),
      epoch_millis
    }
  }

  #[must_use]
  pub fn fixed(
    today: i64,
    epoch_millis: i64
  ) -> Self {
    Self {
      today,
      epoch_millis
    }
  }
}

#[must_use]
pub fn epoch_day(
  epoch_millis: i64,
  utc_offset_millis: i64
) -> i64 {
  (epoch_millis + utc_offset_millis)
    .div_euclid(MILLIS_PER_DAY)
}

pub fn local_zone() -> &'static LocalZone
{
  static LOCAL_ZONE: OnceLock<
    LocalZone
  > = OnceLock::new();
  LOCAL_ZONE
    .get_or_init(resolve_local_zone)
}

fn resolve_local_zone() -> LocalZone {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return LocalZone::Named(tz);
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return LocalZone::Named(tz);
  }

  tracing::debug!(
    "no timezone configured; using \
     system local offset"
  );
  LocalZone::System
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

  parse_timezone_config(
    &raw,
    &format!("file:{}", path.display())
  )
}

fn parse_timezone_config(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let parsed = match toml::from_str::<
    TimezoneConfig
  >(raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        source,
        error = %err,
        "failed parsing timezone config"
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
      source,
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    source
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
        "configured local timezone"
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

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    LocalZone,
    MILLIS_PER_DAY,
    Moment,
    epoch_day,
    parse_timezone_config
  };

  #[test]
  fn epoch_day_floors_before_epoch() {
    assert_eq!(epoch_day(0, 0), 0);
    assert_eq!(
      epoch_day(MILLIS_PER_DAY - 1, 0),
      0
    );
    assert_eq!(epoch_day(-1, 0), -1);
    assert_eq!(
      epoch_day(
        MILLIS_PER_DAY,
        -3_600_000
      ),
      0
    );
  }

  #[test]
  fn named_zone_shifts_day_boundary() {
    // 2026-02-17 03:00 UTC is still the
    // 16th in Mexico City (UTC-6).
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 3, 0, 0
      )
      .single()
      .expect("valid now");
    let utc = Moment::at(
      now,
      &LocalZone::Named(chrono_tz::UTC)
    );
    let mx = Moment::at(
      now,
      &LocalZone::Named(
        chrono_tz::America::Mexico_City
      )
    );
    assert_eq!(utc.today - 1, mx.today);
    assert_eq!(
      utc.epoch_millis,
      mx.epoch_millis
    );
  }

  #[test]
  fn timezone_config_accepts_section_form()
  {
    let tz = parse_timezone_config(
      "[time]\ntimezone = \
       \"Europe/Berlin\"\n",
      "test"
    );
    assert_eq!(
      tz,
      Some(chrono_tz::Europe::Berlin)
    );
    assert_eq!(
      parse_timezone_config(
        "timezone = \"Not/AZone\"",
        "test"
      ),
      None
    );
  }
}
