use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::ValidationError;

/// RFC3339 timestamp guaranteed to be UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            }
        })?;

        Self::from_offset_datetime(parsed).map_err(|_| ValidationError::TimestampNotUtc {
            value: input.to_owned(),
        })
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Result<Self, ValidationError> {
        if value.offset() != UtcOffset::UTC {
            return Err(ValidationError::TimestampNotUtc {
                value: value
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| String::from("<unformattable>")),
            });
        }

        Ok(Self(value))
    }

    /// Converts any offset into UTC; used when upstreams report exchange-local times.
    pub fn coerce(value: OffsetDateTime) -> Self {
        Self(value.to_offset(UtcOffset::UTC))
    }

    /// Midnight UTC of a `YYYY-MM-DD` calendar date.
    pub fn from_date(input: &str) -> Result<Self, ValidationError> {
        let date = Date::parse(input.trim(), format_description!("[year]-[month]-[day]"))
            .map_err(|_| ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            })?;
        Ok(Self(date.midnight().assume_utc()))
    }

    /// Exchange-local `YYYY-MM-DD` and `HH:MM:SS` at a fixed offset.
    pub fn from_local(date: &str, clock: &str, offset: UtcOffset) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidTimestamp {
            value: format!("{date} {clock}"),
        };
        let date = Date::parse(date.trim(), format_description!("[year]-[month]-[day]"))
            .map_err(|_| invalid())?;
        let clock = Time::parse(clock.trim(), format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| invalid())?;
        Ok(Self::coerce(PrimitiveDateTime::new(date, clock).assume_offset(offset)))
    }

    pub fn from_unix_seconds(seconds: i64) -> Result<Self, ValidationError> {
        OffsetDateTime::from_unix_timestamp(seconds)
            .map(Self)
            .map_err(|_| ValidationError::TimestampOutOfRange { value: seconds })
    }

    pub fn from_unix_millis(millis: i64) -> Result<Self, ValidationError> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .map(Self)
            .map_err(|_| ValidationError::TimestampOutOfRange { value: millis })
    }

    pub fn unix_seconds(self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Midnight UTC of the same calendar day.
    pub fn start_of_day(self) -> Self {
        Self(self.0.replace_time(Time::MIDNIGHT))
    }

    pub fn minus(self, duration: Duration) -> Self {
        Self(self.0 - duration)
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_timestamp() {
        let parsed = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn rejects_non_utc_timestamp() {
        let err = UtcDateTime::parse("2024-01-01T01:00:00+01:00").expect_err("must fail");
        assert!(matches!(err, ValidationError::TimestampNotUtc { .. }));
    }

    #[test]
    fn exchange_local_time_is_shifted_to_utc() {
        let beijing = UtcOffset::from_hms(8, 0, 0).expect("offset");
        let ts = UtcDateTime::from_local("2024-01-02", "15:00:03", beijing).expect("valid");
        assert_eq!(ts.format_rfc3339(), "2024-01-02T07:00:03Z");
        assert_eq!(
            UtcDateTime::from_date("2024-01-02").expect("date").format_rfc3339(),
            "2024-01-02T00:00:00Z"
        );
        assert!(UtcDateTime::from_date("02/01/2024").is_err());
    }

    #[test]
    fn converts_epoch_millis() {
        let ts = UtcDateTime::from_unix_millis(1_704_067_200_000).expect("in range");
        assert_eq!(ts.format_rfc3339(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn coerces_offsets_to_utc() {
        let local = OffsetDateTime::parse("2024-01-02T08:00:00+08:00", &Rfc3339).expect("parse");
        assert_eq!(
            UtcDateTime::coerce(local).format_rfc3339(),
            "2024-01-02T00:00:00Z"
        );
    }
}
