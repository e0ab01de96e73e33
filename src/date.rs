//! Date Types
//!
//! Wire formats for dates and times used by REST services.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{AzureError, ProtocolError};

const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn invalid(kind: &str, value: &str, error: impl fmt::Display) -> AzureError {
    ProtocolError::InvalidResponse {
        message: format!("invalid {} '{}': {}", kind, value, error),
    }
    .into()
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                value.parse().map_err(de::Error::custom)
            }
        }
    };
}

/// RFC 3339 timestamp, e.g. `2006-01-02T15:04:05Z`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rfc3339Time(pub DateTime<Utc>);

impl fmt::Display for Rfc3339Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl FromStr for Rfc3339Time {
    type Err = AzureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|t| Self(t.with_timezone(&Utc)))
            .map_err(|e| invalid("RFC 3339 time", s, e))
    }
}

string_serde!(Rfc3339Time);

/// RFC 1123 timestamp, e.g. `Mon, 02 Jan 2006 15:04:05 GMT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rfc1123Time(pub DateTime<Utc>);

impl fmt::Display for Rfc1123Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(RFC1123_FORMAT))
    }
}

impl FromStr for Rfc1123Time {
    type Err = AzureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc2822(s.trim())
            .map(|t| Self(t.with_timezone(&Utc)))
            .map_err(|e| invalid("RFC 1123 time", s, e))
    }
}

string_serde!(Rfc1123Time);

/// Seconds since the Unix epoch, carried as a JSON number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnixTime(pub DateTime<Utc>);

impl UnixTime {
    pub fn from_seconds(seconds: i64) -> Option<Self> {
        Utc.timestamp_opt(seconds, 0).single().map(Self)
    }

    pub fn seconds(&self) -> i64 {
        self.0.timestamp()
    }
}

impl fmt::Display for UnixTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.seconds())
    }
}

impl FromStr for UnixTime {
    type Err = AzureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let seconds: f64 = s.trim().parse().map_err(|e| invalid("Unix time", s, e))?;
        Self::from_seconds(seconds.trunc() as i64).ok_or_else(|| invalid("Unix time", s, "out of range"))
    }
}

impl Serialize for UnixTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.seconds())
    }
}

impl<'de> Deserialize<'de> for UnixTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Number::deserialize(deserializer)?;
        let seconds = match value.as_i64() {
            Some(s) => s,
            None => value.as_f64().map(|f| f.trunc() as i64).unwrap_or_default(),
        };
        Self::from_seconds(seconds).ok_or_else(|| de::Error::custom("unix time out of range"))
    }
}

/// Full date, e.g. `2006-01-02`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(pub NaiveDate);

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for Date {
    type Err = AzureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
            .map(Self)
            .map_err(|e| invalid("date", s, e))
    }
}

string_serde!(Date);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap()
    }

    #[test]
    fn test_rfc3339() {
        let t = Rfc3339Time(instant());
        assert_eq!(t.to_string(), "2006-01-02T15:04:05Z");
        assert_eq!(serde_json::to_value(t).unwrap(), json!("2006-01-02T15:04:05Z"));

        let offset: Rfc3339Time = "2006-01-02T17:04:05+02:00".parse().unwrap();
        assert_eq!(offset, t);
        assert!("2006-01-02".parse::<Rfc3339Time>().is_err());
    }

    #[test]
    fn test_rfc1123() {
        let t = Rfc1123Time(instant());
        assert_eq!(t.to_string(), "Mon, 02 Jan 2006 15:04:05 GMT");

        let parsed: Rfc1123Time = serde_json::from_value(json!("Mon, 02 Jan 2006 15:04:05 GMT")).unwrap();
        assert_eq!(parsed, t);
    }

    #[test]
    fn test_unix_time() {
        let t: UnixTime = serde_json::from_value(json!(1136214245)).unwrap();
        assert_eq!(t.0, instant());
        assert_eq!(serde_json::to_value(t).unwrap(), json!(1136214245));

        let fractional: UnixTime = serde_json::from_value(json!(1136214245.75)).unwrap();
        assert_eq!(fractional, t);
        assert_eq!("1136214245".parse::<UnixTime>().unwrap(), t);
    }

    #[test]
    fn test_date() {
        let d: Date = serde_json::from_value(json!("2006-01-02")).unwrap();
        assert_eq!(d.0, NaiveDate::from_ymd_opt(2006, 1, 2).unwrap());
        assert_eq!(serde_json::to_value(d).unwrap(), json!("2006-01-02"));
        assert!("02/01/2006".parse::<Date>().is_err());
    }
}
