use std::fmt;

use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

/// Epoch-millisecond values start around 1973 in seconds terms, so anything this
/// large can only be a millisecond reading.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Absolute UTC instant in whole epoch seconds.
///
/// Every decision in the session core compares `Timestamp`s; database columns,
/// RFC 3339 strings and client hints are converted at the edges and never
/// compared in their original form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Timestamp(i64);

impl Timestamp {
    pub(crate) const fn from_unix(seconds: i64) -> Self {
        Self(seconds)
    }

    pub(crate) const fn unix(self) -> i64 {
        self.0
    }

    pub(crate) fn plus_seconds(self, seconds: i64) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    /// Seconds from `self` until `later`, floored at zero.
    pub(crate) fn seconds_until(self, later: Timestamp) -> i64 {
        later.0.saturating_sub(self.0).max(0)
    }

    pub(crate) fn from_offset(value: OffsetDateTime) -> Self {
        Self(value.unix_timestamp())
    }

    pub(crate) fn from_primitive(value: PrimitiveDateTime) -> Self {
        Self(value.assume_utc().unix_timestamp())
    }

    pub(crate) fn to_offset(self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.0).unwrap_or_else(|_| {
            if self.0 < 0 {
                PrimitiveDateTime::MIN.assume_utc()
            } else {
                PrimitiveDateTime::MAX.assume_utc()
            }
        })
    }

    pub(crate) fn to_primitive(self) -> PrimitiveDateTime {
        let value = self.to_offset();
        PrimitiveDateTime::new(value.date(), value.time())
    }

    pub(crate) fn to_rfc3339(self) -> String {
        let value = self.to_offset();
        value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

pub(crate) trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_offset(OffsetDateTime::now_utc())
    }
}

/// Normalizes whatever a client sent as "its" time: epoch seconds, epoch
/// milliseconds or an RFC 3339 string. The result is advisory and only used
/// for skew logging.
pub(crate) fn parse_client_timestamp(value: &serde_json::Value) -> Option<Timestamp> {
    match value {
        serde_json::Value::Number(number) => {
            if let Some(raw) = number.as_i64() {
                Some(from_epoch_number(raw))
            } else {
                number.as_f64().filter(|raw| raw.is_finite()).map(|raw| from_epoch_number(raw as i64))
            }
        }
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if let Ok(number) = trimmed.parse::<i64>() {
                return Some(from_epoch_number(number));
            }
            OffsetDateTime::parse(trimmed, &Rfc3339).ok().map(Timestamp::from_offset)
        }
        _ => None,
    }
}

fn from_epoch_number(raw: i64) -> Timestamp {
    if raw.abs() >= MILLIS_THRESHOLD {
        Timestamp(raw / 1000)
    } else {
        Timestamp(raw)
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::{Clock, Timestamp};

    #[derive(Debug)]
    pub(crate) struct ManualClock(AtomicI64);

    impl ManualClock {
        pub(crate) fn new(start: Timestamp) -> Self {
            Self(AtomicI64::new(start.unix()))
        }

        pub(crate) fn set(&self, value: Timestamp) {
            self.0.store(value.unix(), Ordering::SeqCst);
        }

        pub(crate) fn advance(&self, seconds: i64) {
            self.0.fetch_add(seconds, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            Timestamp::from_unix(self.0.load(Ordering::SeqCst))
        }
    }
}
