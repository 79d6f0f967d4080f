use crate::error::AppError;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, UtcOffset};

const NOW_ENV_VAR: &str = "CADENCE_NOW";

/// Source of "now" for completion stamps, preview defaults and rollover.
pub trait Clock {
    fn now(&self) -> OffsetDateTime;

    /// Civil date in the clock's offset.
    fn today(&self) -> Date {
        self.now().date()
    }
}

/// Wall clock in the local offset, falling back to UTC when the local
/// offset cannot be determined.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(local_offset())
    }
}

pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// `CADENCE_NOW` pins the clock to an RFC 3339 instant; otherwise the
/// system clock is used.
pub fn clock_from_env() -> Result<Box<dyn Clock>, AppError> {
    match std::env::var(NOW_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => {
            let now = OffsetDateTime::parse(value.trim(), &Rfc3339)
                .map_err(|_| AppError::invalid_input(format!("{NOW_ENV_VAR} must be RFC3339")))?;
            Ok(Box::new(FixedClock(now)))
        }
        _ => Ok(Box::new(SystemClock)),
    }
}

pub fn format_timestamp(at: OffsetDateTime) -> Result<String, AppError> {
    at.format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}
