use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::config::SunWindowConfig;

/// Gates polling to daylight hours. Sunrise/sunset times come from the
/// `sunrise` crate for the configured coordinates; the inverter produces
/// nothing at night, so the loop sleeps from sunset to the next sunrise.
#[derive(Debug, Clone, Copy)]
pub struct SunWindow {
    latitude: f64,
    longitude: f64,
}

impl SunWindow {
    pub fn new(config: SunWindowConfig) -> Self {
        Self {
            latitude: config.latitude,
            longitude: config.longitude,
        }
    }

    /// Sunrise and sunset (UTC) for the given calendar date. `None` only if
    /// the timestamps fall outside chrono's representable range.
    pub fn events_on(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let (rise, set) = sunrise::sunrise_sunset(
            self.latitude,
            self.longitude,
            date.year(),
            date.month(),
            date.day(),
        );
        Some((
            DateTime::from_timestamp(rise, 0)?,
            DateTime::from_timestamp(set, 0)?,
        ))
    }

    pub fn is_after_sunset(&self, now: DateTime<Utc>) -> bool {
        self.events_on(now.date_naive())
            .map(|(_, sunset)| now > sunset)
            .unwrap_or(false)
    }

    /// The next sunrise strictly after `now`: today's if it has not happened
    /// yet, otherwise tomorrow's.
    pub fn next_sunrise(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (rise_today, _) = self.events_on(now.date_naive())?;
        if now < rise_today {
            return Some(rise_today);
        }
        let tomorrow = now.date_naive().succ_opt()?;
        let (rise_tomorrow, _) = self.events_on(tomorrow)?;
        Some(rise_tomorrow)
    }
}
