//! Day/night mode calculation.
//!
//! The astronomy is injected through [`SunTimesProvider`]; this module only classifies
//! an instant against the provided boundaries.
use crate::model::{Mode, Value};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

/// Boundary instants for one day at one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    /// Sun fully above the horizon.
    pub sunrise_end: DateTime<Utc>,
    /// Sun starts touching the horizon.
    pub sunset_start: DateTime<Utc>,
    pub dusk: DateTime<Utc>,
    /// Dark enough for astronomical observations.
    pub night: DateTime<Utc>,
}

pub trait SunTimesProvider: Send + Sync {
    fn sun_times(&self, now: DateTime<Utc>, latitude: f64, longitude: f64) -> SunTimes;
}

impl<F> SunTimesProvider for F
where
    F: Fn(DateTime<Utc>, f64, f64) -> SunTimes + Send + Sync,
{
    fn sun_times(&self, now: DateTime<Utc>, latitude: f64, longitude: f64) -> SunTimes {
        self(now, latitude, longitude)
    }
}

/// Mode for `now` at `position`, or `None` when the position is unknown or malformed.
pub fn calculate_mode(
    position: Option<&Value>,
    now: DateTime<Utc>,
    provider: &dyn SunTimesProvider,
) -> Option<Mode> {
    let position = position?;
    let latitude = position.get("latitude")?.as_f64()?;
    let longitude = position.get("longitude")?.as_f64()?;
    let times = provider.sun_times(now, latitude, longitude);
    Some(classify(now, &times))
}

/// Ordered interval tests. Only the sunrise instant through `sunset_start` is day.
#[allow(clippy::if_same_then_else)]
pub fn classify(now: DateTime<Utc>, times: &SunTimes) -> Mode {
    if now >= times.sunrise {
        if now < times.sunrise_end {
            Mode::Day
        } else if now <= times.sunset_start {
            Mode::Day
        } else if now >= times.sunset_start && now < times.dusk {
            Mode::Night
        } else if now < times.night {
            Mode::Night
        } else {
            Mode::Night
        }
    } else {
        Mode::Night
    }
}

/// Clock-based stand-in for real astronomy: fixed UTC sunrise and sunset times with a
/// symmetric twilight. Position is ignored.
#[derive(Debug, Clone, Copy)]
pub struct FixedSchedule {
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
    pub twilight_minutes: u32,
}

impl SunTimesProvider for FixedSchedule {
    fn sun_times(&self, now: DateTime<Utc>, _latitude: f64, _longitude: f64) -> SunTimes {
        let date = now.date_naive();
        let twilight = Duration::minutes(i64::from(self.twilight_minutes));
        let sunrise = Utc.from_utc_datetime(&date.and_time(self.sunrise));
        let sunset = Utc.from_utc_datetime(&date.and_time(self.sunset));
        SunTimes {
            sunrise,
            sunrise_end: sunrise + twilight,
            sunset_start: sunset - twilight,
            dusk: sunset + twilight,
            night: sunset + twilight * 2,
        }
    }
}
