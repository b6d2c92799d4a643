//! Cron-driven schedule overlay. Mirrors the pure, input-to-output style of the
//! decision engine: no I/O, no hidden state, fully covered by unit tests.

use std::str::FromStr;

use autoscaler_types::{AppMapping, ScheduleWindow};
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use crate::error::{Error, Result};

pub struct ActiveWindow {
    pub desired_replicas: u32,
    pub window: ScheduleWindow,
}

/// Returns the first matching window, in mapping order, or `None` if the app is
/// outside every configured schedule right now.
pub fn active_window(mapping: &AppMapping, now: DateTime<Utc>) -> Result<Option<ActiveWindow>> {
    for window in &mapping.schedules {
        if window.cron.trim().is_empty() {
            continue;
        }
        if let Some(fire) = last_fire_within(window, now)? {
            let expires = fire + Duration::minutes(window.duration_minutes);
            if now <= expires {
                return Ok(Some(ActiveWindow {
                    desired_replicas: window.desired_replicas,
                    window: window.clone(),
                }));
            }
        }
    }
    Ok(None)
}

/// Latest firing time of `window.cron` that falls in `(now - duration, now]`.
fn last_fire_within(window: &ScheduleWindow, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let schedule =
        Schedule::from_str(&window.cron).map_err(|err| Error::Cron(err.to_string()))?;
    let lookback_start = now - Duration::minutes(window.duration_minutes);

    let mut last = None;
    for candidate in schedule.after(&lookback_start) {
        if candidate > now {
            break;
        }
        last = Some(candidate);
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mapping_with_window(cron: &str, duration_minutes: i64, desired: u32) -> AppMapping {
        AppMapping {
            resource_group: "rg".into(),
            container_app: "app".into(),
            desired_replicas: 1,
            queues: vec!["q".into()],
            schedules: vec![ScheduleWindow {
                cron: cron.into(),
                desired_replicas: desired,
                duration_minutes,
                window_label: None,
            }],
            notify_emails: vec![],
            max_restart_attempts: 3,
            restart_cooldown_minutes: 5,
            consumer_timeout_minutes: 10,
            startup_grace_period_minutes: 3,
        }
    }

    #[test]
    fn inactive_when_no_schedules() {
        let mut mapping = mapping_with_window("0 0 * * * *", 30, 2);
        mapping.schedules.clear();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        assert!(active_window(&mapping, now).unwrap().is_none());
    }

    #[test]
    fn active_shortly_after_fire() {
        // fires on the hour, every 15 minutes; duration 30 minutes.
        let mapping = mapping_with_window("0 */15 * * * *", 30, 2);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let result = active_window(&mapping, now).unwrap().expect("active");
        assert_eq!(result.desired_replicas, 2);
    }

    #[test]
    fn inactive_after_window_expires() {
        let mapping = mapping_with_window("0 */15 * * * *", 5, 2);
        // last fire at :00; 10 minutes later is outside the 5-minute window.
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 10, 0).unwrap();
        assert!(active_window(&mapping, now).unwrap().is_none());
    }

    #[test]
    fn same_window_holds_across_the_whole_duration() {
        // Invariant: if active at `fire` with window W, active at every t in
        // [fire, fire+duration] with the same W.
        let mapping = mapping_with_window("0 0 * * * *", 30, 2);
        let fire = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        for offset in 0..=30 {
            let t = fire + Duration::minutes(offset);
            let result = active_window(&mapping, t).unwrap().expect("active");
            assert_eq!(result.desired_replicas, 2);
        }
        let past_end = fire + Duration::minutes(31);
        assert!(active_window(&mapping, past_end).unwrap().is_none());
    }

    #[test]
    fn first_matching_window_wins() {
        let mut mapping = mapping_with_window("0 0 * * * *", 30, 2);
        mapping.schedules.push(ScheduleWindow {
            cron: "0 0 * * * *".into(),
            desired_replicas: 9,
            duration_minutes: 30,
            window_label: Some("second".into()),
        });
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let result = active_window(&mapping, now).unwrap().unwrap();
        assert_eq!(result.desired_replicas, 2);
    }
}
