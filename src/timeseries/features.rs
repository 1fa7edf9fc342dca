//! Hand-crafted time-series features (Harutyunyan et al.): summary
//! statistics of every measured kind over fixed fractions of the
//! observation period.

use std::collections::BTreeMap;

use crate::data::{Record, Value};

use super::stats::Statistic;
use super::{Observation, Stay};

/// Fractions of the period over which features are extracted.
pub const SUBSEQUENCES: [(f64, f64); 7] = [
    (0.0, 1.0),
    (0.0, 0.1),
    (0.0, 0.25),
    (0.0, 0.5),
    (0.5, 1.0),
    (0.75, 1.0),
    (0.9, 1.0),
];

/// A time range in hours; both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn contains(&self, hours: f64) -> bool {
        hours >= self.start && hours <= self.end
    }

    /// Column prefix for a kind in this window, e.g. `Heart Rate__0.00-4.80`.
    pub fn prefix(&self, kind: &str) -> String {
        format!("{kind}__{:.2}-{:.2}", self.start, self.end)
    }
}

/// The [`SUBSEQUENCES`] scaled to a period of `period_hours`.
pub fn subsequence_windows(period_hours: f64) -> Vec<Window> {
    SUBSEQUENCES
        .iter()
        .map(|&(start, end)| Window {
            start: start * period_hours,
            end: end * period_hours,
        })
        .collect()
}

/// Features of one kind: every statistic in every window.
pub fn extract_time_series_features(
    kind: &str,
    observations: &[&Observation],
    windows: &[Window],
) -> Record {
    let mut ret = Record::with_capacity(windows.len() * Statistic::ALL.len());
    for window in windows {
        let prefix = window.prefix(kind);
        let values: Vec<f64> = observations
            .iter()
            .filter(|o| window.contains(o.hours))
            .filter_map(|o| o.value)
            .collect();

        for stat in Statistic::ALL {
            let value = match stat {
                Statistic::Count => Value::Integer(values.len() as i64),
                _ => stat
                    .compute(&values)
                    .map(Value::from_f64)
                    .unwrap_or(Value::Null),
            };
            ret.push((format!("{prefix}__{stat}"), value));
        }
    }
    ret
}

/// Features of every kind observed during a stay, followed by the stay's
/// identifiers. Kinds are visited in sorted order.
pub fn extract_episode_time_series_features(stay: &Stay, windows: &[Window]) -> Record {
    let mut by_kind: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
    for o in &stay.observations {
        by_kind.entry(o.kind.as_str()).or_default().push(o);
    }

    let mut record: Record = by_kind
        .iter()
        .flat_map(|(kind, obs)| extract_time_series_features(kind, obs, windows))
        .collect();

    record.push(("SUBJECT_ID".into(), Value::Integer(stay.subject_id)));
    record.push(("EPISODE".into(), Value::String(stay.episode.clone())));
    record.push(("stay".into(), Value::String(stay.stay.clone())));
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(hours: f64, kind: &str, value: Option<f64>) -> Observation {
        Observation {
            hours,
            kind: kind.to_string(),
            value,
        }
    }

    fn lookup<'a>(record: &'a Record, name: &str) -> &'a Value {
        &record.iter().find(|(k, _)| k == name).unwrap().1
    }

    #[test]
    fn windows_scale_with_the_period() {
        let windows = subsequence_windows(48.0);
        assert_eq!(windows.len(), 7);
        assert_eq!(windows[1].start, 0.0);
        assert!((windows[1].end - 4.8).abs() < 1e-9);
        assert_eq!(windows[1].prefix("pH"), "pH__0.00-4.80");
        assert_eq!(windows[6].prefix("pH"), "pH__43.20-48.00");
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let observations = [
            obs(0.0, "Heart Rate", Some(80.0)),
            obs(4.8, "Heart Rate", Some(100.0)),
            obs(4.81, "Heart Rate", Some(120.0)),
            obs(50.0, "Heart Rate", Some(60.0)),
        ];
        let refs: Vec<&Observation> = observations.iter().collect();
        let record = extract_time_series_features("Heart Rate", &refs, &subsequence_windows(48.0));

        assert_eq!(record.len(), 7 * 9);
        assert_eq!(record[0].0, "Heart Rate__0.00-48.00__KURTOSIS");
        assert_eq!(lookup(&record, "Heart Rate__0.00-4.80__COUNT"), &Value::Integer(2));
        assert_eq!(lookup(&record, "Heart Rate__0.00-4.80__MEAN"), &Value::Float(90.0));
        assert_eq!(lookup(&record, "Heart Rate__0.00-48.00__MAX"), &Value::Float(120.0));
        assert_eq!(lookup(&record, "Heart Rate__43.20-48.00__COUNT"), &Value::Integer(0));
        assert_eq!(lookup(&record, "Heart Rate__43.20-48.00__MEAN"), &Value::Null);
    }

    #[test]
    fn missing_values_only_reduce_the_count() {
        let observations = [
            obs(1.0, "Glascow coma scale verbal response", None),
            obs(2.0, "Glascow coma scale verbal response", Some(5.0)),
        ];
        let refs: Vec<&Observation> = observations.iter().collect();
        let record = extract_time_series_features(
            "Glascow coma scale verbal response",
            &refs,
            &subsequence_windows(48.0)[..1],
        );
        assert_eq!(
            lookup(&record, "Glascow coma scale verbal response__0.00-48.00__COUNT"),
            &Value::Integer(1)
        );
        assert_eq!(
            lookup(&record, "Glascow coma scale verbal response__0.00-48.00__STD"),
            &Value::Null
        );
    }

    #[test]
    fn episode_record_sorts_kinds_and_ends_with_identifiers() {
        let stay = Stay {
            stay: "3_episode1_timeseries.csv".into(),
            subject_id: 3,
            episode: "episode1".into(),
            observations: vec![obs(1.0, "pH", Some(7.4)), obs(1.0, "Glucose", Some(110.0))],
        };
        let record = extract_episode_time_series_features(&stay, &subsequence_windows(48.0));
        assert!(record[0].0.starts_with("Glucose__"));
        let n = record.len();
        assert_eq!(record[n - 3], ("SUBJECT_ID".to_string(), Value::Integer(3)));
        assert_eq!(record[n - 1].1, Value::from("3_episode1_timeseries.csv"));
    }
}
