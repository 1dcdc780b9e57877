use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;

use crate::models::{DeviceStat, Sample, SchoolSummary};

/// Percent-per-day drain above which a device needs a field visit.
pub const UNHEALTHY_THRESHOLD: f64 = 30.0;

const UNKNOWN_SERIAL: &str = "unknown";
const UNKNOWN_ACADEMY: i64 = -1;
const MILLIS_PER_HOUR: f64 = 3_600_000.0;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrainPolicy {
    pub unhealthy_threshold: f64,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            unhealthy_threshold: UNHEALTHY_THRESHOLD,
        }
    }
}

impl DrainPolicy {
    pub fn new(unhealthy_threshold: f64) -> Self {
        Self {
            unhealthy_threshold,
        }
    }

    pub fn is_unhealthy(&self, drain_pct: f64) -> bool {
        drain_pct > self.unhealthy_threshold
    }

    /// Estimates the average daily drain of one device from all of its samples.
    ///
    /// Samples are ordered by time before walking consecutive pairs. Pairs
    /// where the level held or rose (charging) or where time did not advance
    /// are skipped; the rest are folded into a duration-weighted mean of
    /// per-interval daily rates. Samples with unparseable timestamps are left
    /// out of the timeline.
    pub fn estimate_device<'a, I>(&self, samples: I) -> DeviceStat
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let samples: Vec<&Sample> = samples.into_iter().collect();

        if samples.len() < 2 {
            return match samples.first() {
                Some(sample) if !sample.serial_number.is_empty() => {
                    unknown_stat(&sample.serial_number, sample.academy_id)
                }
                Some(sample) => unknown_stat(UNKNOWN_SERIAL, sample.academy_id),
                None => unknown_stat(UNKNOWN_SERIAL, UNKNOWN_ACADEMY),
            };
        }

        let timeline = timeline(&samples);
        let Some(&(_, earliest)) = timeline.first() else {
            let first = samples
                .iter()
                .copied()
                .min_by(|a, b| reading_order(a, b))
                .unwrap_or(samples[0]);
            return unknown_stat(&first.serial_number, first.academy_id);
        };

        let mut weighted_sum = 0.0;
        let mut total_hours = 0.0;
        let mut considered = 0usize;

        for pair in timeline.windows(2) {
            let (start, current) = pair[0];
            let (end, next) = pair[1];

            let delta_level = current.battery_level - next.battery_level;
            let delta_hours = (end - start).num_milliseconds() as f64 / MILLIS_PER_HOUR;
            let discharged = delta_level > 0.0;

            if delta_hours <= 0.0 || !discharged {
                continue;
            }

            let drain_per_day = (delta_level * 100.0 / delta_hours) * 24.0;
            weighted_sum += drain_per_day * delta_hours;
            total_hours += delta_hours;
            considered += 1;
        }

        if considered == 0 || total_hours == 0.0 {
            return unknown_stat(&earliest.serial_number, earliest.academy_id);
        }

        let average = weighted_sum / total_hours;
        DeviceStat {
            serial_number: earliest.serial_number.clone(),
            academy_id: earliest.academy_id,
            average_daily_drain_pct: Some(average),
            unhealthy: self.is_unhealthy(average),
            intervals_considered: considered,
        }
    }

    /// Groups samples by device, estimates each device, and rolls the
    /// results up per school, worst schools first.
    pub fn aggregate_by_school(&self, samples: &[Sample]) -> Vec<SchoolSummary> {
        let mut by_device: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
        for sample in samples {
            by_device
                .entry(sample.serial_number.as_str())
                .or_default()
                .push(sample);
        }

        let device_count = by_device.len();
        let mut by_school: BTreeMap<i64, Vec<DeviceStat>> = BTreeMap::new();
        for group in by_device.into_values() {
            let stat = self.estimate_device(group);
            by_school.entry(stat.academy_id).or_default().push(stat);
        }

        let mut summaries: Vec<SchoolSummary> = by_school
            .into_iter()
            .map(|(academy_id, mut devices)| {
                devices.sort_by(|a, b| {
                    compare_drain_desc(a.average_daily_drain_pct, b.average_daily_drain_pct)
                        .then_with(|| a.serial_number.cmp(&b.serial_number))
                });
                SchoolSummary {
                    academy_id,
                    unhealthy_count: devices.iter().filter(|d| d.unhealthy).count(),
                    total_devices: devices.len(),
                    devices,
                }
            })
            .collect();

        summaries.sort_by(|a, b| {
            b.unhealthy_count
                .cmp(&a.unhealthy_count)
                .then_with(|| a.academy_id.cmp(&b.academy_id))
        });

        debug!(
            "aggregated {} samples from {} devices into {} schools",
            samples.len(),
            device_count,
            summaries.len()
        );
        summaries
    }
}

pub fn estimate_device<'a, I>(samples: I) -> DeviceStat
where
    I: IntoIterator<Item = &'a Sample>,
{
    DrainPolicy::default().estimate_device(samples)
}

pub fn aggregate_by_school(samples: &[Sample]) -> Vec<SchoolSummary> {
    DrainPolicy::default().aggregate_by_school(samples)
}

/// Orders drain values highest first, with unknown drain after every known value.
pub fn compare_drain_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Parses an RFC 3339 timestamp, falling back to timezone-less forms read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

fn timeline<'a>(samples: &[&'a Sample]) -> Vec<(DateTime<Utc>, &'a Sample)> {
    let mut timeline: Vec<(DateTime<Utc>, &Sample)> = samples
        .iter()
        .filter_map(|&sample| match parse_timestamp(&sample.timestamp) {
            Some(at) => Some((at, sample)),
            None => {
                debug!(
                    "skipping sample for {} with unparseable timestamp {:?}",
                    sample.serial_number, sample.timestamp
                );
                None
            }
        })
        .collect();

    timeline.sort_by(|(a_at, a), (b_at, b)| a_at.cmp(b_at).then_with(|| reading_order(a, b)));
    timeline
}

/// Tie-break for readings at the same instant: fuller battery first, so a
/// drop between simultaneous readings never counts as an interval.
fn reading_order(a: &Sample, b: &Sample) -> Ordering {
    b.battery_level
        .total_cmp(&a.battery_level)
        .then_with(|| a.academy_id.cmp(&b.academy_id))
        .then_with(|| a.employee_id.cmp(&b.employee_id))
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

fn unknown_stat(serial_number: &str, academy_id: i64) -> DeviceStat {
    DeviceStat {
        serial_number: serial_number.to_string(),
        academy_id,
        average_daily_drain_pct: None,
        unhealthy: false,
        intervals_considered: 0,
    }
}
