use std::fmt::Write;

use serde::Serialize;

use crate::drain::DrainPolicy;
use crate::models::{FleetTotals, SchoolSummary};

#[derive(Serialize)]
struct Export<'a> {
    threshold: f64,
    totals: FleetTotals,
    schools: &'a [SchoolSummary],
}

pub fn format_drain(drain: Option<f64>) -> String {
    match drain {
        Some(value) => format!("{value:.1}%/day"),
        None => "unknown".to_string(),
    }
}

pub fn build_json(summaries: &[SchoolSummary], policy: &DrainPolicy) -> anyhow::Result<String> {
    let export = Export {
        threshold: policy.unhealthy_threshold,
        totals: FleetTotals::from_summaries(summaries),
        schools: summaries,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

pub fn build_report(label: &str, summaries: &[SchoolSummary], policy: &DrainPolicy) -> String {
    let totals = FleetTotals::from_summaries(summaries);
    let mut output = String::new();

    let _ = writeln!(output, "# Battery Health Report");
    let _ = writeln!(
        output,
        "Generated for {} (unhealthy above {:.1}% drain per day)",
        label, policy.unhealthy_threshold
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Fleet Overview");
    let _ = writeln!(output, "- Devices: {}", totals.total_devices);
    let _ = writeln!(output, "- Healthy: {}", totals.total_healthy);
    let _ = writeln!(output, "- Unhealthy: {}", totals.total_unhealthy);
    let _ = writeln!(output, "- Schools to visit: {}", totals.schools_to_visit);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Schools To Visit");

    if totals.schools_to_visit == 0 {
        let _ = writeln!(output, "No schools need a visit.");
    } else {
        for summary in summaries.iter().filter(|s| s.unhealthy_count > 0) {
            let _ = writeln!(
                output,
                "- School {}: {} of {} devices unhealthy",
                summary.academy_id, summary.unhealthy_count, summary.total_devices
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Devices By School");

    if summaries.is_empty() {
        let _ = writeln!(output, "No battery samples recorded.");
    }

    for summary in summaries {
        let _ = writeln!(output);
        let _ = writeln!(output, "### School {}", summary.academy_id);
        for device in &summary.devices {
            let flag = if device.unhealthy { " **unhealthy**" } else { "" };
            let _ = writeln!(
                output,
                "- {}: {} across {} intervals{}",
                device.serial_number,
                format_drain(device.average_daily_drain_pct),
                device.intervals_considered,
                flag
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceStat;

    fn device(serial: &str, drain: Option<f64>, unhealthy: bool) -> DeviceStat {
        DeviceStat {
            serial_number: serial.to_string(),
            academy_id: 10,
            average_daily_drain_pct: drain,
            unhealthy,
            intervals_considered: usize::from(drain.is_some()),
        }
    }

    fn summaries() -> Vec<SchoolSummary> {
        vec![
            SchoolSummary {
                academy_id: 10,
                unhealthy_count: 1,
                total_devices: 2,
                devices: vec![device("DEV1", Some(41.3), true), device("DEV2", None, false)],
            },
            SchoolSummary {
                academy_id: 20,
                unhealthy_count: 0,
                total_devices: 1,
                devices: vec![device("DEV3", Some(12.0), false)],
            },
        ]
    }

    #[test]
    fn formats_known_and_unknown_drain() {
        assert_eq!(format_drain(Some(19.96)), "20.0%/day");
        assert_eq!(format_drain(None), "unknown");
    }

    #[test]
    fn report_lists_only_schools_with_unhealthy_devices() {
        let report = build_report("fleet.json", &summaries(), &DrainPolicy::default());

        assert!(report.contains("Generated for fleet.json (unhealthy above 30.0% drain per day)"));
        assert!(report.contains("- Devices: 3"));
        assert!(report.contains("- Unhealthy: 1"));
        assert!(report.contains("- Schools to visit: 1"));
        assert!(report.contains("- School 10: 1 of 2 devices unhealthy"));
        assert!(!report.contains("- School 20:"));
        assert!(report.contains("- DEV1: 41.3%/day across 1 intervals **unhealthy**"));
        assert!(report.contains("- DEV2: unknown across 0 intervals"));
    }

    #[test]
    fn empty_fleet_report_says_so() {
        let report = build_report("all schools", &[], &DrainPolicy::default());
        assert!(report.contains("No schools need a visit."));
        assert!(report.contains("No battery samples recorded."));
    }

    #[test]
    fn json_export_carries_totals_and_null_drain() {
        let json = build_json(&summaries(), &DrainPolicy::default()).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");

        assert_eq!(value["threshold"], 30.0);
        assert_eq!(value["totals"]["totalDevices"], 3);
        assert_eq!(value["schools"][0]["academyId"], 10);
        assert!(value["schools"][0]["devices"][1]["averageDailyDrainPct"].is_null());
    }
}
