use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub serial_number: String,
    #[serde(alias = "schoolId")]
    pub academy_id: i64,
    /// Fraction in [0, 1], not a percentage.
    pub battery_level: f64,
    #[serde(default)]
    pub employee_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStat {
    pub serial_number: String,
    pub academy_id: i64,
    /// `None` when there is not enough discharge history to estimate.
    pub average_daily_drain_pct: Option<f64>,
    pub unhealthy: bool,
    pub intervals_considered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolSummary {
    pub academy_id: i64,
    pub unhealthy_count: usize,
    pub total_devices: usize,
    pub devices: Vec<DeviceStat>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetTotals {
    pub total_devices: usize,
    pub total_unhealthy: usize,
    pub total_healthy: usize,
    pub schools_to_visit: usize,
}

impl FleetTotals {
    pub fn from_summaries(summaries: &[SchoolSummary]) -> Self {
        let total_devices: usize = summaries.iter().map(|s| s.total_devices).sum();
        let total_unhealthy: usize = summaries.iter().map(|s| s.unhealthy_count).sum();

        Self {
            total_devices,
            total_unhealthy,
            total_healthy: total_devices.saturating_sub(total_unhealthy),
            schools_to_visit: summaries.iter().filter(|s| s.unhealthy_count > 0).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(academy_id: i64, unhealthy_count: usize, total_devices: usize) -> SchoolSummary {
        SchoolSummary {
            academy_id,
            unhealthy_count,
            total_devices,
            devices: Vec::new(),
        }
    }

    #[test]
    fn totals_sum_across_schools() {
        let totals = FleetTotals::from_summaries(&[summary(1, 2, 5), summary(2, 0, 3)]);
        assert_eq!(totals.total_devices, 8);
        assert_eq!(totals.total_unhealthy, 2);
        assert_eq!(totals.total_healthy, 6);
        assert_eq!(totals.schools_to_visit, 1);
    }

    #[test]
    fn inconsistent_counts_do_not_underflow_healthy() {
        let totals = FleetTotals::from_summaries(&[summary(1, 4, 2)]);
        assert_eq!(totals.total_healthy, 0);
        assert_eq!(totals.total_unhealthy, 4);
    }
}
