use log::{info, warn};

use crate::drain::DrainPolicy;
use crate::models::{FleetTotals, SchoolSummary};
use crate::source::SampleSource;

pub const LOAD_FAILED_MESSAGE: &str = "Failed to load battery data";

/// Load state for one fleet analysis: the latest summaries plus whatever
/// went wrong fetching them.
#[derive(Debug, Default)]
pub struct BatteryAnalysis {
    pub error: Option<String>,
    pub summaries: Vec<SchoolSummary>,
    policy: DrainPolicy,
}

impl BatteryAnalysis {
    pub fn new(policy: DrainPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> &DrainPolicy {
        &self.policy
    }

    /// Fetches samples once and rebuilds the summaries. A failed fetch keeps
    /// the previous summaries and records a message instead.
    pub async fn load<S: SampleSource>(&mut self, source: &S) {
        self.error = None;

        match source.fetch_samples().await {
            Ok(samples) => {
                self.summaries = self.policy.aggregate_by_school(&samples);
                info!(
                    "Analyzed {} samples across {} schools",
                    samples.len(),
                    self.summaries.len()
                );
            }
            Err(err) => {
                warn!("Failed to load battery samples: {err:#}");
                self.error = Some(failure_message(&err));
            }
        }
    }

    pub fn totals(&self) -> FleetTotals {
        FleetTotals::from_summaries(&self.summaries)
    }
}

fn failure_message(err: &anyhow::Error) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        LOAD_FAILED_MESSAGE.to_string()
    } else {
        message
    }
}
