use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::metrics::SearchMetrics;

/// Body of `GET /diag`
#[derive(Debug, Serialize, Deserialize)]
pub struct DiagReport {
    pub res: String,
    pub app: String,
    pub version: String,
    /// `days:hours:minutes:seconds`
    pub uptime: String,
    pub is_running: bool,
    pub gate: GateStatus,
    pub metrics: SearchMetrics,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GateStatus {
    pub capacity: usize,
    pub available: usize,
    /// Batches currently holding a slot
    pub in_use: usize,
}

/// Tracks when the service came up.
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    started_at: Instant,
}

impl Uptime {
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn formatted(&self) -> String {
        format_uptime(self.elapsed())
    }
}

pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    format!("{}:{}:{}:{}", days, hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0:0:0:0");
        assert_eq!(format_uptime(Duration::from_secs(3_661)), "0:1:1:1");
        assert_eq!(format_uptime(Duration::from_secs(2 * 86_400 + 59)), "2:0:0:59");
    }

    #[test]
    fn test_diag_report_serialization() {
        let report = DiagReport {
            res: "ok".to_string(),
            app: "sof_stats".to_string(),
            version: "1.0.0".to_string(),
            uptime: "0:1:0:0".to_string(),
            is_running: true,
            gate: GateStatus {
                capacity: 4,
                available: 3,
                in_use: 1,
            },
            metrics: SearchMetrics::default(),
        };

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"is_running\":true"));
        assert!(json.contains("\"available\":3"));
        assert!(json.contains("\"in_use\":1"));
    }
}
