// Advisory anomaly assessment over recent verification attempts
// Never consulted on the verification pass/fail path

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::audit::AttemptRecord;

/// Anomaly heuristic thresholds. Risk bands are configuration, not
/// call-site constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Assessment window in minutes
    pub window_minutes: i64,
    /// Failed attempts in the window that mean high risk
    pub failed_high: usize,
    /// Failed attempts in the window that mean medium risk
    pub failed_medium: usize,
    /// Distinct source addresses above which the window is suspicious
    pub distinct_ip_threshold: usize,
    /// Distinct user agents above which the window is suspicious
    pub distinct_user_agent_threshold: usize,
    /// Gap between consecutive attempts, in milliseconds, below which the
    /// cadence looks scripted
    pub burst_gap_ms: i64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            failed_high: 10,
            failed_medium: 5,
            distinct_ip_threshold: 3,
            distinct_user_agent_threshold: 3,
            burst_gap_ms: 1000,
        }
    }
}

/// Risk classification for a window of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Why a window was flagged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AnomalyReason {
    ExcessiveFailures { count: usize },
    DistinctIpAddresses { count: usize },
    DistinctUserAgents { count: usize },
    RapidSubmissions { shortest_gap_ms: i64 },
}

/// Assessment result. Advisory output for alerting and audit collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyAssessment {
    pub suspicious: bool,
    pub reasons: Vec<AnomalyReason>,
    pub risk_level: RiskLevel,
}

/// Assess a user's recent attempt history at `now`.
///
/// Pure over its inputs: only records inside the configured window are
/// considered, and nothing here blocks or alters a verification request.
pub fn assess(
    attempts: &[AttemptRecord],
    now: DateTime<Utc>,
    config: &AnomalyConfig,
) -> AnomalyAssessment {
    let window_start = now - Duration::minutes(config.window_minutes);
    let mut window: Vec<&AttemptRecord> = attempts
        .iter()
        .filter(|a| a.timestamp >= window_start && a.timestamp <= now)
        .collect();
    window.sort_by_key(|a| a.timestamp);

    let mut reasons = Vec::new();
    let mut risk = RiskLevel::Low;

    let failures = window.iter().filter(|a| !a.success).count();
    if failures >= config.failed_high {
        reasons.push(AnomalyReason::ExcessiveFailures { count: failures });
        risk = risk.max(RiskLevel::High);
    } else if failures >= config.failed_medium {
        reasons.push(AnomalyReason::ExcessiveFailures { count: failures });
        risk = risk.max(RiskLevel::Medium);
    }

    let distinct_ips: HashSet<&str> = window
        .iter()
        .filter_map(|a| a.ip_address.as_deref())
        .collect();
    if distinct_ips.len() > config.distinct_ip_threshold {
        reasons.push(AnomalyReason::DistinctIpAddresses {
            count: distinct_ips.len(),
        });
        risk = risk.max(RiskLevel::High);
    }

    let distinct_agents: HashSet<&str> = window
        .iter()
        .filter_map(|a| a.user_agent.as_deref())
        .collect();
    if distinct_agents.len() > config.distinct_user_agent_threshold {
        reasons.push(AnomalyReason::DistinctUserAgents {
            count: distinct_agents.len(),
        });
        risk = risk.max(RiskLevel::Medium);
    }

    let shortest_gap = window
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds())
        .min();
    if let Some(gap) = shortest_gap {
        if gap < config.burst_gap_ms {
            reasons.push(AnomalyReason::RapidSubmissions {
                shortest_gap_ms: gap,
            });
            risk = risk.max(RiskLevel::High);
        }
    }

    AnomalyAssessment {
        suspicious: !reasons.is_empty(),
        reasons,
        risk_level: risk,
    }
}
