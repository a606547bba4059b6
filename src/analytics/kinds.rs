use std::fmt;

use serde::{Deserialize, Serialize};

/// The KPI datasets the analytics collaborator serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KpiKind {
    Mobile,
    Geo,
    User,
    Technology,
    Acquisition,
    BehaviorFlow,
    UserActivityOverTime,
    UserRetention,
    EventPopularity,
    TrafficSourceAnalysis,
    UserEngagement,
}

impl KpiKind {
    #[cfg(test)]
    pub const ALL: [KpiKind; 11] = [
        KpiKind::Mobile,
        KpiKind::Geo,
        KpiKind::User,
        KpiKind::Technology,
        KpiKind::Acquisition,
        KpiKind::BehaviorFlow,
        KpiKind::UserActivityOverTime,
        KpiKind::UserRetention,
        KpiKind::EventPopularity,
        KpiKind::TrafficSourceAnalysis,
        KpiKind::UserEngagement,
    ];

    /// Path segment and response key used by the collaborator.
    pub fn as_str(self) -> &'static str {
        match self {
            KpiKind::Mobile => "mobile",
            KpiKind::Geo => "geo",
            KpiKind::User => "user",
            KpiKind::Technology => "technology",
            KpiKind::Acquisition => "acquisition",
            KpiKind::BehaviorFlow => "behaviorFlow",
            KpiKind::UserActivityOverTime => "userActivityOverTime",
            KpiKind::UserRetention => "userRetention",
            KpiKind::EventPopularity => "eventPopularity",
            KpiKind::TrafficSourceAnalysis => "trafficSourceAnalysis",
            KpiKind::UserEngagement => "userEngagement",
        }
    }
}

impl fmt::Display for KpiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Doughnut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_serde() {
        for kind in KpiKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}
