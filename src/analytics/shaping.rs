//! KPI rows to chart data. One pure shaping function per kind; the registry
//! ties each kind to its chart type and title.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use serde_json::Value;

use super::kinds::{ChartType, KpiKind};

const NOT_SET: &str = "(not set)";
const TOP_EVENTS: usize = 10;

/// Labels and one numeric series.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub labels: Vec<String>,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: &'static str,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub kind: KpiKind,
    pub chart_type: ChartType,
    pub title: &'static str,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

pub struct ChartSpec {
    pub kind: KpiKind,
    pub chart: ChartType,
    pub title: &'static str,
    pub series_label: &'static str,
    pub shape: fn(&[Value]) -> Series,
}

impl ChartSpec {
    pub fn render(&self, rows: &[Value]) -> ChartData {
        let Series { labels, data } = (self.shape)(rows);
        ChartData {
            kind: self.kind,
            chart_type: self.chart,
            title: self.title,
            labels,
            datasets: vec![Dataset {
                label: self.series_label,
                data,
            }],
        }
    }
}

static REGISTRY: [ChartSpec; 11] = [
    ChartSpec {
        kind: KpiKind::Mobile,
        chart: ChartType::Bar,
        title: "Mobile Users",
        series_label: "Users",
        shape: mobile,
    },
    ChartSpec {
        kind: KpiKind::Geo,
        chart: ChartType::Bar,
        title: "Users by City",
        series_label: "Users",
        shape: geo,
    },
    ChartSpec {
        kind: KpiKind::User,
        chart: ChartType::Line,
        title: "Daily Users",
        series_label: "Users",
        shape: daily_users,
    },
    ChartSpec {
        kind: KpiKind::Technology,
        chart: ChartType::Pie,
        title: "Browsers",
        series_label: "Sessions",
        shape: technology,
    },
    ChartSpec {
        kind: KpiKind::Acquisition,
        chart: ChartType::Doughnut,
        title: "Acquisition Channels",
        series_label: "Users",
        shape: acquisition,
    },
    ChartSpec {
        kind: KpiKind::BehaviorFlow,
        chart: ChartType::Bar,
        title: "Behavior Flow",
        series_label: "Transitions",
        shape: behavior_flow,
    },
    ChartSpec {
        kind: KpiKind::UserActivityOverTime,
        chart: ChartType::Line,
        title: "Average Engagement Time",
        series_label: "Seconds",
        shape: activity_over_time,
    },
    ChartSpec {
        kind: KpiKind::UserRetention,
        chart: ChartType::Line,
        title: "Returning Users",
        series_label: "Users",
        shape: retention,
    },
    ChartSpec {
        kind: KpiKind::EventPopularity,
        chart: ChartType::Bar,
        title: "Event Popularity",
        series_label: "Views",
        shape: event_popularity,
    },
    ChartSpec {
        kind: KpiKind::TrafficSourceAnalysis,
        chart: ChartType::Bar,
        title: "Traffic Sources",
        series_label: "Sessions",
        shape: traffic_sources,
    },
    ChartSpec {
        kind: KpiKind::UserEngagement,
        chart: ChartType::Doughnut,
        title: "Engagement",
        series_label: "Sessions",
        shape: engagement,
    },
];

pub fn registry() -> &'static [ChartSpec] {
    &REGISTRY
}

fn at<'a>(row: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(row, |v, key| v.get(key))
}

fn text_at(row: &Value, path: &[&str]) -> Option<String> {
    match at(row, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_at(row: &Value, path: &[&str]) -> Option<f64> {
    match at(row, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn counts_to_series(counts: BTreeMap<String, usize>) -> Series {
    let (labels, data) = counts.into_iter().map(|(k, n)| (k, n as f64)).unzip();
    Series { labels, data }
}

fn count_by(rows: &[Value], path: &[&str]) -> Series {
    let mut counts = BTreeMap::new();
    for row in rows {
        let label = text_at(row, path).unwrap_or_else(|| NOT_SET.to_string());
        *counts.entry(label).or_insert(0usize) += 1;
    }
    counts_to_series(counts)
}

pub fn mobile(rows: &[Value]) -> Series {
    let mut buckets = [0usize; 3];
    for row in rows {
        let Some(os) = text_at(row, &["device", "operating_system"]) else {
            continue;
        };
        let os = os.to_ascii_lowercase();
        let slot = if os.contains("android") {
            0
        } else if os.contains("iphone") {
            1
        } else {
            2
        };
        buckets[slot] += 1;
    }
    Series {
        labels: vec!["Android".into(), "iPhone".into(), "Other".into()],
        data: buckets.iter().map(|n| *n as f64).collect(),
    }
}

pub fn geo(rows: &[Value]) -> Series {
    count_by(rows, &["geo", "city"])
}

pub fn daily_users(rows: &[Value]) -> Series {
    let mut per_day: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in rows {
        let (Some(day), Some(user)) = (text_at(row, &["event_date"]), text_at(row, &["user_pseudo_id"]))
        else {
            continue;
        };
        per_day.entry(day).or_default().insert(user);
    }
    counts_to_series(per_day.into_iter().map(|(d, u)| (d, u.len())).collect())
}

pub fn technology(rows: &[Value]) -> Series {
    count_by(rows, &["device", "web_info", "browser"])
}

pub fn acquisition(rows: &[Value]) -> Series {
    count_by(rows, &["traffic_source", "medium"])
}

pub fn behavior_flow(rows: &[Value]) -> Series {
    let mut counts = BTreeMap::new();
    for row in rows {
        let Some(to) = text_at(row, &["page_location"]) else {
            continue;
        };
        let from = text_at(row, &["page_referrer"]).unwrap_or_else(|| "(entrance)".to_string());
        *counts.entry(format!("{from} → {to}")).or_insert(0usize) += 1;
    }
    counts_to_series(counts)
}

pub fn activity_over_time(rows: &[Value]) -> Series {
    let mut per_day: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for row in rows {
        let (Some(day), Some(ms)) = (
            text_at(row, &["event_date"]),
            number_at(row, &["engagement_time_msec"]),
        ) else {
            continue;
        };
        let slot = per_day.entry(day).or_insert((0.0, 0));
        slot.0 += ms;
        slot.1 += 1;
    }
    let (labels, data) = per_day
        .into_iter()
        .map(|(day, (total, n))| (day, total / n as f64 / 1000.0))
        .unzip();
    Series { labels, data }
}

pub fn retention(rows: &[Value]) -> Series {
    let mut per_day: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in rows {
        if let (Some(day), Some(user)) = (text_at(row, &["event_date"]), text_at(row, &["user_pseudo_id"])) {
            per_day.entry(day).or_default().insert(user);
        }
    }
    let mut seen: HashSet<String> = HashSet::new();
    let mut counts = BTreeMap::new();
    for (day, users) in per_day {
        let returning = users.iter().filter(|u| seen.contains(*u)).count();
        counts.insert(day, returning);
        seen.extend(users);
    }
    counts_to_series(counts)
}

pub fn event_popularity(rows: &[Value]) -> Series {
    let Series { labels, data } = count_by(rows, &["event_title"]);
    let mut ranked: Vec<(String, f64)> = labels
        .into_iter()
        .zip(data)
        .filter(|(label, _)| label != NOT_SET)
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_EVENTS);
    let (labels, data) = ranked.into_iter().unzip();
    Series { labels, data }
}

pub fn traffic_sources(rows: &[Value]) -> Series {
    count_by(rows, &["traffic_source", "source"])
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => matches!(s.trim(), "1" | "true"),
        _ => false,
    }
}

pub fn engagement(rows: &[Value]) -> Series {
    let engaged = rows
        .iter()
        .filter(|r| truthy(r.get("session_engaged")))
        .count();
    Series {
        labels: vec!["Engaged".into(), "Bounced".into()],
        data: vec![engaged as f64, (rows.len() - engaged) as f64],
    }
}
