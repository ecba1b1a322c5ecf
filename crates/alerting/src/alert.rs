//! Alert values handed to notifiers, plus the plain-text summaries every
//! built-in notifier shares.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Label carrying the alert rule name.
pub const ALERT_NAME_LABEL: &str = "alertname";

/// Firing or resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Still active
    Firing,
    /// No longer active
    Resolved,
}

impl AlertStatus {
    /// Lowercase status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Resolved => "resolved",
        }
    }

    /// Colour used by embed-style channels.
    #[must_use]
    pub const fn color(&self) -> u32 {
        match self {
            Self::Firing => 0x00e7_4c3c,   // Red
            Self::Resolved => 0x002e_b886, // Green
        }
    }

    /// Emoji prefix used by Slack.
    #[must_use]
    pub const fn emoji(&self) -> &'static str {
        match self {
            Self::Firing => "🚨",
            Self::Resolved => "✅",
        }
    }
}

/// One alert instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Identifying labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Descriptive annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// When the alert started firing
    pub starts_at: DateTime<Utc>,
    /// When the alert resolved, if it has
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// Link back to the alert source
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generator_url: String,
}

impl Alert {
    /// Create a firing alert named `name`, starting now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(ALERT_NAME_LABEL.to_string(), name.into());
        Self {
            labels,
            annotations: BTreeMap::new(),
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: String::new(),
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Mark the alert resolved at `ends_at`.
    #[must_use]
    pub const fn resolved_at(mut self, ends_at: DateTime<Utc>) -> Self {
        self.ends_at = Some(ends_at);
        self
    }

    /// Value of the `alertname` label, or an empty string.
    #[must_use]
    pub fn name(&self) -> &str {
        self.labels.get(ALERT_NAME_LABEL).map_or("", String::as_str)
    }

    /// Status as seen at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> AlertStatus {
        match self.ends_at {
            Some(ends_at) if ends_at <= now => AlertStatus::Resolved,
            _ => AlertStatus::Firing,
        }
    }

    /// Status as seen now.
    #[must_use]
    pub fn status(&self) -> AlertStatus {
        self.status_at(Utc::now())
    }
}

/// Firing if any alert in the group is firing.
#[must_use]
pub fn group_status(alerts: &[Alert]) -> AlertStatus {
    let now = Utc::now();
    if alerts.iter().any(|a| a.status_at(now) == AlertStatus::Firing) {
        AlertStatus::Firing
    } else {
        AlertStatus::Resolved
    }
}

/// Labels shared, with equal values, by every alert in the group.
#[must_use]
pub fn common_labels(alerts: &[Alert]) -> BTreeMap<String, String> {
    let Some((first, rest)) = alerts.split_first() else {
        return BTreeMap::new();
    };
    first
        .labels
        .iter()
        .filter(|(k, v)| rest.iter().all(|a| a.labels.get(*k) == Some(*v)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Stable key for a group of alerts: SHA-256 over every alert's full label
/// set, sorted and deduplicated so alert order does not matter.
#[must_use]
pub fn group_key(alerts: &[Alert]) -> String {
    let mut label_sets: Vec<&BTreeMap<String, String>> = alerts.iter().map(|a| &a.labels).collect();
    label_sets.sort();
    label_sets.dedup();

    let mut hasher = Sha256::new();
    for labels in label_sets {
        for (key, value) in labels {
            hasher.update(key.as_bytes());
            hasher.update([0xff]);
            hasher.update(value.as_bytes());
            hasher.update([0xff]);
        }
        hasher.update([0xfe]);
    }
    hex::encode(hasher.finalize())
}

/// Title such as `[FIRING:2] HighCPU prod`.
#[must_use]
pub fn title_for(alerts: &[Alert]) -> String {
    let now = Utc::now();
    let firing = alerts
        .iter()
        .filter(|a| a.status_at(now) == AlertStatus::Firing)
        .count();
    let values: Vec<String> = common_labels(alerts).into_values().collect();

    let prefix = if firing > 0 {
        format!("[FIRING:{firing}]")
    } else {
        "[RESOLVED]".to_string()
    };

    if values.is_empty() {
        prefix
    } else {
        format!("{prefix} {}", values.join(" "))
    }
}

/// Plain-text body listing every alert with its labels and annotations.
#[must_use]
pub fn message_for(alerts: &[Alert]) -> String {
    let now = Utc::now();
    let mut out = String::new();

    for status in [AlertStatus::Firing, AlertStatus::Resolved] {
        let section: Vec<&Alert> = alerts
            .iter()
            .filter(|a| a.status_at(now) == status)
            .collect();
        if section.is_empty() {
            continue;
        }

        let _ = writeln!(out, "**{}**", capitalize(status.as_str()));
        for alert in section {
            out.push('\n');
            out.push_str("Labels:\n");
            for (k, v) in &alert.labels {
                let _ = writeln!(out, " - {k} = {v}");
            }
            if !alert.annotations.is_empty() {
                out.push_str("Annotations:\n");
                for (k, v) in &alert.annotations {
                    let _ = writeln!(out, " - {k} = {v}");
                }
            }
            if !alert.generator_url.is_empty() {
                let _ = writeln!(out, "Source: {}", alert.generator_url);
            }
        }
        out.push('\n');
    }

    out.trim_end().to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn firing(name: &str) -> Alert {
        Alert::new(name).with_label("env", "prod")
    }

    fn resolved(name: &str) -> Alert {
        firing(name).resolved_at(Utc::now() - Duration::minutes(1))
    }

    #[test]
    fn test_status_follows_ends_at() {
        let now = Utc::now();
        let alert = Alert::new("A");
        assert_eq!(alert.status_at(now), AlertStatus::Firing);

        let future = alert.clone().resolved_at(now + Duration::hours(1));
        assert_eq!(future.status_at(now), AlertStatus::Firing);

        let past = alert.resolved_at(now - Duration::seconds(1));
        assert_eq!(past.status_at(now), AlertStatus::Resolved);
    }

    #[test]
    fn test_group_status() {
        assert_eq!(group_status(&[resolved("A"), firing("B")]), AlertStatus::Firing);
        assert_eq!(group_status(&[resolved("A")]), AlertStatus::Resolved);
    }

    #[test]
    fn test_common_labels() {
        let labels = common_labels(&[firing("A"), firing("B")]);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("env").map(String::as_str), Some("prod"));
        assert!(common_labels(&[]).is_empty());
    }

    #[test]
    fn test_title_for() {
        assert_eq!(title_for(&[firing("HighCPU")]), "[FIRING:1] HighCPU prod");
        assert_eq!(title_for(&[firing("A"), firing("B")]), "[FIRING:2] prod");
        assert_eq!(title_for(&[resolved("A")]), "[RESOLVED] A prod");
    }

    #[test]
    fn test_message_lists_sections() {
        let msg = message_for(&[
            firing("A").with_annotation("summary", "cpu high"),
            resolved("B"),
        ]);
        assert!(msg.starts_with("**Firing**"));
        assert!(msg.contains(" - alertname = A"));
        assert!(msg.contains(" - summary = cpu high"));
        assert!(msg.contains("**Resolved**"));
    }

    #[test]
    fn test_group_key_is_stable() {
        let a = group_key(&[firing("A")]);
        let b = group_key(&[firing("A")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, group_key(&[firing("B")]));
    }

    #[test]
    fn test_group_key_distinguishes_groups_without_common_labels() {
        let first = [
            Alert::new("DiskFull").with_label("host", "a"),
            Alert::new("HighCPU").with_label("host", "b"),
        ];
        let second = [
            Alert::new("OOM").with_label("host", "c"),
            Alert::new("Latency").with_label("host", "d"),
        ];
        assert!(common_labels(&first).is_empty());
        assert!(common_labels(&second).is_empty());

        assert_ne!(group_key(&first), group_key(&second));
        assert_ne!(group_key(&first), group_key(&[]));
    }

    #[test]
    fn test_group_key_ignores_alert_order() {
        let a = Alert::new("DiskFull").with_label("host", "a");
        let b = Alert::new("HighCPU").with_label("host", "b");
        assert_eq!(
            group_key(&[a.clone(), b.clone()]),
            group_key(&[b, a.clone().resolved_at(Utc::now())])
        );
    }
}
