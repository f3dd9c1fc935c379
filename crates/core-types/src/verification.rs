use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The result of one health-check cycle. Only the most recent one is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, bool>,
    pub config: BTreeMap<String, bool>,
    pub resources: BTreeMap<String, f64>,
    pub model: BTreeMap<String, bool>,
}

/// Limits above/below which a resource reading is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceThresholds {
    pub max_memory_percent: f64,
    pub min_disk_free_gb: f64,
    pub max_cpu_percent: f64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            max_memory_percent: 80.0,
            min_disk_free_gb: 10.0,
            max_cpu_percent: 80.0,
        }
    }
}

impl VerificationSnapshot {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            services: BTreeMap::new(),
            config: BTreeMap::new(),
            resources: BTreeMap::new(),
            model: BTreeMap::new(),
        }
    }

    /// Lists every failed check and every resource reading past its threshold.
    pub fn issues(&self, thresholds: &ResourceThresholds) -> Vec<String> {
        let mut issues = Vec::new();
        for (section, checks) in [
            ("services", &self.services),
            ("config", &self.config),
            ("model", &self.model),
        ] {
            for (name, ok) in checks {
                if !ok {
                    issues.push(format!("{}.{} failed", section, name));
                }
            }
        }
        if let Some(pct) = self.resources.get("memory_percent") {
            if *pct >= thresholds.max_memory_percent {
                issues.push(format!("memory usage at {:.1}%", pct));
            }
        }
        if let Some(free) = self.resources.get("disk_free_gb") {
            if *free <= thresholds.min_disk_free_gb {
                issues.push(format!("only {:.1} GB disk free", free));
            }
        }
        if let Some(pct) = self.resources.get("cpu_percent") {
            if *pct > thresholds.max_cpu_percent {
                issues.push(format!("CPU usage at {:.1}%", pct));
            }
        }
        issues
    }

    pub fn needs_attention(&self, thresholds: &ResourceThresholds) -> bool {
        !self.issues(thresholds).is_empty()
    }
}

impl Default for VerificationSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
