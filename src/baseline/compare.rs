//! Exact-match comparison engine
//!
//! Diffs live inventory against the latest baseline snapshot for a
//! host+category. Classification is purely a function of key presence and
//! byte-for-byte value equality; the result partitions both sides, so
//! |NEW| + |unchanged| + |MODIFIED| = |current| and
//! |MISSING| + |unchanged| + |MODIFIED| = |distinct baseline keys|.

use serde::Serialize;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

use super::item::CanonicalItem;
use super::{AnomalyKind, Category, Severity};
use crate::error::{AppError, AppResult};
use crate::models::alert::{NewAlert, SecurityAlert};
use crate::models::baseline::{BaselineConfig, BaselineItem, BaselineSnapshot};
use crate::models::inventory::CurrentItem;

/// One NEW/MISSING/MODIFIED finding
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub anomaly_type: AnomalyKind,
    pub item_key: String,
    pub baseline_value: Option<String>,
    pub current_value: Option<String>,
    pub alert_level: Severity,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareResult {
    pub category: Category,
    pub new_items_count: usize,
    pub missing_items_count: usize,
    pub modified_items_count: usize,
    pub unchanged_count: usize,
    pub new_items: Vec<Anomaly>,
    pub missing_items: Vec<Anomaly>,
    pub modified_items: Vec<Anomaly>,
}

impl CompareResult {
    pub fn total_anomalies(&self) -> usize {
        self.new_items_count + self.missing_items_count + self.modified_items_count
    }

    pub fn has_anomalies(&self) -> bool {
        self.total_anomalies() > 0
    }

    fn iter_anomalies(&self) -> impl Iterator<Item = &Anomaly> {
        self.new_items
            .iter()
            .chain(self.modified_items.iter())
            .chain(self.missing_items.iter())
    }
}

/// Fixed (category, anomaly kind) -> severity lookup
pub fn severity(category: Category, kind: AnomalyKind) -> Severity {
    match (category, kind) {
        (Category::Process, AnomalyKind::New) => Severity::High,
        (Category::Port, AnomalyKind::New) => Severity::High,
        (Category::Login, AnomalyKind::New) => Severity::High,
        (Category::Usb, AnomalyKind::New) => Severity::Medium,
        (Category::Software, AnomalyKind::New) => Severity::Low,
        (_, AnomalyKind::Modified) | (_, AnomalyKind::Missing) => Severity::Low,
    }
}

/// Pure set/value diff of current items against a baseline item list.
/// On duplicate baseline keys the first occurrence wins.
pub fn diff(category: Category, baseline: &[CanonicalItem], current: &[CanonicalItem]) -> CompareResult {
    let mut baseline_map: HashMap<&str, &CanonicalItem> = HashMap::with_capacity(baseline.len());
    for item in baseline {
        baseline_map.entry(item.key.as_str()).or_insert(item);
    }

    let mut new_items = Vec::new();
    let mut modified_items = Vec::new();
    let mut missing_items = Vec::new();
    let mut unchanged = 0usize;
    let mut current_keys: HashSet<&str> = HashSet::with_capacity(current.len());

    for item in current {
        current_keys.insert(item.key.as_str());
        match baseline_map.get(item.key.as_str()) {
            None => new_items.push(Anomaly {
                anomaly_type: AnomalyKind::New,
                item_key: item.key.clone(),
                baseline_value: None,
                current_value: Some(item.value.clone()),
                alert_level: severity(category, AnomalyKind::New),
            }),
            Some(base) if base.value != item.value => modified_items.push(Anomaly {
                anomaly_type: AnomalyKind::Modified,
                item_key: item.key.clone(),
                baseline_value: Some(base.value.clone()),
                current_value: Some(item.value.clone()),
                alert_level: severity(category, AnomalyKind::Modified),
            }),
            Some(_) => unchanged += 1,
        }
    }

    for (key, base) in &baseline_map {
        if !current_keys.contains(key) {
            missing_items.push(Anomaly {
                anomaly_type: AnomalyKind::Missing,
                item_key: base.key.clone(),
                baseline_value: Some(base.value.clone()),
                current_value: None,
                alert_level: severity(category, AnomalyKind::Missing),
            });
        }
    }
    // HashMap iteration order is unstable; keep results deterministic
    missing_items.sort_by(|a, b| a.item_key.cmp(&b.item_key));

    CompareResult {
        category,
        new_items_count: new_items.len(),
        missing_items_count: missing_items.len(),
        modified_items_count: modified_items.len(),
        unchanged_count: unchanged,
        new_items,
        missing_items,
        modified_items,
    }
}

/// On-demand diff against the latest snapshot. The snapshot id is resolved
/// once; the whole comparison reads that one consistent capture even if a
/// rebuild lands concurrently.
pub async fn compare(pool: &PgPool, agent_id: &str, category: Category) -> AppResult<CompareResult> {
    let snapshot = BaselineSnapshot::latest(pool, agent_id, category)
        .await?
        .ok_or_else(|| AppError::NoBaseline {
            agent_id: agent_id.to_string(),
            category: category.as_str().to_string(),
        })?;

    let baseline: Vec<CanonicalItem> = BaselineItem::for_snapshot(pool, snapshot.id)
        .await?
        .into_iter()
        .map(|row| row.into_canonical())
        .collect();

    let current: Vec<CanonicalItem> = CurrentItem::for_agent(pool, agent_id, category)
        .await?
        .into_iter()
        .map(|row| row.into_canonical())
        .collect();

    Ok(diff(category, &baseline, &current))
}

/// Post-ingest detection pass: only runs against an ACTIVE, alert-enabled
/// config with an existing snapshot; every finding becomes one alert row.
/// Returns the number of alerts recorded.
pub async fn detect_and_alert(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
    current: &[CanonicalItem],
) -> AppResult<usize> {
    if current.is_empty() {
        return Ok(0);
    }

    let config = match BaselineConfig::find(pool, agent_id, category).await? {
        Some(c) if c.status == "ACTIVE" => c,
        _ => {
            tracing::debug!("No active baseline for agent {} category {}", agent_id, category);
            return Ok(0);
        }
    };
    if !config.alert_enabled {
        tracing::debug!("Alerts disabled for agent {} category {}", agent_id, category);
        return Ok(0);
    }

    // ACTIVE config with no snapshot yet (learning window was empty)
    let Some(snapshot) = BaselineSnapshot::latest(pool, agent_id, category).await? else {
        return Ok(0);
    };

    let baseline: Vec<CanonicalItem> = BaselineItem::for_snapshot(pool, snapshot.id)
        .await?
        .into_iter()
        .map(|row| row.into_canonical())
        .collect();

    let result = diff(category, &baseline, current);
    if !result.has_anomalies() {
        return Ok(0);
    }

    let mut recorded = 0;
    for anomaly in result.iter_anomalies() {
        SecurityAlert::create(pool, build_alert(agent_id, category, anomaly)).await?;
        recorded += 1;
    }

    tracing::info!(
        "Generated {} alerts for agent {} category {}",
        recorded,
        agent_id,
        category
    );
    Ok(recorded)
}

fn build_alert(agent_id: &str, category: Category, anomaly: &Anomaly) -> NewAlert {
    let title = format!(
        "[{}] {}: {}",
        category.as_str(),
        anomaly.anomaly_type.as_str(),
        anomaly.item_key
    );

    let mut content = format!(
        "Detected {} anomaly\nCategory: {}\nItem: {}",
        anomaly.anomaly_type.as_str(),
        category.as_str(),
        anomaly.item_key
    );
    if let Some(baseline) = &anomaly.baseline_value {
        content.push_str("\nBaseline value: ");
        content.push_str(baseline);
    }
    if let Some(current) = &anomaly.current_value {
        content.push_str("\nCurrent value: ");
        content.push_str(current);
    }

    NewAlert {
        agent_id: agent_id.to_string(),
        alert_type: category.as_str().to_string(),
        alert_level: anomaly.alert_level.as_str().to_string(),
        alert_title: title,
        alert_content: content,
        anomaly_type: Some(anomaly.anomaly_type.as_str().to_string()),
        baseline_item: anomaly.baseline_value.clone(),
        current_item: anomaly.current_value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, value: &str) -> CanonicalItem {
        CanonicalItem {
            key: key.to_string(),
            value: value.to_string(),
            item_type: "port".to_string(),
        }
    }

    #[test]
    fn identical_sets_produce_zero_anomalies() {
        let baseline = vec![item("80:tcp", "80|tcp|LISTEN|nginx"), item("22:tcp", "22|tcp|LISTEN|sshd")];
        let result = diff(Category::Port, &baseline, &baseline.clone());
        assert!(!result.has_anomalies());
        assert_eq!(result.unchanged_count, 2);
    }

    #[test]
    fn extra_current_port_is_new() {
        let baseline = vec![item("80:tcp", "80|tcp|LISTEN|nginx")];
        let current = vec![
            item("80:tcp", "80|tcp|LISTEN|nginx"),
            item("8080:tcp", "8080|tcp|LISTEN|java"),
        ];
        let result = diff(Category::Port, &baseline, &current);
        assert_eq!(result.new_items_count, 1);
        assert_eq!(result.new_items[0].item_key, "8080:tcp");
        assert_eq!(result.new_items[0].alert_level, Severity::High);
        assert_eq!(result.missing_items_count, 0);
        assert_eq!(result.modified_items_count, 0);
    }

    #[test]
    fn absent_baseline_key_is_missing() {
        let baseline = vec![item("80:tcp", "a"), item("443:tcp", "b")];
        let current = vec![item("80:tcp", "a")];
        let result = diff(Category::Port, &baseline, &current);
        assert_eq!(result.missing_items_count, 1);
        assert_eq!(result.missing_items[0].item_key, "443:tcp");
        assert_eq!(result.missing_items[0].baseline_value.as_deref(), Some("b"));
        assert!(result.missing_items[0].current_value.is_none());
    }

    #[test]
    fn value_inequality_is_modified_not_fuzzy() {
        let baseline = vec![item("80:tcp", "80|tcp|LISTEN|nginx")];
        let current = vec![item("80:tcp", "80|tcp|LISTEN|nginx ")];
        let result = diff(Category::Port, &baseline, &current);
        assert_eq!(result.modified_items_count, 1);
        let modified = &result.modified_items[0];
        assert_eq!(modified.baseline_value.as_deref(), Some("80|tcp|LISTEN|nginx"));
        assert_eq!(modified.current_value.as_deref(), Some("80|tcp|LISTEN|nginx "));
    }

    #[test]
    fn partition_invariant_holds() {
        let baseline = vec![item("a", "1"), item("b", "2"), item("c", "3"), item("d", "4")];
        let current = vec![item("b", "2"), item("c", "changed"), item("e", "5"), item("f", "6")];
        let result = diff(Category::Process, &baseline, &current);

        assert_eq!(
            result.new_items_count + result.unchanged_count + result.modified_items_count,
            current.len()
        );
        assert_eq!(
            result.missing_items_count + result.unchanged_count + result.modified_items_count,
            baseline.len()
        );
    }

    #[test]
    fn duplicate_baseline_keys_first_occurrence_wins() {
        let baseline = vec![item("80:tcp", "first"), item("80:tcp", "second")];
        let current = vec![item("80:tcp", "first")];
        let result = diff(Category::Port, &baseline, &current);
        assert!(!result.has_anomalies());
        assert_eq!(result.unchanged_count, 1);
    }

    #[test]
    fn empty_current_reports_every_baseline_key_missing() {
        let baseline = vec![item("a", "1"), item("b", "2")];
        let result = diff(Category::Usb, &baseline, &[]);
        assert_eq!(result.missing_items_count, 2);
        assert_eq!(result.new_items_count, 0);
        // deterministic ordering by key
        assert_eq!(result.missing_items[0].item_key, "a");
        assert_eq!(result.missing_items[1].item_key, "b");
    }

    #[test]
    fn severity_table_is_fixed() {
        use AnomalyKind::*;
        use Category::*;
        assert_eq!(severity(Process, New), Severity::High);
        assert_eq!(severity(Port, New), Severity::High);
        assert_eq!(severity(Usb, New), Severity::Medium);
        assert_eq!(severity(Login, New), Severity::High);
        assert_eq!(severity(Software, New), Severity::Low);
        for category in Category::ALL {
            assert_eq!(severity(category, Modified), Severity::Low);
            assert_eq!(severity(category, Missing), Severity::Low);
        }
    }

    #[test]
    fn alert_body_carries_both_values_for_modified() {
        let anomaly = Anomaly {
            anomaly_type: AnomalyKind::Modified,
            item_key: "80:tcp".to_string(),
            baseline_value: Some("old".to_string()),
            current_value: Some("new".to_string()),
            alert_level: Severity::Low,
        };
        let alert = build_alert("h1", Category::Port, &anomaly);
        assert_eq!(alert.alert_title, "[PORT] MODIFIED: 80:tcp");
        assert!(alert.alert_content.contains("Baseline value: old"));
        assert!(alert.alert_content.contains("Current value: new"));
        assert_eq!(alert.alert_level, "LOW");
    }
}
