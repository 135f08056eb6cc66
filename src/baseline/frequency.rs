//! Frequency baseline engine
//!
//! Measures, per host, how consistently each process name or port:protocol
//! pair shows up across the most recent collection rounds, independent of
//! the exact-match snapshots. The output is advisory: operators (and the
//! learning completion path) read it, nothing alerts from it directly.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{Category, FrequencyTier};
use crate::error::{AppError, AppResult};
use crate::models::frequency::{PortBaseline, ProcessBaseline};
use crate::models::inventory::HistoryItem;

const ALWAYS_THRESHOLD: f64 = 0.95;
const COMMON_THRESHOLD: f64 = 0.50;
const RARE_THRESHOLD: f64 = 0.10;

/// One history row reduced to what the engine needs.
#[derive(Debug, Clone)]
pub struct HistorySample {
    pub entity_key: String,
    pub collected_at: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

/// Aggregated stats for one entity over the analyzed window.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySummary {
    pub entity_key: String,
    pub frequency: f64,
    pub tier: FrequencyTier,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_appearances: i32,
    pub avg_cpu_percent: Option<f64>,
    pub avg_memory_percent: Option<f64>,
}

/// Fixed thresholds, evaluated high to low.
pub fn classify(frequency: f64) -> FrequencyTier {
    if frequency >= ALWAYS_THRESHOLD {
        FrequencyTier::Always
    } else if frequency >= COMMON_THRESHOLD {
        FrequencyTier::Common
    } else if frequency >= RARE_THRESHOLD {
        FrequencyTier::Rare
    } else {
        FrequencyTier::New
    }
}

/// Group samples by entity key and reduce each group. The denominator is the
/// number of rounds actually analyzed, so absence in a round counts as zero;
/// an entity appearing more than once inside a single round pushes its ratio
/// above 1.0 (the tier lookup tolerates that). Output is sorted by key.
pub fn summarize(samples: &[HistorySample], total_rounds: usize) -> Vec<EntitySummary> {
    if total_rounds == 0 {
        return Vec::new();
    }

    let mut grouped: std::collections::BTreeMap<&str, Vec<&HistorySample>> =
        std::collections::BTreeMap::new();
    for sample in samples {
        grouped.entry(sample.entity_key.as_str()).or_default().push(sample);
    }

    grouped
        .into_iter()
        .map(|(key, group)| {
            let frequency = group.len() as f64 / total_rounds as f64;
            let first_seen = group.iter().map(|s| s.collected_at).min().unwrap_or_else(Utc::now);
            let last_seen = group.iter().map(|s| s.collected_at).max().unwrap_or_else(Utc::now);
            EntitySummary {
                entity_key: key.to_string(),
                frequency,
                tier: classify(frequency),
                first_seen,
                last_seen,
                total_appearances: group.len() as i32,
                avg_cpu_percent: average(group.iter().filter_map(|s| s.cpu_percent)),
                avg_memory_percent: average(group.iter().filter_map(|s| s.memory_percent)),
            }
        })
        .collect()
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Rebuild the frequency baseline for one host+category.
pub async fn rebuild(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
    rounds_window: i64,
) -> AppResult<()> {
    match category {
        Category::Process => build_process_baseline(pool, agent_id, rounds_window).await,
        Category::Port => build_port_baseline(pool, agent_id, rounds_window).await,
        other => Err(AppError::ValidationError(format!(
            "frequency baselines exist only for PROCESS and PORT, not {}",
            other
        ))),
    }
}

pub async fn build_process_baseline(
    pool: &PgPool,
    agent_id: &str,
    rounds_window: i64,
) -> AppResult<()> {
    tracing::info!(
        "Building process baseline for agent {} using {} rounds",
        agent_id,
        rounds_window
    );

    let Some((samples, total_rounds)) =
        window_samples(pool, agent_id, Category::Process, rounds_window).await?
    else {
        return Ok(());
    };

    let summaries = summarize(&samples, total_rounds);
    for summary in &summaries {
        ProcessBaseline::upsert(pool, agent_id, summary).await?;
    }

    tracing::info!(
        "Process baseline built for agent {} with {} entries",
        agent_id,
        summaries.len()
    );
    Ok(())
}

pub async fn build_port_baseline(pool: &PgPool, agent_id: &str, rounds_window: i64) -> AppResult<()> {
    tracing::info!("Building port baseline for agent {} using {} rounds", agent_id, rounds_window);

    let Some((samples, total_rounds)) =
        window_samples(pool, agent_id, Category::Port, rounds_window).await?
    else {
        return Ok(());
    };

    let summaries = summarize(&samples, total_rounds);
    let mut written = 0;
    for summary in &summaries {
        // entity key is "port:protocol"
        let Some((port, protocol)) = summary.entity_key.split_once(':') else {
            tracing::warn!("Skipping malformed port entity key {}", summary.entity_key);
            continue;
        };
        let Ok(port) = port.parse::<i32>() else {
            tracing::warn!("Skipping non-numeric port in entity key {}", summary.entity_key);
            continue;
        };
        PortBaseline::upsert(pool, agent_id, port, protocol, summary).await?;
        written += 1;
    }

    tracing::info!("Port baseline built for agent {} with {} entries", agent_id, written);
    Ok(())
}

/// Samples from the most recent `rounds_window` distinct rounds, plus the
/// number of rounds actually found. None when the host has no history yet.
async fn window_samples(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
    rounds_window: i64,
) -> AppResult<Option<(Vec<HistorySample>, usize)>> {
    let recent_rounds = HistoryItem::recent_rounds(pool, agent_id, category, rounds_window).await?;
    if recent_rounds.is_empty() {
        tracing::warn!("No {} history data found for agent {}", category, agent_id);
        return Ok(None);
    }

    let total_rounds = recent_rounds.len();
    let rows = HistoryItem::in_rounds(pool, agent_id, category, &recent_rounds).await?;
    let samples = rows
        .into_iter()
        .map(|row| HistorySample {
            entity_key: row.entity_key,
            collected_at: row.collected_at,
            cpu_percent: row.cpu_percent,
            memory_percent: row.memory_percent,
        })
        .collect();

    Ok(Some((samples, total_rounds)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(key: &str, minute: u32, cpu: Option<f64>, mem: Option<f64>) -> HistorySample {
        HistorySample {
            entity_key: key.to_string(),
            collected_at: Utc.with_ymd_and_hms(2026, 8, 1, 12, minute, 0).unwrap(),
            cpu_percent: cpu,
            memory_percent: mem,
        }
    }

    #[test]
    fn classify_uses_fixed_thresholds() {
        assert_eq!(classify(1.0), FrequencyTier::Always);
        assert_eq!(classify(0.95), FrequencyTier::Always);
        assert_eq!(classify(0.94), FrequencyTier::Common);
        assert_eq!(classify(0.50), FrequencyTier::Common);
        assert_eq!(classify(0.49), FrequencyTier::Rare);
        assert_eq!(classify(0.10), FrequencyTier::Rare);
        assert_eq!(classify(0.09), FrequencyTier::New);
        assert_eq!(classify(0.0), FrequencyTier::New);
    }

    #[test]
    fn classification_is_monotonic_in_frequency() {
        let mut previous = FrequencyTier::New;
        for step in 0..=100 {
            let tier = classify(step as f64 / 100.0);
            assert!(tier >= previous, "tier dropped at frequency {}", step);
            previous = tier;
        }
    }

    #[test]
    fn six_of_ten_rounds_is_common() {
        let samples: Vec<HistorySample> =
            (0..6).map(|i| sample("chrome.exe", i, Some(2.0), Some(1.0))).collect();
        let summaries = summarize(&samples, 10);
        assert_eq!(summaries.len(), 1);
        assert!((summaries[0].frequency - 0.6).abs() < f64::EPSILON);
        assert_eq!(summaries[0].tier, FrequencyTier::Common);
        assert_eq!(summaries[0].total_appearances, 6);
    }

    #[test]
    fn first_and_last_seen_span_the_group() {
        let samples = vec![
            sample("sshd", 5, None, None),
            sample("sshd", 1, None, None),
            sample("sshd", 9, None, None),
        ];
        let summaries = summarize(&samples, 3);
        assert_eq!(summaries[0].first_seen, samples[1].collected_at);
        assert_eq!(summaries[0].last_seen, samples[2].collected_at);
    }

    #[test]
    fn averages_ignore_missing_values() {
        let samples = vec![
            sample("sshd", 0, Some(1.0), None),
            sample("sshd", 1, Some(3.0), None),
            sample("sshd", 2, None, None),
        ];
        let summaries = summarize(&samples, 3);
        assert_eq!(summaries[0].avg_cpu_percent, Some(2.0));
        assert_eq!(summaries[0].avg_memory_percent, None);
    }

    #[test]
    fn repeated_appearance_within_a_round_inflates_ratio() {
        // two rows in each of 2 analyzed rounds -> 4/2 = 2.0, still ALWAYS
        let samples: Vec<HistorySample> =
            (0..4).map(|i| sample("443:tcp", i, None, None)).collect();
        let summaries = summarize(&samples, 2);
        assert!(summaries[0].frequency > 1.0);
        assert_eq!(summaries[0].tier, FrequencyTier::Always);
    }

    #[test]
    fn summarize_is_deterministic_and_idempotent() {
        let samples = vec![
            sample("b", 0, Some(1.0), Some(2.0)),
            sample("a", 1, None, None),
            sample("b", 2, Some(3.0), Some(4.0)),
        ];
        let first = summarize(&samples, 4);
        let second = summarize(&samples, 4);
        assert_eq!(first, second);
        assert_eq!(first[0].entity_key, "a");
        assert_eq!(first[1].entity_key, "b");
    }

    #[test]
    fn empty_window_yields_nothing() {
        assert!(summarize(&[], 0).is_empty());
        assert!(summarize(&[sample("x", 0, None, None)], 0).is_empty());
    }
}
