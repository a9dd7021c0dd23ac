//! DashMap-backed reference repository.
//!
//! Whole `AttributionResult` records are inserted in one map write, so a
//! result and its per-touchpoint credits become visible together.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use attribution_core::types::{
    AttributionResult, Channel, ConversionEvent, ConversionPath, DateRange, JourneyOutcome,
    ModelType, Touchpoint,
};

use crate::repository::{AttributionRepository, ModelPerformance};

#[derive(Default)]
pub struct InMemoryRepository {
    /// user_id -> touchpoints, kept ascending by timestamp
    touchpoints: DashMap<String, Vec<Touchpoint>>,
    conversions: DashMap<Uuid, ConversionEvent>,
    /// user_id -> conversion ids
    user_conversions: DashMap<String, Vec<Uuid>>,
    results: DashMap<Uuid, AttributionResult>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn user_window(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<Touchpoint> {
        self.touchpoints
            .get(user_id)
            .map(|tps| {
                tps.iter()
                    .filter(|tp| tp.timestamp >= from && tp.timestamp <= until)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl AttributionRepository for InMemoryRepository {
    async fn save_touchpoint(&self, tp: Touchpoint) -> anyhow::Result<()> {
        let mut entry = self.touchpoints.entry(tp.user_id.clone()).or_default();
        if let Some(existing) = entry.iter_mut().find(|t| t.id == tp.id) {
            // Idempotent re-submission: metadata refresh only.
            existing.campaign = tp.campaign;
            existing.source = tp.source;
            existing.medium = tp.medium;
            existing.metadata = tp.metadata;
        } else {
            entry.push(tp);
            entry.sort_by_key(|t| t.timestamp);
        }
        Ok(())
    }

    async fn touchpoints_by_user(
        &self,
        user_id: &str,
        lookback_days: i64,
    ) -> anyhow::Result<Vec<Touchpoint>> {
        let now = Utc::now();
        Ok(self.user_window(user_id, now - Duration::days(lookback_days), now))
    }

    async fn touchpoints_in_window(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Touchpoint>> {
        Ok(self.user_window(user_id, from, until))
    }

    async fn save_conversion(&self, conversion: ConversionEvent) -> anyhow::Result<()> {
        let mut ids = self
            .user_conversions
            .entry(conversion.user_id.clone())
            .or_default();
        if !ids.contains(&conversion.id) {
            ids.push(conversion.id);
        }
        drop(ids);
        self.conversions.insert(conversion.id, conversion);
        Ok(())
    }

    async fn conversion(&self, id: Uuid) -> anyhow::Result<Option<ConversionEvent>> {
        Ok(self.conversions.get(&id).map(|c| c.clone()))
    }

    async fn conversions_by_user(&self, user_id: &str) -> anyhow::Result<Vec<ConversionEvent>> {
        let ids = self
            .user_conversions
            .get(user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        let mut conversions: Vec<ConversionEvent> = ids
            .iter()
            .filter_map(|id| self.conversions.get(id).map(|c| c.clone()))
            .collect();
        conversions.sort_by_key(|c| c.timestamp);
        Ok(conversions)
    }

    async fn save_attribution_result(&self, result: AttributionResult) -> anyhow::Result<()> {
        self.results.insert(result.id, result);
        Ok(())
    }

    async fn results_in_range(&self, range: DateRange) -> anyhow::Result<Vec<AttributionResult>> {
        let mut results: Vec<AttributionResult> = self
            .results
            .iter()
            .filter(|r| range.contains(r.calculated_at))
            .map(|r| r.clone())
            .collect();
        results.sort_by_key(|r| r.calculated_at);
        Ok(results)
    }

    async fn training_data(
        &self,
        range: DateRange,
        lookback_days: i64,
    ) -> anyhow::Result<Vec<JourneyOutcome>> {
        let window = |tps: &[Touchpoint], from: DateTime<Utc>, until: DateTime<Utc>| {
            tps.iter()
                .filter(|tp| tp.timestamp >= from && tp.timestamp <= until)
                .cloned()
                .collect::<Vec<_>>()
        };

        let mut journeys = Vec::new();
        for entry in self.touchpoints.iter() {
            let user_id = entry.key();
            let user_conversions: Vec<ConversionEvent> = self
                .user_conversions
                .get(user_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| self.conversions.get(id).map(|c| c.clone()))
                        .filter(|c| range.contains(c.timestamp))
                        .collect()
                })
                .unwrap_or_default();

            if user_conversions.is_empty() {
                // No conversion in range: the touchpoints form one
                // non-converting journey.
                let touchpoints = window(entry.value(), range.start, range.end);
                if !touchpoints.is_empty() {
                    journeys.push(JourneyOutcome {
                        user_id: user_id.clone(),
                        touchpoints,
                        converted: false,
                    });
                }
            } else {
                for conversion in user_conversions {
                    let from = conversion.timestamp - Duration::days(lookback_days);
                    let touchpoints = window(entry.value(), from, conversion.timestamp);
                    journeys.push(JourneyOutcome {
                        user_id: user_id.clone(),
                        touchpoints,
                        converted: true,
                    });
                }
            }
        }
        Ok(journeys)
    }

    async fn common_paths(
        &self,
        range: DateRange,
        limit: usize,
    ) -> anyhow::Result<Vec<ConversionPath>> {
        // Group by channel sequence, counting each conversion once even if
        // it was attributed under several models.
        let mut by_path: HashMap<Vec<Channel>, (HashSet<Uuid>, f64)> = HashMap::new();
        for result in self.results.iter() {
            if !range.contains(result.calculated_at) || result.touchpoints.is_empty() {
                continue;
            }
            let path: Vec<Channel> = result
                .touchpoints
                .iter()
                .map(|tp| tp.channel.clone())
                .collect();
            let (seen, value) = by_path.entry(path).or_insert((HashSet::new(), 0.0));
            if seen.insert(result.conversion_id) {
                *value += result.conversion_value;
            }
        }

        let mut paths: Vec<ConversionPath> = by_path
            .into_iter()
            .map(|(path, (seen, total_value))| ConversionPath {
                path,
                conversions: seen.len() as u64,
                total_value,
            })
            .collect();
        paths.sort_by(|a, b| b.conversions.cmp(&a.conversions));
        paths.truncate(limit);
        Ok(paths)
    }

    async fn model_performance(
        &self,
        range: DateRange,
    ) -> anyhow::Result<Vec<ModelPerformance>> {
        let mut by_model: HashMap<ModelType, (u64, f64, u64)> = HashMap::new();
        for result in self.results.iter() {
            if !range.contains(result.calculated_at) {
                continue;
            }
            let (count, value, touchpoints) =
                by_model.entry(result.model_type).or_insert((0, 0.0, 0));
            *count += 1;
            *value += result.conversion_value;
            *touchpoints += result.touchpoints.len() as u64;
        }

        let mut rows: Vec<ModelPerformance> = by_model
            .into_iter()
            .map(|(model_type, (results, attributed_value, touchpoints))| ModelPerformance {
                model_type,
                results,
                attributed_value,
                avg_touchpoints: if results > 0 {
                    touchpoints as f64 / results as f64
                } else {
                    0.0
                },
            })
            .collect();
        rows.sort_by(|a, b| b.attributed_value.total_cmp(&a.attributed_value));
        Ok(rows)
    }
}
