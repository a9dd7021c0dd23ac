//! ROI / ROAS / lifetime-value calculations over attribution results.
//!
//! Channel-level ratios are always recomputed from aggregated cost and
//! revenue, never averaged across per-touchpoint ratios.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use attribution_core::config::RoiConfig;
use attribution_core::types::{AttributionResult, Channel, ConversionPath, Touchpoint};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Cost, attributed revenue, and return ratios for one credited touchpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouchpointRoi {
    pub touchpoint_id: Uuid,
    pub channel: Channel,
    pub campaign: Option<String>,
    pub credit: f64,
    pub cost: f64,
    pub attributed_revenue: f64,
    /// `(revenue - cost) / cost * 100` (0.0 when cost is zero).
    pub roi_percent: f64,
    /// `revenue / cost` (0.0 when cost is zero).
    pub roas: f64,
}

/// Channel-level aggregate across many attribution results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRoi {
    pub channel: Channel,
    pub total_cost: f64,
    pub total_revenue: f64,
    pub touchpoints: u64,
    pub conversions: u64,
    pub roi_percent: f64,
    pub roas: f64,
}

/// Spend/revenue reconciliation totals for one attribution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiSummary {
    pub conversion_id: Uuid,
    pub total_cost: f64,
    pub total_revenue: f64,
    pub roi_percent: f64,
    pub roas: f64,
    pub computed_at: DateTime<Utc>,
}

/// A conversion path ranked by value per touchpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEfficiency {
    pub path: Vec<Channel>,
    pub conversions: u64,
    pub total_value: f64,
    /// `total_value / path length`.
    pub efficiency: f64,
    /// `total_value / conversions`.
    pub avg_value: f64,
}

// ---------------------------------------------------------------------------
// RoiCalculator
// ---------------------------------------------------------------------------

/// Calculator with a per-channel cost-per-action table and campaign-name
/// cost multipliers.
pub struct RoiCalculator {
    channel_costs: DashMap<Channel, f64>,
    default_cost: f64,
}

impl RoiCalculator {
    pub fn new(config: &RoiConfig) -> Self {
        let channel_costs = DashMap::new();
        channel_costs.insert(Channel::PaidSearch, 2.5);
        channel_costs.insert(Channel::Display, 1.2);
        channel_costs.insert(Channel::Social, 1.8);
        channel_costs.insert(Channel::Email, 0.1);
        channel_costs.insert(Channel::Organic, 0.0);
        channel_costs.insert(Channel::Direct, 0.0);
        channel_costs.insert(Channel::Referral, 0.5);
        channel_costs.insert(Channel::Affiliate, 1.0);
        Self {
            channel_costs,
            default_cost: config.default_channel_cost,
        }
    }

    /// Override the cost-per-action for a channel.
    pub fn update_channel_cost(&self, channel: Channel, rate: f64) {
        self.channel_costs.insert(channel, rate);
    }

    fn channel_cost(&self, channel: &Channel) -> f64 {
        self.channel_costs
            .get(channel)
            .map(|r| *r)
            .unwrap_or(self.default_cost)
    }

    /// Cost of one touchpoint: the channel base rate times the campaign
    /// multiplier. Campaign names containing "premium" cost 2x, "brand"
    /// 1.5x; matching is case-sensitive substring containment.
    fn touchpoint_cost(&self, tp: &Touchpoint) -> f64 {
        let base = self.channel_cost(&tp.channel);
        let multiplier = match &tp.campaign {
            Some(name) if name.contains("premium") => 2.0,
            Some(name) if name.contains("brand") => 1.5,
            _ => 1.0,
        };
        base * multiplier
    }

    /// Per-touchpoint ROI metrics for one attribution result.
    pub fn calculate_roi(&self, result: &AttributionResult) -> Vec<TouchpointRoi> {
        result
            .touchpoints
            .iter()
            .map(|tp| {
                let credit = tp.credit.unwrap_or(0.0);
                let cost = self.touchpoint_cost(tp);
                let revenue = result.conversion_value * credit;
                TouchpointRoi {
                    touchpoint_id: tp.id,
                    channel: tp.channel.clone(),
                    campaign: tp.campaign.clone(),
                    credit,
                    cost,
                    attributed_revenue: revenue,
                    roi_percent: roi_percent(revenue, cost),
                    roas: roas(revenue, cost),
                }
            })
            .collect()
    }

    /// Reconciliation totals for one result.
    pub fn roi_summary(&self, result: &AttributionResult) -> RoiSummary {
        let metrics = self.calculate_roi(result);
        let total_cost: f64 = metrics.iter().map(|m| m.cost).sum();
        let total_revenue: f64 = metrics.iter().map(|m| m.attributed_revenue).sum();
        RoiSummary {
            conversion_id: result.conversion_id,
            total_cost,
            total_revenue,
            roi_percent: roi_percent(total_revenue, total_cost),
            roas: roas(total_revenue, total_cost),
            computed_at: Utc::now(),
        }
    }

    /// Channel aggregates across many results, ratios computed from the
    /// aggregated cost and revenue, sorted descending by ROI.
    pub fn channel_roi(&self, results: &[AttributionResult]) -> Vec<ChannelRoi> {
        struct Acc {
            cost: f64,
            revenue: f64,
            touchpoints: u64,
            conversions: std::collections::HashSet<Uuid>,
        }

        let mut by_channel: HashMap<Channel, Acc> = HashMap::new();
        for result in results {
            for tp in &result.touchpoints {
                let acc = by_channel.entry(tp.channel.clone()).or_insert(Acc {
                    cost: 0.0,
                    revenue: 0.0,
                    touchpoints: 0,
                    conversions: std::collections::HashSet::new(),
                });
                acc.cost += self.touchpoint_cost(tp);
                acc.revenue += result.conversion_value * tp.credit.unwrap_or(0.0);
                acc.touchpoints += 1;
                acc.conversions.insert(result.conversion_id);
            }
        }

        let mut rows: Vec<ChannelRoi> = by_channel
            .into_iter()
            .map(|(channel, acc)| ChannelRoi {
                channel,
                total_cost: acc.cost,
                total_revenue: acc.revenue,
                touchpoints: acc.touchpoints,
                conversions: acc.conversions.len() as u64,
                roi_percent: roi_percent(acc.revenue, acc.cost),
                roas: roas(acc.revenue, acc.cost),
            })
            .collect();

        rows.sort_by(|a, b| b.roi_percent.total_cmp(&a.roi_percent));
        debug!(channels = rows.len(), "Computed channel ROI");
        rows
    }

    /// Distribute (historical + predicted) lifetime value across channels
    /// using each touchpoint's already-assigned credit.
    ///
    /// Takes the user's credited touchpoints directly rather than a user id:
    /// the touchpoints already identify the user, and the calculator stays
    /// free of any store dependency.
    pub fn clv_attribution(
        &self,
        historical_value: f64,
        predicted_value: f64,
        touchpoints: &[Touchpoint],
    ) -> HashMap<Channel, f64> {
        let total = historical_value + predicted_value;
        let mut by_channel: HashMap<Channel, f64> = HashMap::new();
        for tp in touchpoints {
            let share = total * tp.credit.unwrap_or(0.0);
            *by_channel.entry(tp.channel.clone()).or_insert(0.0) += share;
        }
        by_channel
    }

    /// Percentage uplift of the test population's conversion value over the
    /// control's. Zero control value yields zero lift, never a division error.
    pub fn incremental_lift(
        &self,
        test_results: &[AttributionResult],
        control_results: &[AttributionResult],
    ) -> f64 {
        let test_value: f64 = test_results.iter().map(|r| r.conversion_value).sum();
        let control_value: f64 = control_results.iter().map(|r| r.conversion_value).sum();
        if control_value == 0.0 {
            return 0.0;
        }
        (test_value - control_value) / control_value * 100.0
    }

    /// Rank conversion paths by value per touchpoint.
    pub fn path_efficiency(&self, paths: &[ConversionPath]) -> Vec<PathEfficiency> {
        let mut ranked: Vec<PathEfficiency> = paths
            .iter()
            .map(|p| {
                let len = p.path.len() as f64;
                PathEfficiency {
                    path: p.path.clone(),
                    conversions: p.conversions,
                    total_value: p.total_value,
                    efficiency: if len > 0.0 { p.total_value / len } else { 0.0 },
                    avg_value: if p.conversions > 0 {
                        p.total_value / p.conversions as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.efficiency.total_cmp(&a.efficiency));
        ranked
    }
}

fn roi_percent(revenue: f64, cost: f64) -> f64 {
    if cost > 0.0 {
        (revenue - cost) / cost * 100.0
    } else {
        0.0
    }
}

fn roas(revenue: f64, cost: f64) -> f64 {
    if cost > 0.0 {
        revenue / cost
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attribution_core::types::ModelType;

    fn calculator() -> RoiCalculator {
        RoiCalculator::new(&RoiConfig::default())
    }

    fn credited(channel: Channel, credit: f64, campaign: Option<&str>) -> Touchpoint {
        let mut tp = Touchpoint::new("user_1", channel, Utc::now());
        tp.credit = Some(credit);
        tp.campaign = campaign.map(|c| c.to_string());
        tp
    }

    fn result(value: f64, touchpoints: Vec<Touchpoint>) -> AttributionResult {
        AttributionResult {
            id: Uuid::new_v4(),
            conversion_id: Uuid::new_v4(),
            conversion_value: value,
            model_type: ModelType::Linear,
            touchpoints,
            calculated_at: Utc::now(),
        }
    }

    #[test]
    fn test_roi_per_touchpoint() {
        let calc = calculator();
        let result = result(
            100.0,
            vec![
                credited(Channel::PaidSearch, 0.5, None),
                credited(Channel::Email, 0.5, None),
            ],
        );
        let metrics = calc.calculate_roi(&result);

        // paid_search: cost 2.5, revenue 50 -> ROI 1900%, ROAS 20.
        assert!((metrics[0].cost - 2.5).abs() < 1e-9);
        assert!((metrics[0].attributed_revenue - 50.0).abs() < 1e-9);
        assert!((metrics[0].roi_percent - 1900.0).abs() < 1e-6);
        assert!((metrics[0].roas - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_campaign_multipliers() {
        let calc = calculator();
        let premium = credited(Channel::Display, 1.0, Some("summer-premium-push"));
        let brand = credited(Channel::Display, 1.0, Some("brand-awareness"));
        let plain = credited(Channel::Display, 1.0, Some("retarget"));
        assert!((calc.touchpoint_cost(&premium) - 2.4).abs() < 1e-9);
        assert!((calc.touchpoint_cost(&brand) - 1.8).abs() < 1e-9);
        assert!((calc.touchpoint_cost(&plain) - 1.2).abs() < 1e-9);
        // Case-sensitive: "Premium" does not match.
        let capitalized = credited(Channel::Display, 1.0, Some("Premium"));
        assert!((calc.touchpoint_cost(&capitalized) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_zero_cost_channel_yields_zero_ratios() {
        let calc = calculator();
        let result = result(100.0, vec![credited(Channel::Organic, 1.0, None)]);
        let rows = calc.channel_roi(&[result]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].roi_percent, 0.0);
        assert_eq!(rows[0].roas, 0.0);
        assert!((rows[0].total_revenue - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_channel_roi_aggregates_before_ratio() {
        let calc = calculator();
        let r1 = result(100.0, vec![credited(Channel::Social, 1.0, None)]);
        let r2 = result(10.0, vec![credited(Channel::Social, 1.0, None)]);
        let rows = calc.channel_roi(&[r1, r2]);

        // Aggregate: cost 3.6, revenue 110 -> single ratio from sums, not an
        // average of the two per-result ratios.
        assert_eq!(rows[0].conversions, 2);
        assert_eq!(rows[0].touchpoints, 2);
        assert!((rows[0].total_cost - 3.6).abs() < 1e-9);
        assert!((rows[0].roas - 110.0 / 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_channel_roi_sorted_descending() {
        let calc = calculator();
        let r = result(
            100.0,
            vec![
                credited(Channel::Display, 0.2, None),
                credited(Channel::Email, 0.8, None),
            ],
        );
        let rows = calc.channel_roi(&[r]);
        assert!(rows[0].roi_percent >= rows[1].roi_percent);
        assert_eq!(rows[0].channel, Channel::Email);
    }

    #[test]
    fn test_clv_distribution_follows_credit() {
        let calc = calculator();
        let tps = vec![
            credited(Channel::Email, 0.25, None),
            credited(Channel::Social, 0.75, None),
        ];
        let shares = calc.clv_attribution(600.0, 400.0, &tps);
        assert!((shares[&Channel::Email] - 250.0).abs() < 1e-9);
        assert!((shares[&Channel::Social] - 750.0).abs() < 1e-9);
    }

    #[test]
    fn test_lift_zero_control() {
        let calc = calculator();
        let test = vec![result(500.0, Vec::new())];
        assert_eq!(calc.incremental_lift(&test, &[]), 0.0);
    }

    #[test]
    fn test_lift_percentage() {
        let calc = calculator();
        let test = vec![result(150.0, Vec::new())];
        let control = vec![result(100.0, Vec::new())];
        assert!((calc.incremental_lift(&test, &control) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_path_efficiency_ranking() {
        let calc = calculator();
        let paths = vec![
            ConversionPath {
                path: vec![Channel::Display, Channel::Email, Channel::Direct],
                conversions: 3,
                total_value: 300.0,
            },
            ConversionPath {
                path: vec![Channel::Email],
                conversions: 2,
                total_value: 400.0,
            },
        ];
        let ranked = calc.path_efficiency(&paths);
        assert_eq!(ranked[0].path, vec![Channel::Email]);
        assert!((ranked[0].efficiency - 400.0).abs() < 1e-9);
        assert!((ranked[0].avg_value - 200.0).abs() < 1e-9);
        assert!((ranked[1].efficiency - 100.0).abs() < 1e-9);
    }
}
