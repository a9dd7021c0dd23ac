//! Static weighting rules — pure functions from a touchpoint sequence to a
//! credit vector summing to 1.0.
//!
//! Inputs are pre-sorted ascending by timestamp and pre-filtered to the
//! model's lookback window; that is the engine's job, not ours. Tie-broken
//! timestamps therefore resolve by array position.

use attribution_core::types::Touchpoint;
use chrono::{DateTime, Utc};

/// 100% of the credit to the earliest touchpoint.
pub fn first_touch(n: usize) -> Vec<f64> {
    let mut credits = vec![0.0; n];
    if n > 0 {
        credits[0] = 1.0;
    }
    credits
}

/// 100% of the credit to the latest touchpoint.
pub fn last_touch(n: usize) -> Vec<f64> {
    let mut credits = vec![0.0; n];
    if n > 0 {
        credits[n - 1] = 1.0;
    }
    credits
}

/// Equal credit to every touchpoint.
pub fn linear(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

/// Exponential decay toward the conversion: weight_i = 2^(-age_days / half_life),
/// normalized so the credits sum to 1.0. The most recent touchpoint always
/// carries the largest share.
pub fn time_decay(
    touchpoints: &[Touchpoint],
    conversion_at: DateTime<Utc>,
    half_life_days: f64,
) -> Vec<f64> {
    if touchpoints.is_empty() {
        return Vec::new();
    }
    let weights: Vec<f64> = touchpoints
        .iter()
        .map(|tp| {
            let age_days =
                (conversion_at - tp.timestamp).num_seconds() as f64 / 86_400.0;
            2f64.powf(-age_days / half_life_days)
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// U-shaped credit: 40% to the first touchpoint, 40% to the last, and the
/// remaining 20% split evenly across the interior.
///
/// n == 2 splits 50/50 rather than applying the 40/40 formula (which would
/// leave 20% with no interior touchpoint to receive it).
pub fn position_based(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        2 => vec![0.5, 0.5],
        _ => {
            let middle = 0.2 / (n - 2) as f64;
            let mut credits = vec![middle; n];
            credits[0] = 0.4;
            credits[n - 1] = 0.4;
            credits
        }
    }
}
