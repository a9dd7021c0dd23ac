//! ROI, ROAS, lifetime-value, and incremental-lift calculations derived
//! from attribution results.

pub mod calculator;

pub use calculator::{
    ChannelRoi, PathEfficiency, RoiCalculator, RoiSummary, TouchpointRoi,
};
