//! mountainview-core: Core types for spike-sorting result visualization.
//!
//! This crate provides the foundational abstractions: 2D array sources,
//! multi-scale min/max timeseries envelopes, firing event tables, and
//! cluster merge bookkeeping.
//!

pub mod array;
pub mod cluster_merge;
pub mod error;
pub mod firings;
pub mod multiscale;

pub use array::ArraySource;
pub use cluster_merge::ClusterMerge;
pub use error::{Error, Result};
pub use firings::Firings;
pub use multiscale::{
    build_multiscale, is_power_of_3, smallest_power_of_3_larger_than, MinMax,
    MultiScaleTimeSeries,
};
