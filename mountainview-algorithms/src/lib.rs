//! mountainview-algorithms: Derived computations over spike-sorting results.
//!
//! This crate provides:
//! - **Correlograms** - two-pointer cross/auto-correlograms with budgeted subsampling
//! - **Histograms** - fixed-width binning
//! - **Templates** - mean waveform per cluster
//! - **Palettes** - cluster and channel colours
//!
#![warn(missing_docs)]

pub mod correlogram;
mod histogram;
pub mod palette;
mod templates;

pub use correlogram::{
    compute_auto_correlograms, compute_cc_data, compute_correlogram_matrix,
    compute_correlograms_for_pairs, compute_cross_correlograms, Correlogram, CorrelogramConfig,
};
pub use histogram::Histogram;
pub use palette::{blend, channel_colors, cluster_color, generate_colors};
pub use templates::compute_templates;
