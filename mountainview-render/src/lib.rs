//! mountainview-render: Level-of-detail rendering of multi-channel timeseries.
//!
//! This crate provides:
//! - **Panels** - fixed-width image tiles keyed by amplitude, downsampling
//!   factor, width and index
//! - **Workers** - background threads rendering panels with cooperative
//!   cancellation
//! - **`RenderManager`** - panel cache with approximate previews and
//!   pixel-budgeted eviction
//!
#![warn(missing_docs)]

mod config;
mod manager;
mod panel;
mod worker;

pub use config::RenderConfig;
pub use manager::{PanelPlacement, RenderManager, RenderedImage, Resolution};
pub use panel::{render_panel, Panel, PanelKey, PanelState, PanelStyle};
