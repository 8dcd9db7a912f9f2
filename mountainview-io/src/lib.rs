//! mountainview-io: File I/O for mountainview.
//!
//! This crate provides memory-mapped `.mda` array reading via memmap2,
//! `.mda` writing, and JSON `.mv` session files.
//!

mod dataset;
mod error;
pub mod mda;
pub mod session;

pub use dataset::{load_firings, open_multiscale_timeseries};
pub use error::{Error, Result};
pub use mda::{MdaDataType, MdaHeader, MdaReader, MdaWriter};
pub use session::{ClusterAttributes, Session};
