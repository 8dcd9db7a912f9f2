//! Convenience loaders that turn files into core types.

use crate::mda::MdaReader;
use crate::Result;
use mountainview_core::{Firings, MultiScaleTimeSeries};
use std::path::Path;
use std::sync::Arc;

/// Loads a firings `.mda` file.
///
/// # Errors
/// Returns an error if the file cannot be read or has fewer than 3 rows.
pub fn load_firings<P: AsRef<Path>>(path: P) -> Result<Firings> {
    let reader = MdaReader::open(path)?;
    Ok(Firings::from_array(&reader.read_array2()?)?)
}

/// Opens a timeseries and its multi-scale envelope.
///
/// With `multiscale = None` the envelope is built in memory from the
/// memory-mapped timeseries.
///
/// # Errors
/// Returns an error if either file cannot be opened, the envelope does not
/// match the timeseries, or building the envelope fails.
pub fn open_multiscale_timeseries<P: AsRef<Path>>(
    timeseries: P,
    multiscale: Option<&Path>,
) -> Result<MultiScaleTimeSeries> {
    let data = Arc::new(MdaReader::open(timeseries)?);
    match multiscale {
        Some(path) => {
            let ms = Arc::new(MdaReader::open(path)?);
            Ok(MultiScaleTimeSeries::new(data, ms)?)
        }
        None => {
            log::info!(
                "no multi-scale file given; building envelope for {}",
                data.path().display()
            );
            Ok(MultiScaleTimeSeries::from_data(data)?)
        }
    }
}
