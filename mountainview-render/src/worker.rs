//! Background panel workers.
//!
//! Each worker renders one panel on its own thread and reports back to the
//! owning [`crate::RenderManager`] over a channel. Workers are identified by
//! a monotonically increasing id so the manager can drop results from
//! workers it has already given up on.

use crate::panel::{render_panel, Panel, PanelKey, PanelStyle};
use mountainview_core::MultiScaleTimeSeries;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Messages sent from panel workers to the render manager.
pub(crate) enum PanelMessage {
    /// The panel finished rendering.
    Finished {
        worker_id: u64,
        key: PanelKey,
        panel: Box<Panel>,
    },

    /// Reading or rendering failed.
    Failed {
        worker_id: u64,
        key: PanelKey,
        error: String,
    },
}

/// Everything a worker needs to render one panel.
pub(crate) struct PanelJob {
    pub worker_id: u64,
    pub key: PanelKey,
    pub timeseries: Arc<MultiScaleTimeSeries>,
    pub style: Arc<PanelStyle>,
    pub cancel: Arc<AtomicBool>,
}

/// Starts a worker thread for `job`.
pub(crate) fn spawn_panel_worker(
    job: PanelJob,
    tx: Sender<PanelMessage>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("panel-{}-{}", job.key.ds_factor, job.key.index))
        .spawn(move || panel_worker(&job, &tx))
}

fn panel_worker(job: &PanelJob, tx: &Sender<PanelMessage>) {
    match render_panel(&job.timeseries, job.key, &job.style, &job.cancel) {
        Ok(Some(panel)) => {
            let _ = tx.send(PanelMessage::Finished {
                worker_id: job.worker_id,
                key: job.key,
                panel: Box::new(panel),
            });
        }
        Ok(None) => {
            log::debug!("panel worker {} cancelled", job.worker_id);
        }
        Err(e) => {
            log::warn!(
                "panel worker {} failed for {:?}: {e}",
                job.worker_id,
                job.key
            );
            let _ = tx.send(PanelMessage::Failed {
                worker_id: job.worker_id,
                key: job.key,
                error: e.to_string(),
            });
        }
    }
}
