//! mountainview command-line interface.
//!
//! Headless access to the viewer core: dataset summaries, multi-scale
//! preprocessing, level-of-detail rendering to PNG, correlograms,
//! templates, and cluster merge curation in `.mv` session files.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand, ValueEnum};
use mountainview_algorithms::{compute_auto_correlograms, compute_templates, CorrelogramConfig, Histogram};
use mountainview_core::build_multiscale;
use mountainview_io::{
    load_firings, open_multiscale_timeseries, MdaDataType, MdaReader, MdaWriter, Session,
};
use mountainview_render::{RenderConfig, RenderManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    MountainviewIo(#[from] mountainview_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] mountainview_core::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rendering did not finish within {0:?}")]
    RenderTimeout(Duration),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Element type for written `.mda` files.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum DataType {
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
}

impl From<DataType> for MdaDataType {
    fn from(value: DataType) -> Self {
        match value {
            DataType::Float32 => MdaDataType::Float32,
            DataType::Float64 => MdaDataType::Float64,
        }
    }
}

/// Spike-sorting result viewer core.
#[derive(Parser)]
#[command(name = "mountainview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show dimensions of a timeseries and cluster counts of a firings file
    Info {
        /// Raw or filtered timeseries (.mda, M x N)
        #[arg(long)]
        raw: Option<PathBuf>,

        /// Firings file (.mda, R x L)
        #[arg(long)]
        firings: Option<PathBuf>,

        /// Sample rate in Hz
        #[arg(long, default_value = "30000")]
        samplerate: f64,
    },

    /// Build the multi-scale min/max file for a timeseries
    Multiscale {
        /// Raw or filtered timeseries (.mda, M x N)
        #[arg(long)]
        raw: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Element type of the output file
        #[arg(long, value_enum, default_value = "float32")]
        data_type: DataType,
    },

    /// Render a time range to PNG through the panel cache
    Render {
        /// Raw or filtered timeseries (.mda, M x N)
        #[arg(long)]
        raw: PathBuf,

        /// Precomputed multi-scale file; built in memory if omitted
        #[arg(long)]
        multiscale: Option<PathBuf>,

        /// First timepoint
        #[arg(long, default_value = "0")]
        t1: i64,

        /// Last timepoint (defaults to the end of the recording)
        #[arg(long)]
        t2: Option<i64>,

        /// Image width in pixels
        #[arg(long, default_value = "1600")]
        width: u32,

        /// Image height in pixels
        #[arg(long, default_value = "800")]
        height: u32,

        /// Amplitude factor (defaults to fitting the global amplitude range)
        #[arg(long)]
        amp: Option<f64>,

        /// Maximum worker threads
        #[arg(long, default_value = "6")]
        threads: usize,

        /// Seconds to wait for panels
        #[arg(long, default_value = "60")]
        timeout: u64,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compute auto-correlogram histograms as JSON
    Correlograms {
        /// Firings file (.mda, R x L)
        #[arg(long)]
        firings: PathBuf,

        /// Session whose cluster merge is applied first
        #[arg(long)]
        session: Option<PathBuf>,

        /// Sample rate in Hz
        #[arg(long, default_value = "30000")]
        samplerate: f64,

        /// Half width of the correlogram window in milliseconds
        #[arg(long, default_value = "50")]
        max_dt_ms: f64,

        /// Histogram bin size in milliseconds
        #[arg(long, default_value = "1")]
        bin_size_ms: f64,

        /// Output JSON path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute mean cluster waveforms
    Templates {
        /// Raw or filtered timeseries (.mda, M x N)
        #[arg(long)]
        raw: PathBuf,

        /// Firings file (.mda, R x L)
        #[arg(long)]
        firings: PathBuf,

        /// Clip size in timepoints
        #[arg(long, default_value = "100")]
        clip_size: usize,

        /// Output file path (.mda, M x clip_size x K)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Merge clusters in a session
    Merge {
        /// Session file (.mv); created if missing
        #[arg(long)]
        session: PathBuf,

        /// Labels to merge
        #[arg(required = true, num_args = 2..)]
        labels: Vec<i32>,
    },

    /// Split labels back out of their merge groups
    Unmerge {
        /// Session file (.mv)
        #[arg(long)]
        session: PathBuf,

        /// Labels to unmerge
        #[arg(required = true)]
        labels: Vec<i32>,
    },

    /// Apply a session's cluster merge to a firings file
    Relabel {
        /// Firings file (.mda, R x L)
        #[arg(long)]
        firings: PathBuf,

        /// Session file (.mv)
        #[arg(long)]
        session: PathBuf,

        /// Output firings path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn load_or_new_session(path: &Path) -> Result<Session> {
    if path.exists() {
        Ok(Session::load(path)?)
    } else {
        log::info!("creating new session {}", path.display());
        Ok(Session::new())
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info {
            raw,
            firings,
            samplerate,
        } => {
            if raw.is_none() && firings.is_none() {
                return Err(CliError::InvalidArgument(
                    "pass --raw and/or --firings".to_string(),
                ));
            }
            if let Some(raw) = raw {
                let reader = MdaReader::open(&raw)?;
                let header = reader.header();
                let (m, n) = header.shape2();
                println!("Timeseries: {}", raw.display());
                println!("Data type: {:?}", header.data_type);
                println!("Channels: {}", m);
                println!("Timepoints: {}", n);
                if samplerate > 0.0 {
                    println!("Duration: {:.2} s", n as f64 / samplerate);
                }
            }
            if let Some(path) = firings {
                let firings = load_firings(&path)?;
                println!("Firings: {}", path.display());
                println!("Events: {}", firings.len());
                println!("Clusters: {}", firings.k_max());
                for (k, count) in firings.event_counts().iter().enumerate().skip(1) {
                    if *count > 0 {
                        println!("  {:>4}: {}", k, count);
                    }
                }
            }
        }

        Commands::Multiscale {
            raw,
            output,
            data_type,
        } => {
            let start = Instant::now();
            let reader = MdaReader::open(&raw)?;
            let multiscale = build_multiscale(&reader)?;
            MdaWriter::write_array2(&output, &multiscale, data_type.into())?;
            println!(
                "Wrote {} x {} multi-scale array to {} in {:.2}s",
                multiscale.nrows(),
                multiscale.ncols(),
                output.display(),
                start.elapsed().as_secs_f64()
            );
        }

        Commands::Render {
            raw,
            multiscale,
            t1,
            t2,
            width,
            height,
            amp,
            threads,
            timeout,
            output,
        } => {
            let ts = open_multiscale_timeseries(&raw, multiscale.as_deref())?;
            let t2 = t2.unwrap_or_else(|| i64::try_from(ts.num_timepoints()).unwrap_or(i64::MAX) - 1);
            if t2 <= t1 {
                return Err(CliError::InvalidArgument(format!(
                    "empty time range [{}, {}]",
                    t1, t2
                )));
            }
            let amp_factor = match amp {
                Some(amp) => amp,
                None => {
                    let (lo, hi) = ts.amplitude_range()?;
                    let peak = lo.abs().max(hi.abs());
                    if peak > 0.0 {
                        1.0 / peak
                    } else {
                        1.0
                    }
                }
            };
            log::info!("rendering [{t1}, {t2}] at amplitude factor {amp_factor}");

            let config = RenderConfig::new().try_with_max_num_threads(threads)?;
            let mut manager = RenderManager::new(Arc::new(ts), config);
            let timeout = Duration::from_secs(timeout);
            let start = Instant::now();
            manager.get_image(t1, t2, amp_factor, width, height);
            if !manager.wait_until_idle(timeout) {
                return Err(CliError::RenderTimeout(timeout));
            }
            let rendered = manager.get_image(t1, t2, amp_factor, width, height);
            if !rendered.is_complete() {
                log::warn!("some panels could not be rendered and are left blank");
            }
            rendered.image.save(&output)?;
            println!(
                "Rendered {} panels to {} in {:.2}s",
                rendered.panels.len(),
                output.display(),
                start.elapsed().as_secs_f64()
            );
        }

        Commands::Correlograms {
            firings,
            session,
            samplerate,
            max_dt_ms,
            bin_size_ms,
            output,
        } => {
            if bin_size_ms <= 0.0 {
                return Err(CliError::InvalidArgument(
                    "--bin-size-ms must be positive".to_string(),
                ));
            }
            let mut firings = load_firings(&firings)?;
            if let Some(session) = session {
                let session = Session::load(&session)?;
                firings.relabel(&session.cluster_merge.label_map(firings.k_max()));
            }
            let to_samples = samplerate / 1000.0;
            let config = CorrelogramConfig::new().try_with_max_dt(max_dt_ms * to_samples)?;
            let correlograms = compute_auto_correlograms(&firings, &config);

            let json: Vec<serde_json::Value> = correlograms
                .iter()
                .filter(|c| !c.data.is_empty())
                .map(|c| {
                    let ms: Vec<f64> = c.data.iter().map(|dt| dt / to_samples).collect();
                    let hist = Histogram::symmetric(&ms, max_dt_ms, bin_size_ms);
                    serde_json::json!({
                        "k": c.k1,
                        "bin_centers_ms": hist.bin_centers(),
                        "counts": hist.counts,
                    })
                })
                .collect();
            let text = serde_json::to_string_pretty(&json)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    println!("Wrote {} correlograms to {}", json.len(), path.display());
                }
                None => println!("{}", text),
            }
        }

        Commands::Templates {
            raw,
            firings,
            clip_size,
            output,
        } => {
            let reader = MdaReader::open(&raw)?;
            let firings = load_firings(&firings)?;
            let templates = compute_templates(&reader, &firings, clip_size)?;
            MdaWriter::write_array3(&output, &templates, MdaDataType::Float32)?;
            println!(
                "Wrote {} templates ({} channels x {} timepoints) to {}",
                templates.dim().2,
                templates.dim().0,
                templates.dim().1,
                output.display()
            );
        }

        Commands::Merge { session, labels } => {
            let mut state = load_or_new_session(&session)?;
            state.cluster_merge.merge(&labels);
            state.save(&session)?;
            for &k in &labels {
                println!(
                    "{} -> {}",
                    k,
                    state.cluster_merge.representative_label(k)
                );
            }
        }

        Commands::Unmerge { session, labels } => {
            let mut state = Session::load(&session)?;
            state.cluster_merge.unmerge(&labels);
            state.save(&session)?;
            println!("Merge groups: {}", state.cluster_merge.groups().len());
        }

        Commands::Relabel {
            firings,
            session,
            output,
        } => {
            let mut events = load_firings(&firings)?;
            let state = Session::load(&session)?;
            let before = events.event_counts().iter().filter(|&&c| c > 0).count();
            events.relabel(&state.cluster_merge.label_map(events.k_max()));
            let after = events.event_counts().iter().filter(|&&c| c > 0).count();
            MdaWriter::write_array2(&output, &events.to_array(), MdaDataType::Float64)?;
            println!(
                "Relabelled {} events: {} labels -> {} labels, written to {}",
                events.len(),
                before,
                after,
                output.display()
            );
        }
    }

    Ok(())
}
