mod plot;
mod recording_file;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use ephys_common::{ChannelId, DEFAULT_CHANNEL, Millis, Real, TracerEngine, TracerOptions};
use plot::TimeBounds;
use recording_file::RecordingFile;
use report::Report;
use spike_analysis::{
    DensityOptions, DetectOptions, Edge, ExtractOptions, HistogramOptions, Recording,
    detect_spikes, extract_spikes, make_spike_density, make_spike_histogram,
};
use std::path::PathBuf;
use tracing::{info, instrument};

// cargo run --bin spike-report -- --recording cell.json --output report.json --threshold=-40 --raster raster.svg

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// JSON file holding the recording to analyse.
    #[clap(long, env)]
    recording: PathBuf,

    /// Path of the JSON report to write.
    #[clap(long, env)]
    output: PathBuf,

    /// Channel to detect spikes on.
    #[clap(long, env, default_value = DEFAULT_CHANNEL)]
    channel: ChannelId,

    /// Direction of the threshold crossing, "rising" or "falling".
    #[clap(long, env, default_value = "falling")]
    edge: Edge,

    #[clap(long, env, allow_negative_numbers = true)]
    threshold: Real,

    /// Reserved, currently has no effect.
    #[clap(long, env)]
    filter_trace: bool,

    /// Width in samples of the extracted spike windows.
    #[clap(long, env, default_value = "100")]
    width: usize,

    /// Scale each extracted window to unit energy.
    #[clap(long, env)]
    energy: bool,

    /// Do not cut out spike windows.
    #[clap(long, env)]
    skip_extraction: bool,

    /// Histogram bin width in milliseconds.
    #[clap(long, env, default_value = "1")]
    bin_size: Millis,

    /// Standard deviation of the smoothing kernel in milliseconds.
    #[clap(long, env, default_value = "100")]
    sigma: Millis,

    /// If set, a raster of the detected spikes is saved to this SVG file.
    #[clap(long, env)]
    raster: Option<PathBuf>,

    #[clap(long, env, default_value = "1280")]
    raster_width: u32,

    #[clap(long, env, default_value = "720")]
    raster_height: u32,

    /// Start of the raster time axis, 0 if left unspecified.
    #[clap(long, env, allow_negative_numbers = true)]
    x_min: Option<Millis>,

    /// End of the raster time axis, the recording duration if left unspecified.
    #[clap(long, env, allow_negative_numbers = true)]
    x_max: Option<Millis>,

    /// Colour the log output.
    #[clap(long, env)]
    log_ansi: bool,
}

#[instrument(skip_all)]
fn analyse(recording: &Recording, args: &Cli) -> Result<Recording> {
    let detect = DetectOptions::new(args.threshold)
        .with_channel(args.channel.clone())
        .with_edge(args.edge)
        .with_filter_trace(args.filter_trace);
    let mut recording = detect_spikes(recording, &detect).context("Spike detection failed")?;

    if !args.skip_extraction {
        let extract = ExtractOptions {
            width: args.width,
            energy: args.energy,
            channel: None,
        };
        recording = extract_spikes(&recording, &extract).context("Spike extraction failed")?;
    }

    let histogram = HistogramOptions {
        bin_size: args.bin_size,
    };
    let recording =
        make_spike_histogram(&recording, &histogram).context("Spike histogram failed")?;

    let density = DensityOptions { sigma: args.sigma };
    make_spike_density(&recording, &density).context("Spike density failed")
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let _tracer = TracerEngine::new(TracerOptions {
        ansi: args.log_ansi,
    })?;

    let recording = RecordingFile::load(&args.recording)?
        .into_recording()
        .with_context(|| format!("Invalid recording in {}", args.recording.display()))?;
    info!(
        batch = recording.is_batch(),
        num_channels = recording.channel_ids().count(),
        "Loaded recording"
    );

    let recording = analyse(&recording, &args)?;

    Report::new(&recording).save(&args.output)?;
    info!(path = %args.output.display(), "Saved report");

    if let Some(path) = &args.raster {
        let spike_times = recording
            .spike_times()
            .context("Spike times are missing from the analysed recording")?;
        let bounds = TimeBounds {
            min: args.x_min,
            max: args.x_max,
        };
        plot::save_raster(
            path,
            spike_times,
            recording.raster_extent()?,
            (args.raster_width, args.raster_height),
            bounds,
        )?;
        info!(path = %path.display(), "Saved raster");
    }
    Ok(())
}
