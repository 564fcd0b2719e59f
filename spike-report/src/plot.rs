use anyhow::{Result, bail};
use ephys_common::Millis;
use plotters::{
    prelude::{ChartBuilder, IntoDrawingArea, PathElement, SVGBackend},
    style::{BLACK, IntoFont, WHITE},
};
use spike_analysis::{RasterExtent, SpikeTimes};
use std::{ops::Range, path::Path};
use tracing::instrument;

/// Fraction of each raster row left blank above and below the ticks.
const ROW_MARGIN: f64 = 0.1;

/// User supplied limits of the time axis, derived from the recording if left unspecified.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TimeBounds {
    pub(crate) min: Option<Millis>,
    pub(crate) max: Option<Millis>,
}

impl TimeBounds {
    fn resolve(self, extent: RasterExtent) -> Result<Range<Millis>> {
        let min = self.min.unwrap_or(0.0);
        let max = self.max.unwrap_or(extent.duration);
        if min.is_nan() || max.is_nan() || min >= max {
            bail!("Raster time axis is empty: {min} ms to {max} ms");
        }
        Ok(min..max)
    }
}

/// Draws one row of ticks per trial, one tick per spike, and saves it as an SVG.
#[instrument(skip_all, fields(path = %path.display(), rows = extent.rows))]
pub(crate) fn save_raster(
    path: &Path,
    spike_times: &SpikeTimes,
    extent: RasterExtent,
    (width, height): (u32, u32),
    bounds: TimeBounds,
) -> Result<()> {
    let time = bounds.resolve(extent)?;

    let root = SVGBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .x_label_area_size(35)
        .y_label_area_size(40)
        .margin(5)
        .caption(
            format!("Spikes on {}", spike_times.channel),
            ("sans-serif", 30.0).into_font(),
        )
        .build_cartesian_2d(time.clone(), 0.0..extent.rows as f64)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc("time (ms)")
        .y_desc("trials")
        .draw()?;

    let (start, end) = (time.start, time.end);
    let ticks = spike_times
        .times
        .iter()
        .enumerate()
        .flat_map(move |(row, times)| {
            let row = row as f64;
            times
                .iter()
                .copied()
                .filter(move |&t| start <= t && t < end)
                .map(move |t| {
                    PathElement::new(
                        vec![(t, row + ROW_MARGIN), (t, row + 1.0 - ROW_MARGIN)],
                        BLACK,
                    )
                })
        });
    chart.draw_series(ticks)?;

    root.present()?;
    Ok(())
}
