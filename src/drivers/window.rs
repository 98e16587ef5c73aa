use crate::config::TimeWindow;
use crate::drivers::ChannelBuffer;

/// Display-ready series for one channel. `x` is seconds relative to now.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplaySeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl DisplaySeries {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Span covered by the time axis.
    pub fn duration_secs(&self) -> f64 {
        self.x.first().map(|x0| -x0).unwrap_or(0.0)
    }

    /// Pairs in the `[x, y]` layout plotting widgets take.
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.x.iter().zip(&self.y).map(|(x, y)| [*x, *y]).collect()
    }
}

/// Smallest stride that brings `len` samples down to at most `max_points`.
pub fn stride_for(len: usize, max_points: usize) -> usize {
    let max_points = max_points.max(1);
    if len <= max_points {
        1
    } else {
        len.div_ceil(max_points)
    }
}

/// `count` evenly spaced offsets from `-duration` up to exactly `0.0`.
pub fn time_axis(count: usize, duration_secs: f64) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let last = (count - 1) as f64;
            (0..count)
                .map(|i| duration_secs * (i as f64 / last) - duration_secs)
                .collect()
        }
    }
}

/// Cuts the selected window out of a channel history and bounds its point count.
///
/// The covered duration comes from the samples actually present, so a
/// half-filled buffer spans half the window.
pub fn decimate(
    buffer: &ChannelBuffer,
    effective_rate_hz: f64,
    window: TimeWindow,
    max_points: usize,
) -> DisplaySeries {
    let points_needed = window.samples(effective_rate_hz);
    let slice = buffer.last(points_needed);
    let slice_len = slice.len();
    if slice_len == 0 {
        return DisplaySeries::default();
    }
    let stride = stride_for(slice_len, max_points);
    let y: Vec<f64> = slice.step_by(stride).collect();
    let duration = slice_len as f64 / effective_rate_hz;
    let x = time_axis(y.len(), duration);
    DisplaySeries { x, y }
}
