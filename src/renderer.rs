//! Delivery side of the scheduler. A renderer gets one frame per tick and never
//! touches the channel buffers itself.

use crossbeam_channel::TryRecvError;
use log::{debug, log_enabled, Level};
use std::cell::Cell;

use crate::drivers::{DropOldestReceiver, DropOldestSender};
use crate::slots::SlotTable;
use crate::types::RenderFrame;

pub trait Renderer {
    fn render(&mut self, frame: &RenderFrame);
}

/// Headless renderer: reports point counts per slot at debug level.
pub struct LogRenderer {
    slots: SlotTable,
    every_n_ticks: u64,
}

impl LogRenderer {
    pub fn new(slots: SlotTable, every_n_ticks: u64) -> Self {
        Self {
            slots,
            every_n_ticks: every_n_ticks.max(1),
        }
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &RenderFrame) {
        if frame.tick % self.every_n_ticks != 0 || !log_enabled!(Level::Debug) {
            return;
        }
        for slot in self.slots.iter() {
            let mut channels = 0;
            let mut points = 0;
            let mut span = 0.0f64;
            for s in frame.slot_series(slot.index) {
                channels += 1;
                points += s.series.len();
                span = span.max(s.series.duration_secs());
            }
            if channels > 0 {
                debug!(
                    "[{}] {}: {} channels, {} points, {:.3}s of {}",
                    frame.tick, slot.title, channels, points, span, frame.window
                );
            }
        }
    }
}

/// Forwards frames to another thread. Only the freshest frame is kept when the
/// receiving side lags.
pub struct ChannelRenderer {
    tx: DropOldestSender<RenderFrame>,
}

impl Renderer for ChannelRenderer {
    fn render(&mut self, frame: &RenderFrame) {
        // Receiver gone means the UI closed; the scheduler learns that from its command channel.
        let _ = self.tx.push(frame.clone());
    }
}

/// UI end of a [`ChannelRenderer`].
pub struct FrameReceiver {
    rx: DropOldestReceiver<RenderFrame>,
    closed: Cell<bool>,
}

impl FrameReceiver {
    /// Most recent frame, if any arrived since the last call.
    pub fn latest(&self) -> Option<RenderFrame> {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(TryRecvError::Empty) => return latest,
                Err(TryRecvError::Disconnected) => {
                    self.closed.set(true);
                    return latest;
                }
            }
        }
    }

    /// True once the scheduler has dropped its renderer and every frame was read.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

pub fn frame_channel() -> (ChannelRenderer, FrameReceiver) {
    let (tx, rx) = crate::drivers::intake::drop_oldest_channel(1);
    (
        ChannelRenderer { tx },
        FrameReceiver {
            rx,
            closed: Cell::new(false),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_renderer_keeps_only_freshest_frame() {
        let (mut renderer, receiver) = frame_channel();
        assert!(receiver.latest().is_none());
        for tick in 1..=3 {
            renderer.render(&RenderFrame {
                tick,
                ..RenderFrame::default()
            });
        }
        assert_eq!(receiver.latest().map(|f| f.tick), Some(3));
        assert!(receiver.latest().is_none());
    }

    #[test]
    fn receiver_reports_closed_after_last_frame() {
        let (mut renderer, receiver) = frame_channel();
        renderer.render(&RenderFrame {
            tick: 7,
            ..RenderFrame::default()
        });
        assert!(receiver.latest().is_some());
        assert!(!receiver.is_closed());

        renderer.render(&RenderFrame {
            tick: 8,
            ..RenderFrame::default()
        });
        drop(renderer);
        assert_eq!(receiver.latest().map(|f| f.tick), Some(8));
        assert!(receiver.is_closed());
        assert!(receiver.latest().is_none());
    }

    #[test]
    fn log_renderer_accepts_frames() {
        let mut renderer = LogRenderer::new(SlotTable::fallback(), 1);
        renderer.render(&RenderFrame::default());
    }
}
