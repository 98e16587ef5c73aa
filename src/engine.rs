// src/engine.rs
use crate::config::{MonitorSettings, TimeWindow};
use crate::drivers::{
    decimate, decode_datagram, detect_protocol, ChannelTable, Datagram, DatagramSource,
    MonitorError, Protocol,
};
use crate::renderer::Renderer;
use crate::slots::SlotTable;
use crate::types::*;
use log::{debug, info, warn};
use std::io;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Result of one scheduler tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickStatus {
    Continue,
    Shutdown,
    /// The datagram source is gone; the frame for this tick was still rendered.
    SourceClosed,
}

/// Drains datagrams into the channel table and hands one decimated frame per
/// tick to the renderer. Owns every buffer, so no locking is needed.
pub struct FrameScheduler<S, R> {
    settings: MonitorSettings,
    slots: SlotTable,
    channels: ChannelTable,
    source: S,
    renderer: R,
    commands: Receiver<MonitorCommand>,
    window: TimeWindow,
    stats: PipelineStats,
    stats_snapshot: PipelineStats,
    last_stats_log: Instant,
    tick: u64,
}

impl<S: DatagramSource, R: Renderer> FrameScheduler<S, R> {
    pub fn new(
        settings: MonitorSettings,
        slots: SlotTable,
        source: S,
        renderer: R,
        commands: Receiver<MonitorCommand>,
    ) -> Self {
        let channels = ChannelTable::new(
            &slots,
            settings.retention_secs,
            settings.buffer_margin,
            settings.max_channels_per_slot,
        );
        Self {
            settings,
            slots,
            channels,
            source,
            renderer,
            commands,
            window: TimeWindow::default(),
            stats: PipelineStats::default(),
            stats_snapshot: PipelineStats::default(),
            last_stats_log: Instant::now(),
            tick: 0,
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn tick(&mut self) -> TickStatus {
        // 1. 处理渲染端命令
        if self.apply_commands() == TickStatus::Shutdown {
            return TickStatus::Shutdown;
        }

        // 2. 有界地取出数据报
        let mut closed = false;
        for _ in 0..self.settings.max_datagrams_per_tick {
            match self.source.try_next() {
                Ok(Some(datagram)) => self.ingest(&datagram),
                Ok(None) => break,
                Err(e) => {
                    warn!("{}", e);
                    closed = true;
                    break;
                }
            }
        }
        self.stats.intake_dropped = self.source.dropped();

        // 3. 生成并提交帧
        self.tick += 1;
        self.stats.ticks = self.tick;
        let frame = self.build_frame();
        self.renderer.render(&frame);

        if closed {
            TickStatus::SourceClosed
        } else {
            TickStatus::Continue
        }
    }

    fn apply_commands(&mut self) -> TickStatus {
        for _ in 0..10 {
            match self.commands.try_recv() {
                Ok(MonitorCommand::SetTimeWindow(window)) => {
                    if window != self.window {
                        info!("time window {} -> {}", self.window, window);
                        self.window = window;
                    }
                }
                Ok(MonitorCommand::Shutdown) => return TickStatus::Shutdown,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("command channel closed, stopping scheduler");
                    return TickStatus::Shutdown;
                }
            }
        }
        TickStatus::Continue
    }

    /// Decodes one datagram and appends it. Failures only bump counters.
    pub fn ingest(&mut self, datagram: &Datagram) {
        self.stats.datagrams_received += 1;
        let protocol = detect_protocol(&datagram.payload, self.settings.wire_format);
        let result = decode_datagram(&datagram.payload, protocol, &self.slots)
            .and_then(|batch| self.channels.apply(&batch, &self.slots));
        match result {
            Ok(outcome) => {
                self.stats.datagrams_decoded += 1;
                match protocol {
                    Protocol::Text => self.stats.text_datagrams += 1,
                    Protocol::Binary => self.stats.binary_datagrams += 1,
                }
                if outcome.rejected > 0 && self.stats.samples_rejected == 0 {
                    warn!(
                        "datagram exceeds the {}-channel ceiling, extra channels are dropped",
                        self.settings.max_channels_per_slot
                    );
                }
                self.stats.samples_appended += outcome.appended as u64;
                self.stats.samples_skipped_fft += outcome.skipped_fft as u64;
                self.stats.samples_rejected += outcome.rejected as u64;
            }
            Err(e) => {
                if e.is_unknown_slot() {
                    self.stats.unknown_slot += 1;
                } else {
                    self.stats.malformed += 1;
                }
                debug!("dropped {:?} datagram from {:?}: {}", protocol, datagram.source, e);
            }
        }
    }

    fn build_frame(&self) -> RenderFrame {
        let mut series = Vec::new();
        for slot in self.slots.iter().filter(|s| s.is_time_domain()) {
            for (channel_index, buffer) in self.channels.channels(slot.index).iter().enumerate() {
                if buffer.len() < 2 {
                    continue;
                }
                series.push(ChannelSeries {
                    slot_index: slot.index,
                    channel_index,
                    series: decimate(
                        buffer,
                        slot.effective_rate_hz,
                        self.window,
                        self.settings.max_display_points,
                    ),
                });
            }
        }
        RenderFrame {
            tick: self.tick,
            window: self.window,
            series,
            stats: self.stats,
        }
    }

    fn log_stats_if_due(&mut self) {
        let elapsed = self.last_stats_log.elapsed();
        if elapsed < self.settings.stats_interval {
            return;
        }
        let delta = self.stats.since(&self.stats_snapshot);
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            "{:.1} datagrams/s ({} text, {} binary), {} failed, {:.0} samples/s, {} buffered, {} overruns",
            delta.datagrams_received as f64 / secs,
            delta.text_datagrams,
            delta.binary_datagrams,
            delta.datagrams_failed(),
            delta.samples_appended as f64 / secs,
            self.channels.total_len(),
            delta.tick_overruns,
        );
        if delta.intake_dropped > 0 {
            warn!("intake queue overflowed, {} datagrams dropped", delta.intake_dropped);
        }
        self.stats_snapshot = self.stats;
        self.last_stats_log = Instant::now();
    }

    /// Ticks at `max_fps` until shutdown. Returns the final counters, or
    /// `IntakeClosed` if the source went away first.
    pub fn run(&mut self) -> Result<PipelineStats, MonitorError> {
        let period = self.settings.tick_period();
        info!(
            "scheduler running at {:.1} fps, window {}, {} slots",
            self.settings.max_fps,
            self.window,
            self.slots.len()
        );
        loop {
            let started = Instant::now();
            let status = self.tick();
            self.log_stats_if_due();
            match status {
                TickStatus::Continue => {}
                TickStatus::Shutdown => {
                    info!("scheduler stopped after {} ticks", self.tick);
                    return Ok(self.stats);
                }
                TickStatus::SourceClosed => return Err(MonitorError::IntakeClosed),
            }
            match period.checked_sub(started.elapsed()) {
                Some(rest) if rest > Duration::ZERO => thread::sleep(rest),
                _ => self.stats.tick_overruns += 1,
            }
        }
    }
}

pub fn spawn_thread<S, R>(
    scheduler: FrameScheduler<S, R>,
) -> io::Result<JoinHandle<Result<PipelineStats, MonitorError>>>
where
    S: DatagramSource + Send + 'static,
    R: Renderer + Send + 'static,
{
    thread::Builder::new()
        .name("frame-scheduler".to_owned())
        .spawn(move || {
            let mut scheduler = scheduler;
            scheduler.run()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WireFormat;
    use crate::drivers::binary::{encode_binary, BinaryHeader};
    use crate::drivers::{intake_queue, ManualSource};
    use crate::renderer::{frame_channel, ChannelRenderer, FrameReceiver};
    use crate::slots::SlotMetadata;
    use std::sync::mpsc::{channel, Sender};

    struct Harness {
        scheduler: FrameScheduler<ManualSource, ChannelRenderer>,
        commands: Sender<MonitorCommand>,
        frames: FrameReceiver,
    }

    fn harness(settings: MonitorSettings, slots: SlotTable, datagrams: Vec<&[u8]>) -> Harness {
        let (commands, rx_cmd) = channel();
        let (renderer, frames) = frame_channel();
        let source = ManualSource::new(datagrams.into_iter().map(Datagram::new));
        Harness {
            scheduler: FrameScheduler::new(settings, slots, source, renderer, rx_cmd),
            commands,
            frames,
        }
    }

    fn hundred_hz_slot() -> SlotTable {
        SlotTable::from_metadata(&[SlotMetadata {
            device_name: "Dev_Scope".into(),
            base_sample_rate_hz: 100.0,
            averaging_window: 1,
            fft_enabled: false,
            channel_range: Some("ai0".into()),
        }])
    }

    #[test]
    fn half_second_of_data_renders_half_second_span() {
        let lines: Vec<String> = (0..50)
            .map(|i| format!("Dev_Scope,{},{},1,0,{}", i * 10, i, i))
            .collect();
        let mut h = harness(
            MonitorSettings::default(),
            hundred_hz_slot(),
            lines.iter().map(|l| l.as_bytes()).collect(),
        );
        assert_eq!(h.scheduler.tick(), TickStatus::Continue);

        let frame = h.frames.latest().unwrap();
        assert_eq!(frame.window, TimeWindow::S1);
        assert_eq!(frame.series.len(), 1);
        let series = &frame.series[0].series;
        assert_eq!(series.len(), 50);
        assert_eq!(series.x[0], -0.5);
        assert_eq!(*series.x.last().unwrap(), 0.0);
        assert_eq!(series.y[49], 49.0);
        assert_eq!(frame.stats.samples_appended, 50);
    }

    #[test]
    fn malformed_datagrams_leave_buffers_untouched() {
        let header = BinaryHeader {
            seq_id: 1,
            timestamp: 0.0,
            sample_count: 2,
            channel_count: 2,
        };
        let mut short_binary = encode_binary(&header, &[0x80_0000; 4]);
        short_binary.truncate(short_binary.len() - 4);

        let settings = MonitorSettings {
            wire_format: WireFormat::Auto,
            ..MonitorSettings::default()
        };
        let mut h = harness(
            settings,
            SlotTable::fallback(),
            vec![&b"Dev1,0,0,2,0,1.0,2.0"[..], &b"Dev1,1,1,2,0,3.0,4.0"[..]],
        );
        h.scheduler.tick();
        let history = |s: &FrameScheduler<ManualSource, ChannelRenderer>, ch: usize| -> Vec<f64> {
            s.channels().channel(0, ch).unwrap().last(usize::MAX).collect()
        };
        assert_eq!(history(&h.scheduler, 0), vec![1.0, 3.0]);
        assert_eq!(history(&h.scheduler, 1), vec![2.0, 4.0]);

        for payload in [
            &b"Dev1,1,2"[..],
            &b"Nope,0,0,1,0,1.0"[..],
            &short_binary[..],
            &b"\xff\xfe"[..],
            &b"Dev1,2,2,2,0,5.0,oops"[..],
        ] {
            h.scheduler.ingest(&Datagram::new(payload));
        }
        h.scheduler.tick();

        let stats = h.scheduler.stats();
        assert_eq!(stats.datagrams_received, 7);
        assert_eq!(stats.datagrams_decoded, 2);
        assert_eq!(stats.unknown_slot, 1);
        assert_eq!(stats.malformed, 4);
        assert_eq!(history(&h.scheduler, 0), vec![1.0, 3.0]);
        assert_eq!(history(&h.scheduler, 1), vec![2.0, 4.0]);
        assert_eq!(h.scheduler.channels().total_len(), 4);
        let frame = h.frames.latest().unwrap();
        assert_eq!(frame.slot_series(0).count(), 2);
        assert_eq!(frame.slot_series(0).next().unwrap().series.y, vec![1.0, 3.0]);
    }

    #[test]
    fn forced_binary_rejects_wrong_length() {
        let settings = MonitorSettings {
            wire_format: WireFormat::Binary,
            ..MonitorSettings::default()
        };
        let mut h = harness(settings, SlotTable::fallback(), vec![&[0u8; 20][..]]);
        h.scheduler.tick();
        assert_eq!(h.scheduler.stats().malformed, 1);
        assert_eq!(h.scheduler.channels().total_len(), 0);
    }

    #[test]
    fn binary_batch_fills_first_slot() {
        let header = BinaryHeader {
            seq_id: 9,
            timestamp: 1.5,
            sample_count: 10,
            channel_count: 8,
        };
        let bytes = encode_binary(&header, &[0x80_0000; 80]);
        let mut h = harness(MonitorSettings::default(), SlotTable::fallback(), vec![&bytes[..]]);
        h.scheduler.tick();

        let stats = h.scheduler.stats();
        assert_eq!(stats.binary_datagrams, 1);
        assert_eq!(stats.samples_appended, 80);
        let frame = h.frames.latest().unwrap();
        assert_eq!(frame.slot_series(0).count(), 8);
        assert!(frame.slot_series(0).all(|s| s.series.y.iter().all(|v| *v == 0.0)));
    }

    #[test]
    fn drain_is_bounded_per_tick() {
        let settings = MonitorSettings {
            max_datagrams_per_tick: 3,
            ..MonitorSettings::default()
        };
        let lines: Vec<&[u8]> = vec![&b"Dev1,0,0,1,0,1.0"[..]; 5];
        let mut h = harness(settings, SlotTable::fallback(), lines);
        h.scheduler.tick();
        assert_eq!(h.scheduler.stats().datagrams_received, 3);
        h.scheduler.tick();
        assert_eq!(h.scheduler.stats().datagrams_received, 5);
        assert_eq!(h.scheduler.stats().ticks, 2);
    }

    #[test]
    fn window_command_applies_on_next_tick() {
        let lines: Vec<String> = (0..200)
            .map(|i| format!("Dev_Scope,{},{},1,0,{}", i * 10, i, i))
            .collect();
        let mut h = harness(
            MonitorSettings::default(),
            hundred_hz_slot(),
            lines.iter().map(|l| l.as_bytes()).collect(),
        );
        h.scheduler.tick();
        h.scheduler.tick();
        assert_eq!(h.frames.latest().unwrap().series[0].series.len(), 100);

        h.commands
            .send(MonitorCommand::SetTimeWindow(TimeWindow::Ms100))
            .unwrap();
        h.scheduler.tick();
        assert_eq!(h.scheduler.window(), TimeWindow::Ms100);
        let frame = h.frames.latest().unwrap();
        assert_eq!(frame.window, TimeWindow::Ms100);
        let series = &frame.series[0].series;
        assert_eq!(series.y, (190..200).map(|v| v as f64).collect::<Vec<_>>());
        // Switching back needs no new data.
        h.commands
            .send(MonitorCommand::SetTimeWindow(TimeWindow::S1))
            .unwrap();
        h.scheduler.tick();
        assert_eq!(h.frames.latest().unwrap().series[0].series.len(), 100);
    }

    #[test]
    fn shutdown_and_dropped_commands_stop_the_loop() {
        let Harness {
            mut scheduler,
            commands,
            ..
        } = harness(MonitorSettings::default(), SlotTable::fallback(), vec![]);
        commands.send(MonitorCommand::Shutdown).unwrap();
        assert_eq!(scheduler.tick(), TickStatus::Shutdown);
        assert_eq!(scheduler.tick(), TickStatus::Continue);
        drop(commands);
        assert_eq!(scheduler.tick(), TickStatus::Shutdown);
        assert_eq!(scheduler.run().unwrap().ticks, 1);
    }

    #[test]
    fn closed_intake_ends_run_with_error() {
        let (tx, rx) = intake_queue(8);
        tx.push(Datagram::new(&b"Dev2,0,0,1,0,2.5"[..])).unwrap();
        drop(tx);
        let (_commands, rx_cmd) = channel();
        let (renderer, frames) = frame_channel();
        let mut scheduler =
            FrameScheduler::new(MonitorSettings::default(), SlotTable::fallback(), rx, renderer, rx_cmd);
        assert!(matches!(scheduler.run(), Err(MonitorError::IntakeClosed)));
        assert_eq!(scheduler.stats().samples_appended, 1);
        assert_eq!(frames.latest().unwrap().tick, 1);
    }

    #[test]
    fn spawned_scheduler_stops_on_command() {
        let (commands, rx_cmd) = channel();
        let (renderer, _frames) = frame_channel();
        let scheduler = FrameScheduler::new(
            MonitorSettings::default(),
            SlotTable::fallback(),
            ManualSource::new(Vec::new()),
            renderer,
            rx_cmd,
        )
        .with_window(TimeWindow::S5);
        let handle = spawn_thread(scheduler).unwrap();
        commands.send(MonitorCommand::Shutdown).unwrap();
        assert!(handle.join().unwrap().is_ok());
    }
}
