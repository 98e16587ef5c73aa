// src/types.rs
use crate::config::TimeWindow;
use crate::drivers::DisplaySeries;

// 渲染端发给调度器的命令
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorCommand {
    SetTimeWindow(TimeWindow),
    Shutdown,
}

// 单个通道的显示数据
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSeries {
    pub slot_index: usize,
    pub channel_index: usize,
    pub series: DisplaySeries,
}

// 调度器每个 tick 发给渲染端的帧
#[derive(Clone, Debug, Default)]
pub struct RenderFrame {
    pub tick: u64,
    pub window: TimeWindow,
    pub series: Vec<ChannelSeries>,
    pub stats: PipelineStats,
}

impl RenderFrame {
    pub fn slot_series(&self, slot_index: usize) -> impl Iterator<Item = &ChannelSeries> {
        self.series.iter().filter(move |s| s.slot_index == slot_index)
    }
}

// 管线计数器
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub datagrams_received: u64,
    pub datagrams_decoded: u64,
    pub text_datagrams: u64,
    pub binary_datagrams: u64,
    pub malformed: u64,
    pub unknown_slot: u64,
    pub intake_dropped: u64,
    pub samples_appended: u64,
    pub samples_skipped_fft: u64,
    pub samples_rejected: u64,
    pub ticks: u64,
    pub tick_overruns: u64,
}

impl PipelineStats {
    pub fn datagrams_failed(&self) -> u64 {
        self.malformed + self.unknown_slot
    }

    /// Counter deltas since `earlier`, for periodic rate logging.
    pub fn since(&self, earlier: &PipelineStats) -> PipelineStats {
        PipelineStats {
            datagrams_received: self.datagrams_received.saturating_sub(earlier.datagrams_received),
            datagrams_decoded: self.datagrams_decoded.saturating_sub(earlier.datagrams_decoded),
            text_datagrams: self.text_datagrams.saturating_sub(earlier.text_datagrams),
            binary_datagrams: self.binary_datagrams.saturating_sub(earlier.binary_datagrams),
            malformed: self.malformed.saturating_sub(earlier.malformed),
            unknown_slot: self.unknown_slot.saturating_sub(earlier.unknown_slot),
            intake_dropped: self.intake_dropped.saturating_sub(earlier.intake_dropped),
            samples_appended: self.samples_appended.saturating_sub(earlier.samples_appended),
            samples_skipped_fft: self.samples_skipped_fft.saturating_sub(earlier.samples_skipped_fft),
            samples_rejected: self.samples_rejected.saturating_sub(earlier.samples_rejected),
            ticks: self.ticks.saturating_sub(earlier.ticks),
            tick_overruns: self.tick_overruns.saturating_sub(earlier.tick_overruns),
        }
    }
}
