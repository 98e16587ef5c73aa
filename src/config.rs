// src/config.rs
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::drivers::MonitorError;

/// Selectable display windows. The largest one drives buffer retention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TimeWindow {
    Ms10,
    Ms100,
    Ms500,
    #[default]
    S1,
    S5,
    S10,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 6] = [
        TimeWindow::Ms10,
        TimeWindow::Ms100,
        TimeWindow::Ms500,
        TimeWindow::S1,
        TimeWindow::S5,
        TimeWindow::S10,
    ];

    pub fn millis(self) -> u32 {
        match self {
            TimeWindow::Ms10 => 10,
            TimeWindow::Ms100 => 100,
            TimeWindow::Ms500 => 500,
            TimeWindow::S1 => 1_000,
            TimeWindow::S5 => 5_000,
            TimeWindow::S10 => 10_000,
        }
    }

    pub fn seconds(self) -> f64 {
        f64::from(self.millis()) / 1000.0
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeWindow::Ms10 => "10ms",
            TimeWindow::Ms100 => "100ms",
            TimeWindow::Ms500 => "500ms",
            TimeWindow::S1 => "1S",
            TimeWindow::S5 => "5S",
            TimeWindow::S10 => "10S",
        }
    }

    pub fn largest() -> TimeWindow {
        TimeWindow::S10
    }

    /// Points covering this window at `rate_hz`, never fewer than two.
    pub fn samples(self, rate_hz: f64) -> usize {
        let exact = rate_hz * f64::from(self.millis()) / 1000.0;
        (exact.floor().max(0.0) as usize).max(2)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TimeWindow::ALL
            .iter()
            .copied()
            .find(|w| w.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown time window `{wanted}` (expected one of 10ms, 100ms, 500ms, 1S, 5S, 10S)"))
    }
}

/// Which decoder the listener applies to incoming datagrams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WireFormat {
    Text,
    Binary,
    /// Binary when the datagram length matches its own header, text otherwise.
    #[default]
    Auto,
}

pub const MAX_RETENTION_SECS: f64 = 3_600.0;

/// Runtime knobs of the monitor.
#[derive(Clone, Debug)]
pub struct MonitorSettings {
    pub bind_addr: SocketAddr,
    pub recv_buffer_bytes: usize,
    pub max_fps: f64,
    pub max_display_points: usize,
    pub retention_secs: f64,
    pub buffer_margin: usize,
    pub intake_capacity: usize,
    pub max_datagrams_per_tick: usize,
    pub max_channels_per_slot: usize,
    pub wire_format: WireFormat,
    pub stats_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5005)),
            recv_buffer_bytes: 65_536,
            max_fps: 30.0,
            max_display_points: 20_000,
            retention_secs: 20.0,
            buffer_margin: 500,
            intake_capacity: 4_096,
            max_datagrams_per_tick: 100,
            max_channels_per_slot: 64,
            wire_format: WireFormat::Auto,
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<(), MonitorError> {
        let fail = |msg: String| Err(MonitorError::InvalidSettings(msg));
        if !(self.max_fps.is_finite() && self.max_fps > 0.0) {
            return fail(format!("max_fps must be > 0, got {}", self.max_fps));
        }
        if self.max_display_points < 2 {
            return fail(format!(
                "max_display_points must be at least 2, got {}",
                self.max_display_points
            ));
        }
        // Window changes must never need history the buffers cannot hold.
        if !(self.retention_secs >= TimeWindow::largest().seconds()) {
            return fail(format!(
                "retention_secs must cover the {} window, got {}",
                TimeWindow::largest(),
                self.retention_secs
            ));
        }
        if self.retention_secs > MAX_RETENTION_SECS {
            return fail(format!(
                "retention_secs must be at most {}, got {}",
                MAX_RETENTION_SECS, self.retention_secs
            ));
        }
        if self.recv_buffer_bytes == 0
            || self.intake_capacity == 0
            || self.max_datagrams_per_tick == 0
            || self.max_channels_per_slot == 0
        {
            return fail("buffer sizes, queue capacity and per-tick bounds must be non-zero".into());
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_labels_parse_back() {
        for window in TimeWindow::ALL {
            assert_eq!(window.label().parse::<TimeWindow>().unwrap(), window);
        }
        assert_eq!("10s".parse::<TimeWindow>().unwrap(), TimeWindow::S10);
        assert!("2S".parse::<TimeWindow>().is_err());
    }

    #[test]
    fn window_samples_floor_and_minimum() {
        assert_eq!(TimeWindow::S1.samples(100.0), 100);
        assert_eq!(TimeWindow::Ms10.samples(100.0), 2);
        assert_eq!(TimeWindow::Ms500.samples(333.3), 166);
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = MonitorSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.tick_period(), Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn retention_outside_bounds_is_rejected() {
        for retention_secs in [5.0, f64::NAN, 3_601.0, f64::INFINITY] {
            let settings = MonitorSettings {
                retention_secs,
                ..MonitorSettings::default()
            };
            assert!(settings.validate().is_err(), "{retention_secs}");
        }
    }
}
