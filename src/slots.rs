//! Slot mapper: turns the acquisition-side `DAQ_Settings.json` into one logical
//! slot per physical device.
//!
//! A device may be declared by several channel entries (possibly in different
//! tasks). The slot keeps the highest effective rate among them and switches to
//! FFT mode if any declaration asks for it.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use crate::drivers::ConfigError;

/// Declarations faster than this are rejected when building the slot table.
pub const MAX_SAMPLE_RATE_HZ: f64 = 1_000_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotMode {
    Time,
    Fft,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub index: usize,
    pub title: String,
    pub device_name: String,
    pub effective_rate_hz: f64,
    pub mode: SlotMode,
    /// Highest channel index declared for the device plus one; 0 when unknown.
    pub declared_channels: usize,
}

impl Slot {
    pub fn is_time_domain(&self) -> bool {
        self.mode == SlotMode::Time
    }

    /// Ring capacity for each channel of this slot. Saturates instead of wrapping.
    pub fn buffer_capacity(&self, retention_secs: f64, margin: usize) -> usize {
        ((self.effective_rate_hz * retention_secs).ceil() as usize).saturating_add(margin)
    }
}

/// One active channel declaration, the minimal contract the settings file supplies.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotMetadata {
    pub device_name: String,
    pub base_sample_rate_hz: f64,
    pub averaging_window: u32,
    pub fft_enabled: bool,
    pub channel_range: Option<String>,
}

impl SlotMetadata {
    pub fn effective_rate_hz(&self) -> f64 {
        self.base_sample_rate_hz / f64::from(self.averaging_window.max(1))
    }
}

// ---- DAQ_Settings.json ----

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub system_name: String,
    pub udp_target_ip: String,
    pub udp_target_port: u16,
    pub tasks: Vec<TaskConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            system_name: "DefaultSystem".into(),
            udp_target_ip: "127.0.0.1".into(),
            udp_target_port: 5005,
            tasks: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub task_name: String,
    pub active: bool,
    pub sample_rate: f64,
    pub channels: Vec<ChannelDeclaration>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            task_name: "UnnamedTask".into(),
            active: false,
            sample_rate: 1000.0,
            channels: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChannelDeclaration {
    pub device_name: String,
    pub channel_range: String,
    pub model_info: String,
    pub active: bool,
    pub moving_avg: MovingAvgConfig,
    pub fft: FftConfig,
}

impl Default for ChannelDeclaration {
    fn default() -> Self {
        Self {
            device_name: "UnknownDev".into(),
            channel_range: "ai0".into(),
            model_info: String::new(),
            active: true,
            moving_avg: MovingAvgConfig::default(),
            fft: FftConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MovingAvgConfig {
    pub active: bool,
    pub window_size: u32,
}

impl Default for MovingAvgConfig {
    fn default() -> Self {
        Self {
            active: false,
            window_size: 1,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FftConfig {
    pub active: bool,
}

impl SystemConfig {
    /// Reads the settings file, also trying the parent directory like the
    /// acquisition side does when started from a build folder.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut candidates = vec![path.to_path_buf()];
        if path.is_relative() {
            candidates.push(Path::new("..").join(path));
        }
        for candidate in &candidates {
            match fs::read_to_string(candidate) {
                Ok(text) => return Self::parse(&text, candidate),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(ConfigError::Io {
                        path: candidate.clone(),
                        source,
                    })
                }
            }
        }
        Err(ConfigError::Missing {
            path: path.to_path_buf(),
        })
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Active channel declarations of active tasks, in file order.
    pub fn slot_metadata(&self) -> Vec<SlotMetadata> {
        self.tasks
            .iter()
            .filter(|task| task.active)
            .flat_map(|task| {
                task.channels
                    .iter()
                    .filter(|ch| ch.active)
                    .map(move |ch| SlotMetadata {
                        device_name: ch.device_name.clone(),
                        base_sample_rate_hz: task.sample_rate,
                        averaging_window: if ch.moving_avg.active {
                            ch.moving_avg.window_size.max(1)
                        } else {
                            1
                        },
                        fft_enabled: ch.fft.active,
                        channel_range: Some(ch.channel_range.clone()),
                    })
            })
            .collect()
    }
}

/// Number of channels implied by a range such as `ai0:3` (4) or `ai5` (6).
fn channels_in_range(range: &str) -> usize {
    let digits = |s: &str| {
        s.trim()
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse::<usize>()
            .ok()
    };
    match range.split_once(':') {
        Some((lo, hi)) => match (digits(lo), digits(hi)) {
            (Some(lo), Some(hi)) => lo.max(hi).saturating_add(1),
            _ => 0,
        },
        None => digits(range).map(|i| i.saturating_add(1)).unwrap_or(0),
    }
}

/// Immutable slot table built once at startup.
#[derive(Clone, Debug, Default)]
pub struct SlotTable {
    slots: Vec<Slot>,
    by_name: HashMap<String, usize>,
}

impl SlotTable {
    pub fn from_metadata(entries: &[SlotMetadata]) -> Self {
        let mut table = SlotTable::default();
        for entry in entries {
            let rate = entry.effective_rate_hz();
            if !(rate.is_finite() && rate > 0.0) {
                warn!(
                    "skipping declaration for {}: sample rate {} is not positive",
                    entry.device_name, entry.base_sample_rate_hz
                );
                continue;
            }
            if rate > MAX_SAMPLE_RATE_HZ {
                warn!(
                    "skipping declaration for {}: {} Hz exceeds the {} Hz limit",
                    entry.device_name, rate, MAX_SAMPLE_RATE_HZ
                );
                continue;
            }
            let declared = entry
                .channel_range
                .as_deref()
                .map(channels_in_range)
                .unwrap_or(0);
            match table.by_name.get(&entry.device_name).copied() {
                Some(idx) => {
                    let slot = &mut table.slots[idx];
                    slot.effective_rate_hz = slot.effective_rate_hz.max(rate);
                    if entry.fft_enabled {
                        slot.mode = SlotMode::Fft;
                    }
                    slot.declared_channels = slot.declared_channels.max(declared);
                }
                None => {
                    let index = table.slots.len();
                    table.slots.push(Slot {
                        index,
                        title: format!("Slot {}: {}", index + 1, entry.device_name),
                        device_name: entry.device_name.clone(),
                        effective_rate_hz: rate,
                        mode: if entry.fft_enabled {
                            SlotMode::Fft
                        } else {
                            SlotMode::Time
                        },
                        declared_channels: declared,
                    });
                    table.by_name.insert(entry.device_name.clone(), index);
                }
            }
        }
        table
    }

    /// Two mock devices used when no usable settings file exists.
    pub fn fallback() -> Self {
        let mut table = SlotTable::default();
        for (name, label) in [("Dev1", "Vibration"), ("Dev2", "Strain")] {
            let index = table.slots.len();
            table.slots.push(Slot {
                index,
                title: format!("Slot {}: {} ({})", index + 1, name, label),
                device_name: name.into(),
                effective_rate_hz: 1000.0,
                mode: SlotMode::Time,
                declared_channels: 0,
            });
            table.by_name.insert(name.into(), index);
        }
        table
    }

    pub fn from_config(config: &SystemConfig, path: &Path) -> Result<Self, ConfigError> {
        let table = Self::from_metadata(&config.slot_metadata());
        if table.is_empty() {
            return Err(ConfigError::NoActiveSlots {
                path: path.to_path_buf(),
            });
        }
        Ok(table)
    }

    /// Degraded mode: any configuration problem yields the fallback table.
    pub fn load_or_fallback(path: &Path) -> Self {
        let loaded = SystemConfig::load(path).and_then(|config| {
            info!("loading config: {}", config.system_name);
            Self::from_config(&config, path)
        });
        match loaded {
            Ok(table) => {
                info!("configured {} slots", table.len());
                table
            }
            Err(e) => {
                warn!("{e}; using fallback slots Dev1/Dev2");
                Self::fallback()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn lookup(&self, device_name: &str) -> Option<usize> {
        self.by_name.get(device_name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }
}

/// Path of the settings file when none is given on the command line.
pub fn default_settings_path() -> PathBuf {
    PathBuf::from("DAQ_Settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, rate: f64, avg: u32, fft: bool) -> SlotMetadata {
        SlotMetadata {
            device_name: name.into(),
            base_sample_rate_hz: rate,
            averaging_window: avg,
            fft_enabled: fft,
            channel_range: None,
        }
    }

    #[test]
    fn merges_declarations_for_same_device() {
        let table = SlotTable::from_metadata(&[
            meta("Dev_AI217", 1000.0, 10, false),
            meta("Dev_AI208", 500.0, 1, false),
            meta("Dev_AI217", 1000.0, 2, true),
        ]);
        assert_eq!(table.len(), 2);
        let slot = table.get(0).unwrap();
        assert_eq!(slot.device_name, "Dev_AI217");
        assert_eq!(slot.effective_rate_hz, 500.0);
        assert_eq!(slot.mode, SlotMode::Fft);
        assert_eq!(slot.title, "Slot 1: Dev_AI217");
        assert_eq!(table.lookup("Dev_AI208"), Some(1));
        assert_eq!(table.get(1).unwrap().mode, SlotMode::Time);
    }

    #[test]
    fn parses_settings_file_and_skips_inactive_entries() {
        let json = r#"{
            "system_name": "Bench",
            "tasks": [
                { "task_name": "t1", "active": true, "sample_rate": 2000.0,
                  "channels": [
                    { "device_name": "Dev_AI217", "channel_range": "ai0:3",
                      "moving_avg": { "active": true, "window_size": 4 } },
                    { "device_name": "Dev_Off", "active": false }
                  ] },
                { "task_name": "t2", "active": false, "sample_rate": 9000.0,
                  "channels": [ { "device_name": "Dev_AI217" } ] },
                { "task_name": "t3", "active": true,
                  "channels": [
                    { "device_name": "Dev_AI208", "channel_range": "ai0:1",
                      "fft": { "active": true, "points": 1024 },
                      "hardware_config": { "ai208_gain": 2 } } ] }
            ]
        }"#;
        let path = Path::new("DAQ_Settings.json");
        let config = SystemConfig::parse(json, path).unwrap();
        let table = SlotTable::from_config(&config, path).unwrap();
        assert_eq!(table.len(), 2);
        let ai217 = table.get(0).unwrap();
        assert_eq!(ai217.effective_rate_hz, 500.0);
        assert_eq!(ai217.declared_channels, 4);
        let ai208 = table.get(1).unwrap();
        assert_eq!(ai208.effective_rate_hz, 1000.0);
        assert_eq!(ai208.mode, SlotMode::Fft);
        assert_eq!(ai208.declared_channels, 2);
        assert_eq!(table.lookup("Dev_Off"), None);
    }

    #[test]
    fn missing_file_falls_back() {
        let table = SlotTable::load_or_fallback(Path::new("/nonexistent/dir/DAQ_Settings.json"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("Dev1"), Some(0));
        assert_eq!(table.lookup("Dev2"), Some(1));
        assert!(table.iter().all(|s| s.effective_rate_hz == 1000.0 && s.is_time_domain()));
    }

    #[test]
    fn unreadable_or_empty_config_is_an_error() {
        let path = Path::new("x.json");
        assert!(matches!(
            SystemConfig::parse("{ not json", path),
            Err(ConfigError::Parse { .. })
        ));
        let empty = SystemConfig::parse("{}", path).unwrap();
        assert!(matches!(
            SlotTable::from_config(&empty, path),
            Err(ConfigError::NoActiveSlots { .. })
        ));
    }

    #[test]
    fn non_positive_rates_are_skipped() {
        let table = SlotTable::from_metadata(&[meta("Bad", 0.0, 1, false), meta("Good", 10.0, 1, false)]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).unwrap().index, 0);
    }

    #[test]
    fn channel_ranges() {
        assert_eq!(channels_in_range("ai0:3"), 4);
        assert_eq!(channels_in_range("ai2"), 3);
        assert_eq!(channels_in_range("bogus"), 0);
        assert_eq!(channels_in_range("ai0:18446744073709551615"), usize::MAX);
        assert_eq!(channels_in_range("ai18446744073709551615"), usize::MAX);
    }

    #[test]
    fn capacity_covers_retention_plus_margin() {
        let mut slot = SlotTable::fallback().get(0).cloned().unwrap();
        assert_eq!(slot.buffer_capacity(20.0, 500), 20_500);
        slot.effective_rate_hz = 1e300;
        assert_eq!(slot.buffer_capacity(20.0, 500), usize::MAX);
    }

    #[test]
    fn extreme_settings_values_do_not_panic() {
        let json = r#"{
            "tasks": [
                { "active": true, "sample_rate": 1e300,
                  "channels": [ { "device_name": "Dev_Fast" } ] },
                { "active": true, "sample_rate": 1000.0,
                  "channels": [ { "device_name": "Dev_Wide",
                                  "channel_range": "ai0:18446744073709551615" } ] }
            ]
        }"#;
        let path = Path::new("DAQ_Settings.json");
        let config = SystemConfig::parse(json, path).unwrap();
        let table = SlotTable::from_config(&config, path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("Dev_Fast"), None);
        assert_eq!(table.get(0).unwrap().declared_channels, usize::MAX);

        let channels = crate::drivers::ChannelTable::new(&table, 20.0, 500, 64);
        assert_eq!(channels.channels(0).len(), 64);
        assert_eq!(channels.capacity(0), Some(20_500));

        let only_fast = SystemConfig::parse(
            r#"{ "tasks": [ { "active": true, "sample_rate": 1e300,
                              "channels": [ { "device_name": "Dev_Fast" } ] } ] }"#,
            path,
        )
        .unwrap();
        assert!(matches!(
            SlotTable::from_config(&only_fast, path),
            Err(ConfigError::NoActiveSlots { .. })
        ));
    }
}
