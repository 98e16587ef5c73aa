// src/main.rs
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use daq_monitor::config::{MonitorSettings, TimeWindow, WireFormat};
use daq_monitor::drivers::{intake_queue, IntakeReceiver, MonitorError};
use daq_monitor::engine::{self, FrameScheduler};
use daq_monitor::ingest::IngestWorker;
use daq_monitor::renderer::LogRenderer;
use daq_monitor::slots::{default_settings_path, SlotTable};
use daq_monitor::types::{MonitorCommand, PipelineStats};
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// Real-time monitor for UDP sensor streams.
#[derive(Parser, Debug)]
#[command(name = "daq-monitor", version, about)]
struct Args {
    /// Slot metadata file (also looked up in the parent directory).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Local UDP address to listen on [default: 0.0.0.0:5005].
    #[arg(short, long)]
    bind: Option<SocketAddr>,
    /// Wire format of incoming datagrams.
    #[arg(long, value_enum)]
    format: Option<WireFormat>,
    /// Initial time window: 10ms, 100ms, 500ms, 1S, 5S or 10S.
    #[arg(short, long, default_value = "1S")]
    window: TimeWindow,
    /// Frame rate cap [default: 30].
    #[arg(long)]
    fps: Option<f64>,
    /// Max points per channel per frame [default: 20000].
    #[arg(long)]
    max_points: Option<usize>,
    /// Seconds of history kept per channel [default: 20].
    #[arg(long)]
    retention: Option<f64>,
    /// Intake queue capacity in datagrams [default: 4096].
    #[arg(long)]
    intake_capacity: Option<usize>,
    /// Datagrams decoded per frame at most [default: 100].
    #[arg(long)]
    drain: Option<usize>,
    /// Run without a window, logging frames instead.
    #[arg(long)]
    headless: bool,
    /// Stop after this many seconds (headless only).
    #[arg(long)]
    run_for: Option<f64>,
}

impl Args {
    fn settings(&self) -> MonitorSettings {
        let mut s = MonitorSettings::default();
        if let Some(addr) = self.bind {
            s.bind_addr = addr;
        }
        if let Some(format) = self.format {
            s.wire_format = format;
        }
        if let Some(fps) = self.fps {
            s.max_fps = fps;
        }
        if let Some(points) = self.max_points {
            s.max_display_points = points;
        }
        if let Some(secs) = self.retention {
            s.retention_secs = secs;
        }
        if let Some(cap) = self.intake_capacity {
            s.intake_capacity = cap;
        }
        if let Some(drain) = self.drain {
            s.max_datagrams_per_tick = drain;
        }
        s
    }
}

// 组装好但尚未运行的管线
struct Pipeline {
    settings: MonitorSettings,
    slots: SlotTable,
    window: TimeWindow,
    intake: IntakeReceiver,
    worker: IngestWorker,
    tx_cmd: Sender<MonitorCommand>,
    rx_cmd: Receiver<MonitorCommand>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = args.settings();
    settings.validate()?;

    // 1. 槽位表 (配置缺失时使用默认 Dev1/Dev2)
    let config_path = args.config.clone().unwrap_or_else(default_settings_path);
    let slots = SlotTable::load_or_fallback(&config_path);
    for slot in slots.iter() {
        info!(
            "{} -> {:.1} Hz, {:?}, {} declared channels",
            slot.title, slot.effective_rate_hz, slot.mode, slot.declared_channels
        );
    }

    // 2. 接收线程
    let (intake_tx, intake) = intake_queue(settings.intake_capacity);
    let worker = IngestWorker::bind(settings.bind_addr, settings.recv_buffer_bytes, intake_tx)
        .with_context(|| format!("failed to listen on {}", settings.bind_addr))?;

    let (tx_cmd, rx_cmd) = channel();
    let pipeline = Pipeline {
        settings,
        slots,
        window: args.window,
        intake,
        worker,
        tx_cmd,
        rx_cmd,
    };
    if args.headless {
        run_headless(pipeline, args.run_for)
    } else {
        run_ui(pipeline)
    }
}

fn run_headless(p: Pipeline, run_for: Option<f64>) -> Result<()> {
    // 每秒打印一次帧概况
    let every = p.settings.max_fps.ceil().max(1.0) as u64;
    let renderer = LogRenderer::new(p.slots.clone(), every);
    let scheduler =
        FrameScheduler::new(p.settings, p.slots, p.intake, renderer, p.rx_cmd).with_window(p.window);
    let handle = engine::spawn_thread(scheduler).context("failed to start scheduler thread")?;

    let deadline = run_for.map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    while !handle.is_finished() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            p.tx_cmd.send(MonitorCommand::Shutdown).ok();
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    let outcome = handle
        .join()
        .map_err(|_| anyhow!("scheduler thread panicked"))?;
    finish(outcome, p.worker)
}

#[cfg(feature = "gui")]
fn run_ui(p: Pipeline) -> Result<()> {
    use daq_monitor::gui::MonitorApp;
    use daq_monitor::renderer::frame_channel;
    use eframe::egui;

    let (renderer, frames) = frame_channel();
    let max_fps = p.settings.max_fps;
    let app_slots = p.slots.clone();
    let app_tx = p.tx_cmd.clone();
    let window = p.window;
    let scheduler =
        FrameScheduler::new(p.settings, p.slots, p.intake, renderer, p.rx_cmd).with_window(window);
    let handle = engine::spawn_thread(scheduler).context("failed to start scheduler thread")?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([640.0, 480.0])
            .with_title("DAQ Monitor"),
        ..Default::default()
    };
    let ui_result = eframe::run_native(
        "DAQ Monitor",
        options,
        Box::new(move |_cc| Box::new(MonitorApp::new(app_slots, frames, app_tx, window, max_fps))),
    );

    // 窗口关闭后停止调度器
    p.tx_cmd.send(MonitorCommand::Shutdown).ok();
    let outcome = handle
        .join()
        .map_err(|_| anyhow!("scheduler thread panicked"))?;
    ui_result.map_err(|e| anyhow!("UI failed: {e}"))?;
    finish(outcome, p.worker)
}

#[cfg(not(feature = "gui"))]
fn run_ui(p: Pipeline) -> Result<()> {
    log::warn!("built without the `gui` feature, running headless");
    run_headless(p, None)
}

fn finish(outcome: Result<PipelineStats, MonitorError>, worker: IngestWorker) -> Result<()> {
    // 接收线程的 socket 错误优先于调度器的 IntakeClosed
    let report = worker.shutdown().context("ingest worker failed")?;
    let stats = outcome.context("scheduler stopped")?;
    info!(
        "shutdown: {} datagrams received, {} decoded, {} failed, {} dropped at intake, {} samples",
        report.datagrams,
        stats.datagrams_decoded,
        stats.datagrams_failed(),
        report.dropped,
        stats.samples_appended
    );
    Ok(())
}
