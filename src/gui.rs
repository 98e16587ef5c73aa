// src/gui.rs
use crate::config::TimeWindow;
use crate::renderer::FrameReceiver;
use crate::slots::SlotTable;
use crate::types::*;
use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotPoints};
use std::sync::mpsc::Sender;
use std::time::Duration;

const CHANNEL_COLORS: [Color32; 8] = [
    Color32::from_rgb(0, 255, 255),
    Color32::YELLOW,
    Color32::from_rgb(255, 0, 255),
    Color32::from_rgb(120, 220, 90),
    Color32::from_rgb(255, 140, 0),
    Color32::from_rgb(100, 150, 255),
    Color32::from_rgb(255, 90, 90),
    Color32::LIGHT_GRAY,
];

pub struct MonitorApp {
    slots: SlotTable,
    frames: FrameReceiver,
    tx_cmd: Sender<MonitorCommand>,
    // 当前选中的窗口 (按下即更新，调度器下一帧生效)
    window: TimeWindow,
    latest: RenderFrame,
    repaint_every: Duration,
}

impl MonitorApp {
    pub fn new(
        slots: SlotTable,
        frames: FrameReceiver,
        tx_cmd: Sender<MonitorCommand>,
        window: TimeWindow,
        max_fps: f64,
    ) -> Self {
        Self {
            slots,
            frames,
            tx_cmd,
            window,
            latest: RenderFrame::default(),
            repaint_every: Duration::from_secs_f64(1.0 / max_fps.max(1.0)),
        }
    }

    fn window_buttons(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Window:");
            for window in TimeWindow::ALL {
                if ui.selectable_label(self.window == window, window.label()).clicked()
                    && self.window != window
                {
                    self.window = window;
                    // 调度器已退出时发送会失败，忽略即可
                    self.tx_cmd.send(MonitorCommand::SetTimeWindow(window)).ok();
                }
            }
        });
    }

    fn stats_line(&self, ui: &mut egui::Ui) {
        if self.frames.is_closed() {
            ui.label(
                egui::RichText::new("Pipeline stopped: the UDP listener or scheduler exited, see the log.")
                    .strong()
                    .color(Color32::RED),
            );
        }
        let s = &self.latest.stats;
        ui.label(
            egui::RichText::new(format!(
                "tick {} | {} datagrams ({} text / {} binary) | {} failed | {} dropped | {} overruns",
                self.latest.tick,
                s.datagrams_received,
                s.text_datagrams,
                s.binary_datagrams,
                s.datagrams_failed(),
                s.intake_dropped,
                s.tick_overruns,
            ))
            .small()
            .color(Color32::GRAY),
        );
    }
}

impl eframe::App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. 取最新一帧
        if let Some(frame) = self.frames.latest() {
            self.latest = frame;
        }

        // 2. UI 绘制
        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.add_space(4.0);
            self.window_buttons(ui);
            self.stats_line(ui);
            ui.add_space(4.0);
        });

        let width = self.latest.window.seconds();
        let plot_height = (ctx.available_rect().height() / self.slots.len().max(1) as f32 - 30.0).max(120.0);
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                for slot in self.slots.iter() {
                    if !slot.is_time_domain() {
                        ui.heading(format!("{} [FFT]", slot.title));
                        ui.label("Spectrum slots are not plotted.");
                        ui.separator();
                        continue;
                    }
                    ui.heading(format!("{} ({:.0} Hz)", slot.title, slot.effective_rate_hz));
                    Plot::new(("slot_plot", slot.index))
                        .height(plot_height)
                        .legend(Legend::default())
                        .allow_drag(false)
                        .allow_zoom(false)
                        .allow_scroll(false)
                        .include_x(-width)
                        .include_x(0.0)
                        .show(ui, |plot_ui| {
                            for s in self.latest.slot_series(slot.index) {
                                let col = CHANNEL_COLORS[s.channel_index % CHANNEL_COLORS.len()];
                                plot_ui.line(
                                    Line::new(PlotPoints::new(s.series.points()))
                                        .name(format!("Ch{}", s.channel_index))
                                        .color(col),
                                );
                            }
                        });
                    ui.separator();
                }
            });
        });

        ctx.request_repaint_after(self.repaint_every);
    }
}
