pub mod cli;
pub mod config;
pub mod error;
pub mod line_tone;
pub mod loss_tracker;
pub mod monitor;
pub mod presentation;
pub mod probe;
pub mod shutdown;
pub mod statistics;

use std::sync::mpsc::Receiver;
use std::time::Duration;

use eframe::egui;
use egui::{Color32, RichText};

use crate::presentation::{
    PanelBuffers, SinkMessage, format_loss_event, format_statistics, loss_event_tone,
};
use crate::shutdown::Shutdown;

pub use crate::config::AppConfig;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::loss_tracker::{LossState, LossTracker, LossTransitionEvent, SharedLossTracker};
pub use crate::monitor::Monitor;
pub use crate::probe::{Probe, ProbeHandler, ProbeOutcome, ProbeSource};
pub use crate::statistics::StatisticsSnapshot;

/// Window showing statistics and loss windows side by side over the ping log.
pub struct PacketLossRecorderApp {
    receiver: Receiver<SinkMessage>,
    panels: PanelBuffers,
    shutdown: Shutdown,
}

impl PacketLossRecorderApp {
    pub fn new(receiver: Receiver<SinkMessage>, shutdown: Shutdown) -> Self {
        Self {
            receiver,
            panels: PanelBuffers::default(),
            shutdown,
        }
    }

    fn draw_statistics(&self, ui: &mut egui::Ui) {
        ui.heading("Ping Statistics");
        ui.separator();
        match &self.panels.statistics {
            Some(snapshot) => {
                ui.monospace(format_statistics(snapshot));
            }
            None => {
                ui.label("Waiting for replies...");
            }
        }
    }

    fn draw_loss_details(&self, ui: &mut egui::Ui) {
        ui.heading("Packet Loss Details");
        ui.separator();
        egui::ScrollArea::vertical()
            .id_salt("loss_details")
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for event in &self.panels.loss {
                    ui.label(
                        RichText::new(format_loss_event(event))
                            .color(loss_event_tone(event).to_color32()),
                    );
                }
            });
    }

    fn draw_log(&self, ui: &mut egui::Ui) {
        ui.heading("Ping Log");
        ui.separator();
        egui::ScrollArea::vertical()
            .id_salt("ping_log")
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for line in &self.panels.log {
                    ui.label(
                        RichText::new(line.display())
                            .monospace()
                            .color(line.tone.to_color32()),
                    );
                }
            });
    }
}

impl eframe::App for PacketLossRecorderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.panels.drain(&self.receiver);

        if self.shutdown.is_triggered() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        let top_height = ctx.screen_rect().height() / 2.0;
        egui::TopBottomPanel::top("summary")
            .resizable(false)
            .exact_height(top_height)
            .show(ctx, |ui| {
                ui.columns(2, |columns| {
                    self.draw_statistics(&mut columns[0]);
                    self.draw_loss_details(&mut columns[1]);
                });
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::central_panel(&ctx.style()).fill(Color32::from_gray(20)))
            .show(ctx, |ui| {
                self.draw_log(ui);
            });

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
