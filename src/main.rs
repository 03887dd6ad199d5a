#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::process;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use eframe::egui;
use egui::IconData;
use packet_loss_recorder::cli::Cli;
use packet_loss_recorder::presentation;
use packet_loss_recorder::shutdown::shutdown_channel;
use packet_loss_recorder::{Monitor, PacketLossRecorderApp, Probe, ProbeSource};
use tokio::signal;

fn main() -> eframe::Result {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.resolve_config();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            process::exit(1);
        }
    };
    let source = match runtime.block_on(ProbeSource::new(&config)) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}", e.report());
            process::exit(1);
        }
    };
    let title = format!("Packet Loss Recorder - {} ({})", source.target(), source.addr());

    let (sink, receiver) = presentation::channel();
    let (trigger, shutdown) = shutdown_channel();
    let trigger = Arc::new(trigger);
    let monitor = Monitor::new(source, Arc::new(sink), &config);

    let worker = {
        let trigger = Arc::clone(&trigger);
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            runtime.block_on(async move {
                tokio::spawn(async move {
                    match signal::ctrl_c().await {
                        Ok(()) => trigger.trigger(),
                        Err(e) => log::warn!("cannot listen for Ctrl-C: {e}"),
                    }
                });
                // Probe failures are already on screen; the window stays up.
                let _ = monitor.run(shutdown).await;
            });
        })
    };

    let app = PacketLossRecorderApp::new(receiver, shutdown);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 600.0])
            .with_min_inner_size([600.0, 400.0])
            .with_icon(IconData::default()),
        ..Default::default()
    };
    let result = eframe::run_native(&title, options, Box::new(move |_cc| Ok(Box::new(app))));

    trigger.trigger();
    if worker.join().is_err() {
        log::error!("monitor thread panicked");
    }
    println!("Exiting...");
    result
}
