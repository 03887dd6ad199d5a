use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread;

use clap::Parser;
use packet_loss_recorder::cli::Cli;
use packet_loss_recorder::presentation::{
    self, SinkMessage, format_loss_event, format_statistics_line, format_summary,
};
use packet_loss_recorder::shutdown::shutdown_channel;
use packet_loss_recorder::{Monitor, ProbeSource};
use tokio::signal;

/// Print one statistics line per this many snapshots.
const STATISTICS_EVERY: u64 = 10;

fn print_messages(receiver: Receiver<SinkMessage>) {
    let mut snapshots = 0u64;
    for message in receiver {
        match message {
            SinkMessage::Log(line) => println!("{}", line.display()),
            SinkMessage::Loss(event) => println!("{}", format_loss_event(&event)),
            SinkMessage::Statistics(snapshot) => {
                snapshots += 1;
                if snapshots % STATISTICS_EVERY == 0 {
                    println!("{}", format_statistics_line(&snapshot));
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.resolve_config();

    let source = match ProbeSource::new(&config).await {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}", e.report());
            return ExitCode::FAILURE;
        }
    };

    let (sink, receiver) = presentation::channel();
    let printer = thread::spawn(move || print_messages(receiver));
    let monitor = Monitor::new(source, Arc::new(sink), &config).stop_on_probe_failure(true);

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => trigger.trigger(),
            Err(e) => {
                log::warn!("cannot listen for Ctrl-C: {e}");
                // Keep the trigger alive; dropping it would stop the run.
                std::future::pending::<()>().await;
            }
        }
    });

    let result = monitor.run(shutdown).await;
    let summary = format_summary(&monitor.statistics());
    // Last sender gone, so the printer drains what is left and returns.
    drop(monitor);
    if printer.join().is_err() {
        log::error!("printer thread panicked");
    }

    match result {
        Ok(()) => {
            println!("{summary}");
            println!("Exiting...");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e.report());
            ExitCode::FAILURE
        }
    }
}
