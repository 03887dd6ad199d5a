//! Runs the probe loop, the loss poll and the statistics reporter side by side.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::line_tone::LineTone;
use crate::loss_tracker::{POLL_INTERVAL, SharedLossTracker};
use crate::presentation::{LogLine, PresentationSink, format_rtt};
use crate::probe::{Probe, ProbeHandler, ProbeOutcome, ProbeSource};
use crate::shutdown::Shutdown;
use crate::statistics::StatisticsSnapshot;

pub const STATISTICS_INTERVAL: Duration = Duration::from_secs(1);

/// Turns probe callbacks into log lines and liveness updates.
struct RecorderHandler {
    tracker: Arc<SharedLossTracker>,
    sink: Arc<dyn PresentationSink>,
    green_threshold: u64,
    yellow_threshold: u64,
}

impl ProbeHandler for RecorderHandler {
    fn on_send(&self, packet: &ProbeOutcome) {
        if self.tracker.in_loss() {
            self.sink.append_log_line(LogLine::alert(format!(
                "Packet sent: icmp_seq={} to {}",
                packet.seq, packet.addr
            )));
        }
    }

    fn on_receive(&self, packet: &ProbeOutcome) {
        let rtt = packet.rtt.unwrap_or_default();
        let tone = LineTone::from_ping_response(
            Some(rtt.as_secs_f64() * 1000.0),
            self.green_threshold,
            self.yellow_threshold,
        );
        let mut text = format!(
            "{} bytes from {}: icmp_seq={} time={}",
            packet.bytes,
            packet.addr,
            packet.seq,
            format_rtt(rtt)
        );
        if let Some(ttl) = packet.ttl {
            text.push_str(&format!(" ttl={ttl}"));
        }
        self.sink.append_log_line(LogLine::new(text, tone));
        self.tracker.packet_received_now();
    }

    fn on_send_error(&self, _packet: &ProbeOutcome, error: &Error) {
        self.sink.append_log_line(LogLine::alert(error.report()));
    }

    fn on_finish(&self, statistics: &StatisticsSnapshot) {
        self.sink.update_statistics(statistics.clone());
    }
}

/// Checks liveness every [`POLL_INTERVAL`], starting one interval after launch.
pub async fn poll_loss<F>(tracker: Arc<SharedLossTracker>, clock: F, mut shutdown: Shutdown)
where
    F: Fn() -> DateTime<Utc>,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            _ = ticker.tick() => tracker.poll_tick(clock()),
        }
    }
}

/// Forwards a statistics snapshot to the sink every [`STATISTICS_INTERVAL`].
pub async fn report_statistics<P: Probe>(
    source: Arc<P>,
    sink: Arc<dyn PresentationSink>,
    mut shutdown: Shutdown,
) {
    let mut ticker = tokio::time::interval(STATISTICS_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            _ = ticker.tick() => sink.update_statistics(source.statistics()),
        }
    }
}

pub struct Monitor<P: Probe = ProbeSource> {
    source: Arc<P>,
    tracker: Arc<SharedLossTracker>,
    sink: Arc<dyn PresentationSink>,
    green_threshold: u64,
    yellow_threshold: u64,
    stop_on_probe_failure: bool,
}

impl<P: Probe> Monitor<P> {
    pub fn new(source: P, sink: Arc<dyn PresentationSink>, config: &AppConfig) -> Self {
        Self {
            source: Arc::new(source),
            tracker: Arc::new(SharedLossTracker::new(Utc::now(), Arc::clone(&sink))),
            sink,
            green_threshold: config.green_threshold,
            yellow_threshold: config.yellow_threshold,
            stop_on_probe_failure: false,
        }
    }

    /// Return as soon as the probe loop fails instead of waiting for shutdown.
    pub fn stop_on_probe_failure(mut self, stop: bool) -> Self {
        self.stop_on_probe_failure = stop;
        self
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.source.statistics()
    }

    /// Runs until `shutdown` fires. A failing probe loop is reported to the
    /// sink; it ends the run only with [`Monitor::stop_on_probe_failure`].
    pub async fn run(&self, mut shutdown: Shutdown) -> Result<()> {
        self.sink.append_log_line(LogLine::plain(format!(
            "PING {} ({})",
            self.source.target(),
            self.source.addr()
        )));

        let poller = tokio::spawn(poll_loss(
            Arc::clone(&self.tracker),
            Utc::now,
            shutdown.clone(),
        ));
        let reporter = tokio::spawn(report_statistics(
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            shutdown.clone(),
        ));

        let handler: Arc<dyn ProbeHandler> = Arc::new(RecorderHandler {
            tracker: Arc::clone(&self.tracker),
            sink: Arc::clone(&self.sink),
            green_threshold: self.green_threshold,
            yellow_threshold: self.yellow_threshold,
        });

        if let Err(e) = self.source.run(handler, shutdown.clone()).await {
            log::error!("ping failed: {e}");
            self.sink
                .append_log_line(LogLine::alert(format!("Ping error: {e}")));
            if self.stop_on_probe_failure {
                poller.abort();
                reporter.abort();
                let _ = poller.await;
                let _ = reporter.await;
                return Err(e);
            }
            shutdown.wait().await;
        }

        // Both loops exit on the same signal; a join error only means a panic
        // that has already been reported.
        let _ = poller.await;
        let _ = reporter.await;
        Ok(())
    }
}
