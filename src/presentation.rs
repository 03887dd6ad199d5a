//! Where log lines, loss transitions and statistics end up.
//!
//! Producers only see [`PresentationSink`]. The shipped implementation,
//! [`ChannelSink`], forwards everything over one channel to a single consumer
//! (the window or the console printer), so appends never interleave and arrive
//! in the order they were accepted.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat, TimeZone};

use crate::line_tone::LineTone;
use crate::loss_tracker::LossTransitionEvent;
use crate::statistics::StatisticsSnapshot;

/// Lines kept per scrolling panel.
pub const MAX_PANEL_LINES: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub text: String,
    pub tone: LineTone,
}

impl LogLine {
    pub fn new(text: impl Into<String>, tone: LineTone) -> Self {
        Self {
            at: Local::now(),
            text: text.into(),
            tone,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, LineTone::Normal)
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self::new(text, LineTone::Red)
    }

    pub fn display(&self) -> String {
        format!("{}: {}", format_timestamp(self.at), self.text)
    }
}

pub trait PresentationSink: Send + Sync {
    fn append_log_line(&self, line: LogLine);
    fn append_loss_event(&self, event: LossTransitionEvent);
    /// Replaces the previously shown statistics.
    fn update_statistics(&self, snapshot: StatisticsSnapshot);
}

#[derive(Debug, Clone)]
pub enum SinkMessage {
    Log(LogLine),
    Loss(LossTransitionEvent),
    Statistics(StatisticsSnapshot),
}

#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<SinkMessage>,
}

/// Creates a sink and the receiver its single consumer drains.
pub fn channel() -> (ChannelSink, Receiver<SinkMessage>) {
    let (sender, receiver) = mpsc::channel();
    (ChannelSink { sender }, receiver)
}

impl ChannelSink {
    fn send(&self, message: SinkMessage) {
        // The consumer is gone only once the display has shut down.
        let _ = self.sender.send(message);
    }
}

impl PresentationSink for ChannelSink {
    fn append_log_line(&self, line: LogLine) {
        self.send(SinkMessage::Log(line));
    }

    fn append_loss_event(&self, event: LossTransitionEvent) {
        self.send(SinkMessage::Loss(event));
    }

    fn update_statistics(&self, snapshot: StatisticsSnapshot) {
        self.send(SinkMessage::Statistics(snapshot));
    }
}

/// Display state of the window: two scrolling panels and the latest statistics.
#[derive(Debug, Default)]
pub struct PanelBuffers {
    pub log: VecDeque<LogLine>,
    pub loss: VecDeque<LossTransitionEvent>,
    pub statistics: Option<StatisticsSnapshot>,
}

impl PanelBuffers {
    pub fn apply(&mut self, message: SinkMessage) {
        match message {
            SinkMessage::Log(line) => push_bounded(&mut self.log, line),
            SinkMessage::Loss(event) => push_bounded(&mut self.loss, event),
            SinkMessage::Statistics(snapshot) => self.statistics = Some(snapshot),
        }
    }

    /// Applies everything queued so far without blocking. Returns whether
    /// anything changed.
    pub fn drain(&mut self, receiver: &Receiver<SinkMessage>) -> bool {
        let mut changed = false;
        for message in receiver.try_iter() {
            self.apply(message);
            changed = true;
        }
        changed
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T) {
    buffer.push_back(item);
    while buffer.len() > MAX_PANEL_LINES {
        buffer.pop_front();
    }
}

pub fn format_timestamp<Tz: TimeZone>(at: DateTime<Tz>) -> String {
    at.with_timezone(&Local)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

pub fn format_rtt(rtt: Duration) -> String {
    format!("{:.3} ms", rtt.as_secs_f64() * 1000.0)
}

pub fn loss_event_tone(event: &LossTransitionEvent) -> LineTone {
    match event {
        LossTransitionEvent::EnteredLoss { .. } => LineTone::Red,
        LossTransitionEvent::RecoveredFromLoss { .. } => LineTone::Green,
    }
}

pub fn format_loss_event(event: &LossTransitionEvent) -> String {
    match *event {
        LossTransitionEvent::EnteredLoss { at } => {
            format!("{}: Packet loss detected!", format_timestamp(at))
        }
        LossTransitionEvent::RecoveredFromLoss {
            at,
            started_at,
            loss_window_ticks,
        } => {
            let down_for = (at - started_at).num_seconds();
            format!(
                "{}: Recovered after {}s of loss ({} loss-window ticks).",
                format_timestamp(at),
                down_for,
                loss_window_ticks
            )
        }
    }
}

pub fn format_statistics(snapshot: &StatisticsSnapshot) -> String {
    format!(
        "{} ({})\nTransmitted: {}\nReceived: {}\nPacket Loss: {:.1}%\nMin RTT: {}\nAvg RTT: {}\nMax RTT: {}\nStdDev RTT: {}",
        snapshot.addr,
        snapshot.target,
        snapshot.packets_sent,
        snapshot.packets_received,
        snapshot.packet_loss,
        format_rtt(snapshot.min_rtt),
        format_rtt(snapshot.avg_rtt),
        format_rtt(snapshot.max_rtt),
        format_rtt(snapshot.stddev_rtt),
    )
}

/// One-line statistics for the console.
pub fn format_statistics_line(snapshot: &StatisticsSnapshot) -> String {
    format!(
        "{} sent, {} received, {:.1}% loss, rtt min/avg/max = {:.3}/{:.3}/{:.3} ms",
        snapshot.packets_sent,
        snapshot.packets_received,
        snapshot.packet_loss,
        snapshot.min_rtt.as_secs_f64() * 1000.0,
        snapshot.avg_rtt.as_secs_f64() * 1000.0,
        snapshot.max_rtt.as_secs_f64() * 1000.0,
    )
}

/// Closing summary in the style of `ping`.
pub fn format_summary(snapshot: &StatisticsSnapshot) -> String {
    let mut summary = format!(
        "--- {} ping statistics ---\n{} packets transmitted, {} packets received, {:.2}% packet loss",
        snapshot.target,
        snapshot.packets_sent,
        snapshot.packets_received,
        snapshot.packet_loss
    );
    if snapshot.packets_received > 0 {
        summary.push_str(&format!(
            "\nround-trip min/avg/max/stddev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            snapshot.min_rtt.as_secs_f64() * 1000.0,
            snapshot.avg_rtt.as_secs_f64() * 1000.0,
            snapshot.max_rtt.as_secs_f64() * 1000.0,
            snapshot.stddev_rtt.as_secs_f64() * 1000.0,
        ));
    }
    summary
}
