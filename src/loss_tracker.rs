//! Classifies time into connected and packet-loss windows.
//!
//! [`LossTracker`] is the pure state machine: it is fed reply timestamps and
//! periodic poll ticks and returns a [`LossTransitionEvent`] whenever the
//! connection flips between up and down. [`SharedLossTracker`] puts it behind a
//! single mutex so the probe loop and the poll task can both drive it, and
//! forwards every transition to a [`PresentationSink`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::presentation::PresentationSink;

/// Time without a reply after which the connection counts as lossy.
pub const LOSS_THRESHOLD: Duration = Duration::from_secs(3);

/// How often the liveness check runs, independent of the probe interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossTransitionKind {
    EnteredLoss,
    RecoveredFromLoss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossTransitionEvent {
    EnteredLoss {
        at: DateTime<Utc>,
    },
    RecoveredFromLoss {
        at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        /// Poll ticks observed while down. This approximates, but is not, the
        /// number of lost probes.
        loss_window_ticks: u64,
    },
}

impl LossTransitionEvent {
    pub fn kind(&self) -> LossTransitionKind {
        match self {
            LossTransitionEvent::EnteredLoss { .. } => LossTransitionKind::EnteredLoss,
            LossTransitionEvent::RecoveredFromLoss { .. } => LossTransitionKind::RecoveredFromLoss,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match *self {
            LossTransitionEvent::EnteredLoss { at } => at,
            LossTransitionEvent::RecoveredFromLoss { at, .. } => at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossState {
    pub in_loss_state: bool,
    pub time_last_success: DateTime<Utc>,
    pub loss_start_time: DateTime<Utc>,
    pub loss_window_ticks: u64,
}

#[derive(Debug, Clone)]
pub struct LossTracker {
    state: LossState,
}

impl LossTracker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: LossState {
                in_loss_state: false,
                time_last_success: now,
                loss_start_time: now,
                loss_window_ticks: 0,
            },
        }
    }

    pub fn state(&self) -> &LossState {
        &self.state
    }

    pub fn in_loss(&self) -> bool {
        self.state.in_loss_state
    }

    /// Records a reply. This is the only way out of a loss window.
    ///
    /// Replies may be reported out of order, so the last success never moves
    /// back and a recovery is never stamped before its window started.
    pub fn on_packet_received(&mut self, at: DateTime<Utc>) -> Option<LossTransitionEvent> {
        self.state.time_last_success = self.state.time_last_success.max(at);
        if !self.state.in_loss_state {
            return None;
        }

        let event = LossTransitionEvent::RecoveredFromLoss {
            at: at.max(self.state.loss_start_time),
            started_at: self.state.loss_start_time,
            loss_window_ticks: self.state.loss_window_ticks,
        };
        self.state.in_loss_state = false;
        self.state.loss_window_ticks = 0;
        Some(event)
    }

    /// Runs the liveness check. Only ever enters a loss window; a tick that
    /// finds the link quiet again leaves recovery to the next reply.
    pub fn on_poll_tick(
        &mut self,
        now: DateTime<Utc>,
        loss_threshold: Duration,
    ) -> Option<LossTransitionEvent> {
        // A negative delta means the clock stepped back; treat it as no time passed.
        let elapsed = (now - self.state.time_last_success)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed <= loss_threshold {
            return None;
        }

        let mut event = None;
        if !self.state.in_loss_state {
            self.state.in_loss_state = true;
            self.state.loss_start_time = now;
            self.state.loss_window_ticks = 0;
            event = Some(LossTransitionEvent::EnteredLoss { at: now });
        }
        self.state.loss_window_ticks += 1;
        event
    }
}

fn log_transition(event: Option<LossTransitionEvent>) {
    let Some(event) = event else {
        return;
    };
    match event.kind() {
        LossTransitionKind::EnteredLoss => {
            log::info!("packet loss detected at {}", event.timestamp())
        }
        LossTransitionKind::RecoveredFromLoss => {
            log::info!("recovered from packet loss at {}", event.timestamp())
        }
    }
}

/// A [`LossTracker`] shared between tasks.
///
/// Every call takes the lock once, runs one transition and hands the event to
/// the sink before releasing it, so transitions reach the sink in the order
/// they were decided. The sink must not block.
pub struct SharedLossTracker {
    tracker: Mutex<LossTracker>,
    sink: Arc<dyn PresentationSink>,
}

impl SharedLossTracker {
    pub fn new(now: DateTime<Utc>, sink: Arc<dyn PresentationSink>) -> Self {
        Self {
            tracker: Mutex::new(LossTracker::new(now)),
            sink,
        }
    }

    pub fn packet_received(&self, at: DateTime<Utc>) {
        let event = self.transition(|tracker| tracker.on_packet_received(at));
        log_transition(event);
    }

    /// Records a reply stamped with the wall clock read under the lock, so
    /// no poll tick can slip in between reading the time and applying it.
    pub fn packet_received_now(&self) {
        let event = self.transition(|tracker| tracker.on_packet_received(Utc::now()));
        log_transition(event);
    }

    pub fn poll_tick(&self, now: DateTime<Utc>) {
        let event = self.transition(|tracker| tracker.on_poll_tick(now, LOSS_THRESHOLD));
        log_transition(event);
    }

    fn transition(
        &self,
        step: impl FnOnce(&mut LossTracker) -> Option<LossTransitionEvent>,
    ) -> Option<LossTransitionEvent> {
        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        let event = step(&mut *tracker);
        if let Some(event) = event {
            self.sink.append_loss_event(event);
        }
        event
    }

    pub fn in_loss(&self) -> bool {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_loss()
    }

    pub fn snapshot(&self) -> LossState {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + TimeDelta::seconds(secs)
    }

    #[test]
    fn stays_up_while_replies_are_recent() {
        let mut tracker = LossTracker::new(t(0));
        for secs in [0, 1, 2, 3] {
            assert_eq!(tracker.on_poll_tick(t(secs), LOSS_THRESHOLD), None);
        }
        assert!(!tracker.in_loss());
        assert_eq!(tracker.state().loss_window_ticks, 0);
    }

    #[test]
    fn reference_scenario() {
        let mut tracker = LossTracker::new(t(0));
        assert_eq!(tracker.on_poll_tick(t(0), LOSS_THRESHOLD), None);
        assert_eq!(tracker.on_poll_tick(t(2), LOSS_THRESHOLD), None);
        assert_eq!(
            tracker.on_poll_tick(t(4), LOSS_THRESHOLD),
            Some(LossTransitionEvent::EnteredLoss { at: t(4) })
        );
        assert_eq!(tracker.state().loss_start_time, t(4));
        assert_eq!(tracker.on_poll_tick(t(6), LOSS_THRESHOLD), None);
        assert_eq!(tracker.state().loss_window_ticks, 2);

        assert_eq!(
            tracker.on_packet_received(t(7)),
            Some(LossTransitionEvent::RecoveredFromLoss {
                at: t(7),
                started_at: t(4),
                loss_window_ticks: 2,
            })
        );
        assert!(!tracker.in_loss());
        assert_eq!(tracker.state().loss_window_ticks, 0);
    }

    #[test]
    fn one_entered_event_per_loss_run() {
        let mut tracker = LossTracker::new(t(0));
        let events: Vec<_> = (2..=20)
            .step_by(2)
            .filter_map(|secs| tracker.on_poll_tick(t(secs), LOSS_THRESHOLD))
            .collect();
        assert_eq!(events, vec![LossTransitionEvent::EnteredLoss { at: t(4) }]);
        assert_eq!(tracker.state().loss_window_ticks, 9);
    }

    #[test]
    fn counter_resets_between_windows() {
        let mut tracker = LossTracker::new(t(0));
        tracker.on_poll_tick(t(4), LOSS_THRESHOLD);
        tracker.on_poll_tick(t(6), LOSS_THRESHOLD);
        tracker.on_poll_tick(t(8), LOSS_THRESHOLD);
        tracker.on_packet_received(t(9));

        assert_eq!(tracker.on_poll_tick(t(10), LOSS_THRESHOLD), None);
        assert!(tracker.on_poll_tick(t(14), LOSS_THRESHOLD).is_some());
        assert_eq!(tracker.state().loss_window_ticks, 1);
        match tracker.on_packet_received(t(15)) {
            Some(LossTransitionEvent::RecoveredFromLoss {
                loss_window_ticks, ..
            }) => assert_eq!(loss_window_ticks, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reply_while_up_only_moves_last_success() {
        let mut tracker = LossTracker::new(t(0));
        let before = tracker.state().clone();
        assert_eq!(tracker.on_packet_received(t(1)), None);
        assert_eq!(tracker.on_packet_received(t(2)), None);

        let after = tracker.state();
        assert_eq!(after.time_last_success, t(2));
        assert_eq!(after.in_loss_state, before.in_loss_state);
        assert_eq!(after.loss_start_time, before.loss_start_time);
        assert_eq!(after.loss_window_ticks, before.loss_window_ticks);
    }

    #[test]
    fn late_reply_never_predates_the_loss_window() {
        let mut tracker = LossTracker::new(t(0));
        tracker.on_packet_received(t(5));
        // Stamped before the window opened, applied after it.
        tracker.on_poll_tick(t(9), LOSS_THRESHOLD);
        assert_eq!(
            tracker.on_packet_received(t(8)),
            Some(LossTransitionEvent::RecoveredFromLoss {
                at: t(9),
                started_at: t(9),
                loss_window_ticks: 1,
            })
        );
        assert_eq!(tracker.state().time_last_success, t(8));
    }

    #[test]
    fn last_success_never_moves_back() {
        let mut tracker = LossTracker::new(t(0));
        tracker.on_packet_received(t(6));
        tracker.on_packet_received(t(4));
        assert_eq!(tracker.state().time_last_success, t(6));
        assert_eq!(tracker.on_poll_tick(t(8), LOSS_THRESHOLD), None);
    }

    #[test]
    fn reply_stamped_under_the_lock_recovers() {
        struct Events(Mutex<Vec<LossTransitionEvent>>);
        impl PresentationSink for Events {
            fn append_log_line(&self, _line: crate::presentation::LogLine) {}
            fn append_loss_event(&self, event: LossTransitionEvent) {
                self.0.lock().unwrap().push(event);
            }
            fn update_statistics(&self, _snapshot: crate::statistics::StatisticsSnapshot) {}
        }

        let sink = Arc::new(Events(Mutex::new(Vec::new())));
        let start = Utc::now() - TimeDelta::seconds(10);
        let tracker = SharedLossTracker::new(start, sink.clone());
        tracker.poll_tick(start + TimeDelta::seconds(5));
        tracker.packet_received_now();

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        match events[1] {
            LossTransitionEvent::RecoveredFromLoss { at, started_at, .. } => {
                assert!(at >= started_at)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!tracker.in_loss());
    }

    #[test]
    fn quiet_tick_does_not_end_loss() {
        let mut tracker = LossTracker::new(t(10));
        tracker.on_poll_tick(t(14), LOSS_THRESHOLD);
        // Clock stepped back inside the threshold.
        assert_eq!(tracker.on_poll_tick(t(11), LOSS_THRESHOLD), None);
        assert!(tracker.in_loss());
        assert_eq!(tracker.state().loss_window_ticks, 1);
    }

    #[test]
    fn exactly_threshold_is_not_loss() {
        let mut tracker = LossTracker::new(t(0));
        assert_eq!(tracker.on_poll_tick(t(3), LOSS_THRESHOLD), None);
        assert!(
            tracker
                .on_poll_tick(t(3) + TimeDelta::milliseconds(1), LOSS_THRESHOLD)
                .is_some()
        );
    }

    #[test]
    fn event_accessors() {
        let entered = LossTransitionEvent::EnteredLoss { at: t(4) };
        assert_eq!(entered.kind(), LossTransitionKind::EnteredLoss);
        assert_eq!(entered.timestamp(), t(4));
        let recovered = LossTransitionEvent::RecoveredFromLoss {
            at: t(9),
            started_at: t(4),
            loss_window_ticks: 3,
        };
        assert_eq!(recovered.kind(), LossTransitionKind::RecoveredFromLoss);
        assert_eq!(recovered.timestamp(), t(9));
    }
}
