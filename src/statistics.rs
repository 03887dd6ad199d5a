use std::net::IpAddr;
use std::time::Duration;

/// Point-in-time copy of the running probe statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsSnapshot {
    pub target: String,
    pub addr: IpAddr,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Percentage of sent packets without a reply, 0 to 100.
    pub packet_loss: f64,
    pub min_rtt: Duration,
    pub avg_rtt: Duration,
    pub max_rtt: Duration,
    pub stddev_rtt: Duration,
}

#[derive(Debug, Clone)]
pub struct ProbeStatistics {
    target: String,
    addr: IpAddr,
    packets_sent: u64,
    packets_received: u64,
    min_rtt: Option<Duration>,
    max_rtt: Option<Duration>,
    total_rtt: f64,
    total_rtt_squared: f64,
}

impl ProbeStatistics {
    pub fn new(target: impl Into<String>, addr: IpAddr) -> Self {
        Self {
            target: target.into(),
            addr,
            packets_sent: 0,
            packets_received: 0,
            min_rtt: None,
            max_rtt: None,
            total_rtt: 0.0,
            total_rtt_squared: 0.0,
        }
    }

    pub fn record_sent(&mut self) {
        self.packets_sent += 1;
    }

    /// surge-ping hands over at most one reply per sequence number, so every
    /// call here is a distinct received packet.
    pub fn record_reply(&mut self, rtt: Duration) {
        self.packets_received += 1;
        self.min_rtt = Some(self.min_rtt.map_or(rtt, |current| current.min(rtt)));
        self.max_rtt = Some(self.max_rtt.map_or(rtt, |current| current.max(rtt)));
        let secs = rtt.as_secs_f64();
        self.total_rtt += secs;
        self.total_rtt_squared += secs * secs;
    }

    pub fn packet_loss(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        let lost = self.packets_sent.saturating_sub(self.packets_received);
        lost as f64 / self.packets_sent as f64 * 100.0
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let (avg_rtt, stddev_rtt) = if self.packets_received > 0 {
            let n = self.packets_received as f64;
            let mean = self.total_rtt / n;
            let variance = (self.total_rtt_squared / n - mean * mean).max(0.0);
            (
                Duration::from_secs_f64(mean),
                Duration::from_secs_f64(variance.sqrt()),
            )
        } else {
            (Duration::ZERO, Duration::ZERO)
        };

        StatisticsSnapshot {
            target: self.target.clone(),
            addr: self.addr,
            packets_sent: self.packets_sent,
            packets_received: self.packets_received,
            packet_loss: self.packet_loss(),
            min_rtt: self.min_rtt.unwrap_or_default(),
            avg_rtt,
            max_rtt: self.max_rtt.unwrap_or_default(),
            stddev_rtt,
        }
    }
}
