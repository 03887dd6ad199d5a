use std::future::Future;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use surge_ping::{Client, Config, ICMP, IcmpPacket, PingIdentifier, PingSequence, SurgeError};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::shutdown::Shutdown;
use crate::statistics::{ProbeStatistics, StatisticsSnapshot};

/// One echo request and, once known, its reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub seq: u16,
    /// `None` until a reply arrives.
    pub rtt: Option<Duration>,
    pub bytes: usize,
    pub addr: IpAddr,
    /// Only IPv4 replies carry one, and only when the socket exposes it.
    pub ttl: Option<u8>,
}

/// Callbacks invoked by [`Probe::run`]. Every method defaults to a no-op.
///
/// There is no duplicate-reply callback: surge-ping drops every reply after
/// the first for a sequence number before it reaches the pinger.
pub trait ProbeHandler: Send + Sync {
    fn on_send(&self, _packet: &ProbeOutcome) {}
    fn on_receive(&self, _packet: &ProbeOutcome) {}
    fn on_send_error(&self, _packet: &ProbeOutcome, _error: &Error) {}
    fn on_finish(&self, _statistics: &StatisticsSnapshot) {}
}

/// Sanitize hostname by keeping only valid characters (alphanumeric, dots, hyphens)
/// Returns None if the result is empty
fn sanitize_hostname(hostname: &str) -> Option<String> {
    // Also handle case where user included port like "example.com:8080"
    let hostname = hostname.split(':').next().unwrap_or(hostname);

    let sanitized: String = hostname
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || *c == '-')
        .collect();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Resolve hostname to IP address
pub async fn resolve_target(target: &str) -> Result<IpAddr> {
    let target = target.trim();
    // Try parsing as IP address first
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let sanitized =
        sanitize_hostname(target).ok_or_else(|| Error::InvalidTarget(target.to_string()))?;

    let mut addrs = tokio::net::lookup_host(format!("{sanitized}:0"))
        .await
        .map_err(|source| Error::Resolve {
            target: sanitized.clone(),
            source,
        })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or(Error::NoAddress(sanitized))
}

/// Something that pings one host and keeps running statistics.
pub trait Probe: Send + Sync + 'static {
    fn target(&self) -> &str;
    fn addr(&self) -> IpAddr;
    fn statistics(&self) -> StatisticsSnapshot;

    /// Probes until `shutdown` fires. Returns an error only if probing could
    /// not start or had to give up.
    fn run(
        &self,
        handler: Arc<dyn ProbeHandler>,
        shutdown: Shutdown,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// ICMP echo [`Probe`] sending on a fixed interval.
pub struct ProbeSource {
    target: String,
    addr: IpAddr,
    interval: Duration,
    timeout: Duration,
    payload: Vec<u8>,
    statistics: Arc<Mutex<ProbeStatistics>>,
}

impl ProbeSource {
    /// Resolves the target once. Failing here is a construction error.
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let addr = resolve_target(&config.target).await?;
        log::info!("resolved {} to {addr}", config.target);
        Ok(Self::with_addr(config.target.trim(), addr, config))
    }

    pub fn with_addr(target: &str, addr: IpAddr, config: &AppConfig) -> Self {
        Self {
            target: target.to_string(),
            addr,
            interval: config.interval(),
            timeout: config.timeout(),
            payload: vec![0; config.payload_size],
            statistics: Arc::new(Mutex::new(ProbeStatistics::new(target, addr))),
        }
    }
}

impl Probe for ProbeSource {
    fn target(&self) -> &str {
        &self.target
    }

    fn addr(&self) -> IpAddr {
        self.addr
    }

    fn statistics(&self) -> StatisticsSnapshot {
        self.statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Sends echo requests until `shutdown` fires, then reports the final
    /// statistics through [`ProbeHandler::on_finish`].
    ///
    /// Every request runs in its own task so a slow reply never delays the
    /// next send. A request without a reply inside the timeout is simply lost.
    async fn run(&self, handler: Arc<dyn ProbeHandler>, mut shutdown: Shutdown) -> Result<()> {
        let config = match self.addr {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = Client::new(&config).map_err(Error::Socket)?;
        let ident = PingIdentifier(std::process::id() as u16);
        log::info!("pinging {} ({}) every {:?}", self.target, self.addr, self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();
        let mut seq: u16 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            let packet = ProbeOutcome {
                seq,
                rtt: None,
                bytes: self.payload.len(),
                addr: self.addr,
                ttl: None,
            };
            self.statistics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_sent();
            handler.on_send(&packet);

            in_flight.spawn(echo(
                client.clone(),
                ident,
                packet,
                self.payload.clone(),
                self.timeout,
                Arc::clone(&self.statistics),
                Arc::clone(&handler),
            ));
            while in_flight.try_join_next().is_some() {}
            seq = seq.wrapping_add(1);
        }

        in_flight.abort_all();
        while in_flight.join_next().await.is_some() {}
        handler.on_finish(&self.statistics());
        Ok(())
    }
}

async fn echo(
    client: Client,
    ident: PingIdentifier,
    mut packet: ProbeOutcome,
    payload: Vec<u8>,
    timeout: Duration,
    statistics: Arc<Mutex<ProbeStatistics>>,
    handler: Arc<dyn ProbeHandler>,
) {
    let mut pinger = client.pinger(packet.addr, ident).await;
    pinger.timeout(timeout);

    match pinger.ping(PingSequence(packet.seq), &payload).await {
        Ok((reply, rtt)) => {
            let (bytes, source, ttl) = match reply {
                IcmpPacket::V4(p) => (p.get_size(), IpAddr::V4(p.get_source()), p.get_ttl()),
                IcmpPacket::V6(p) => (p.get_size(), IpAddr::V6(p.get_source()), None),
            };
            statistics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_reply(rtt);

            packet.rtt = Some(rtt);
            packet.bytes = bytes;
            packet.addr = source;
            packet.ttl = ttl;
            handler.on_receive(&packet);
        }
        Err(SurgeError::Timeout { .. }) => {
            log::debug!("icmp_seq={} timed out after {timeout:?}", packet.seq);
        }
        Err(source) => {
            let error = Error::Send {
                seq: packet.seq,
                source,
            };
            log::warn!("{error}");
            handler.on_send_error(&packet, &error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn sanitizes_hostnames() {
        assert_eq!(sanitize_hostname("example.com:8080").as_deref(), Some("example.com"));
        assert_eq!(sanitize_hostname("exa mple.com;").as_deref(), Some("example.com"));
        assert_eq!(sanitize_hostname(" ;/"), None);
    }

    #[tokio::test]
    async fn literal_addresses_skip_dns() {
        assert_eq!(
            resolve_target(" 192.0.2.1 ").await.unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))
        );
        assert!(resolve_target("2001:db8::1").await.unwrap().is_ipv6());
    }

    #[tokio::test]
    async fn garbage_target_is_a_construction_error() {
        let error = resolve_target("!!!").await.unwrap_err();
        assert!(matches!(error, Error::InvalidTarget(_)));
        assert_eq!(error.kind(), crate::error::ErrorKind::Construction);
    }

    #[test]
    fn fresh_source_has_empty_statistics() {
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let source = ProbeSource::with_addr("example.com", addr, &AppConfig::default());
        let snapshot = source.statistics();
        assert_eq!(snapshot.addr, addr);
        assert_eq!(snapshot.packets_sent, 0);
        assert_eq!(source.target(), "example.com");
    }
}
