use std::io;

use surge_ping::SurgeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// How severe an [`Error`] is for the running recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The prober could not be built. Fatal.
    Construction,
    /// The prober was built but could not run.
    Run,
    /// A single echo request failed. Never fatal.
    PacketSend,
    Config,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid target {0:?}")]
    InvalidTarget(String),

    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("no address found for {0}")]
    NoAddress(String),

    #[error("failed to open ICMP socket: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to send icmp_seq={seq}: {source}")]
    Send {
        seq: u16,
        #[source]
        source: SurgeError,
    },

    #[error("could not find config directory")]
    ConfigDir,

    #[error("config file: {0}")]
    ConfigIo(#[from] io::Error),

    #[error("config format: {0}")]
    ConfigFormat(#[from] serde_json::Error),
}

impl ErrorKind {
    /// What the recorder was doing when an error of this kind happened.
    pub fn context(self) -> &'static str {
        match self {
            ErrorKind::Construction => "creating pinger",
            ErrorKind::Run => "running pinger",
            ErrorKind::PacketSend => "sending packet",
            ErrorKind::Config => "reading config",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidTarget(_) | Error::Resolve { .. } | Error::NoAddress(_) => {
                ErrorKind::Construction
            }
            Error::Socket(_) => ErrorKind::Run,
            Error::Send { .. } => ErrorKind::PacketSend,
            Error::ConfigDir | Error::ConfigIo(_) | Error::ConfigFormat(_) => ErrorKind::Config,
        }
    }

    /// Operator-facing line, e.g. `Error creating pinger: no address found for x`.
    pub fn report(&self) -> String {
        format!("Error {}: {self}", self.kind().context())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert_eq!(
            Error::NoAddress("example.invalid".into()).kind(),
            ErrorKind::Construction
        );
        let socket = Error::Socket(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(socket.kind(), ErrorKind::Run);
        assert_eq!(Error::InvalidTarget("::".into()).kind(), ErrorKind::Construction);
    }

    #[test]
    fn report_names_the_failing_step() {
        assert_eq!(
            Error::NoAddress("example.invalid".into()).report(),
            "Error creating pinger: no address found for example.invalid"
        );
        assert!(
            Error::Socket(io::Error::from(io::ErrorKind::PermissionDenied))
                .report()
                .starts_with("Error running pinger: failed to open ICMP socket")
        );
    }
}
