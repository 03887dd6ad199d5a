use clap::Parser;

use crate::config::AppConfig;

/// Command-line overrides shared by both binaries. Anything not given here
/// comes from the config file.
#[derive(Debug, Default, Parser)]
#[command(version, about = "Records periods of packet loss to a host")]
pub struct Cli {
    /// Host name or IP address to ping
    #[arg(short, long)]
    pub target: Option<String>,

    /// Milliseconds between echo requests
    #[arg(short, long)]
    pub interval_ms: Option<u64>,

    /// Milliseconds to wait for each reply
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Echo payload size in bytes
    #[arg(short, long)]
    pub size: Option<usize>,

    /// Write the resulting settings back to the config file
    #[arg(long)]
    pub save_config: bool,
}

impl Cli {
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(size) = self.size {
            config.payload_size = size;
        }
        config
    }

    /// Loads the config file, applies the flags and saves if asked to.
    pub fn resolve_config(&self) -> AppConfig {
        let config = self.apply(AppConfig::load());
        if self.save_config {
            match config.save() {
                Ok(path) => log::info!("saved config to {}", path.display()),
                Err(e) => log::warn!("failed to save config: {e}"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from(["packet-loss-recorder", "--target", "1.1.1.1", "-i", "250"]);
        let config = cli.apply(AppConfig::default());
        assert_eq!(config.target, "1.1.1.1");
        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.timeout_ms, AppConfig::default().timeout_ms);
    }

    #[test]
    fn no_flags_keep_config() {
        let cli = Cli::parse_from(["packet-loss-recorder"]);
        assert_eq!(cli.apply(AppConfig::default()), AppConfig::default());
        assert!(!cli.save_config);
    }
}
