use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::poller::ViewSettings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (YAML, TOML or JSON)
    #[arg(short, long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "JSON_LOGS", global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub watch: WatchArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Poll a message feed and print the list whenever it changes (default)
    Watch,
    /// Serve a message feed built from lines read on stdin
    Serve(ServeArgs),
}

/// Poller options. Accepted with or without the `watch` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Base URL of the feed server
    #[arg(long, env = "FEED_URL", global = true)]
    pub url: Option<String>,

    /// Milliseconds between polls
    #[arg(long, env = "POLL_INTERVAL_MS", global = true)]
    pub interval_ms: Option<u64>,

    /// Show oldest messages first (true/false, yes/no, on/off, 1/0)
    #[arg(
        long,
        env = "FEED_REVERSE",
        global = true,
        value_parser = BoolishValueParser::new()
    )]
    pub reverse: Option<bool>,

    /// Maximum number of messages to keep; zero or negative is unlimited
    #[arg(
        long,
        env = "MAX_MESSAGES",
        global = true,
        allow_negative_numbers = true
    )]
    pub max: Option<i64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "BIND_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub view: ViewConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewConfig {
    pub reverse: bool,
    pub max: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl FeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ViewConfig {
    pub fn settings(&self) -> ViewSettings {
        ViewSettings::from_raw(self.reverse, self.max)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    /// Resolve configuration. Priority: CLI flag > CLI env var >
    /// `POLLER_` env var > config file > defaults.
    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("feed.url", "http://127.0.0.1:8080")?
            .set_default("feed.interval_ms", 1000)?
            .set_default("view.reverse", false)?
            .set_default("view.max", -1)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        }

        // E.g. POLLER_VIEW__MAX=20
        builder = builder.add_source(
            Environment::with_prefix("POLLER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let watch = &cli.watch;
        if let Some(url) = &watch.url {
            builder = builder.set_override("feed.url", url.as_str())?;
        }
        if let Some(ms) = watch.interval_ms {
            builder =
                builder.set_override("feed.interval_ms", i64::try_from(ms).unwrap_or(i64::MAX))?;
        }
        if let Some(reverse) = watch.reverse {
            builder = builder.set_override("view.reverse", reverse)?;
        }
        if let Some(max) = watch.max {
            builder = builder.set_override("view.max", max)?;
        }

        if let Some(Command::Serve(args)) = &cli.command {
            if let Some(host) = &args.host {
                builder = builder.set_override("server.host", host.as_str())?;
            }
            if let Some(port) = args.port {
                builder = builder.set_override("server.port", i64::from(port))?;
            }
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        if cfg.feed.interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "feed.interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_flags_parse() {
        let cli = Cli::try_parse_from([
            "message-poller",
            "watch",
            "--url",
            "http://feed:9000",
            "--reverse",
            "true",
            "--max",
            "-1",
        ])
        .unwrap();

        assert!(matches!(cli.command, Some(Command::Watch)));
        assert_eq!(cli.watch.url.as_deref(), Some("http://feed:9000"));
        assert_eq!(cli.watch.reverse, Some(true));
        assert_eq!(cli.watch.max, Some(-1));
        assert_eq!(cli.watch.interval_ms, None);
    }

    #[test]
    fn watch_flags_work_without_subcommand() {
        let cli = Cli::try_parse_from(["message-poller", "--max", "3"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.watch.max, Some(3));
    }

    #[test]
    fn reverse_accepts_boolish_values() {
        for (raw, expected) in [
            ("1", true),
            ("yes", true),
            ("on", true),
            ("0", false),
            ("off", false),
        ] {
            let cli = Cli::try_parse_from(["message-poller", "watch", "--reverse", raw]).unwrap();
            assert_eq!(cli.watch.reverse, Some(expected), "--reverse {raw}");
        }
        assert!(Cli::try_parse_from(["message-poller", "watch", "--reverse", "maybe"]).is_err());
    }

    #[test]
    fn view_settings_from_config() {
        let view = ViewConfig {
            reverse: true,
            max: 10,
        };
        let settings = view.settings();
        assert!(settings.reverse);
        assert_eq!(settings.limit.map(std::num::NonZeroUsize::get), Some(10));
    }
}
