//! Command-line interface definitions.
//!
//! Every option can also be supplied through the environment variable named
//! next to it, which is how scheduled runs (cron, CI workflows) configure the
//! notifier.

use crate::logging::{LogFormat, LogLevel};
use clap::Parser;

/// Command-line arguments for the notifier.
///
/// # Examples
///
/// ```sh
/// # Everything from the environment
/// DISCORD_WEBHOOK_URL=https://discord.com/api/webhooks/... rss_discord_notifier
///
/// # Explicit paths and human-readable logs
/// rss_discord_notifier -c ./configs/feeds.yaml -s ./state/state.json --log-format text
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML feed configuration
    #[arg(short, long, env = "CONFIG_FILE_PATH", default_value = "./configs/feeds.yaml")]
    pub config: String,

    /// Default Discord webhook for feeds without their own
    #[arg(short, long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    pub webhook_url: Option<String>,

    /// Path of the JSON state file
    #[arg(short, long, env = "STATE_FILE_PATH", default_value = "./state/state.json")]
    pub state_file: String,

    /// Log level: DEBUG, INFO, WARN or ERROR
    #[arg(long, env = "LOG_LEVEL", default_value = "INFO")]
    pub log_level: LogLevel,

    /// Log format: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "rss_discord_notifier",
            "--config",
            "/etc/notifier/feeds.yaml",
            "--webhook-url",
            "https://discord.com/api/webhooks/1/abc",
            "--state-file",
            "/var/lib/notifier/state.json",
            "--log-level",
            "DEBUG",
            "--log-format",
            "text",
        ]);

        assert_eq!(cli.config, "/etc/notifier/feeds.yaml");
        assert_eq!(
            cli.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/abc")
        );
        assert_eq!(cli.state_file, "/var/lib/notifier/state.json");
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "rss_discord_notifier",
            "-c",
            "feeds.yaml",
            "-w",
            "https://hook",
            "-s",
            "state.json",
        ]);

        assert_eq!(cli.config, "feeds.yaml");
        assert_eq!(cli.webhook_url.as_deref(), Some("https://hook"));
        assert_eq!(cli.state_file, "state.json");
    }

    #[test]
    fn test_cli_rejects_unknown_log_level() {
        let res = Cli::try_parse_from(["rss_discord_notifier", "--log-level", "LOUD"]);
        assert!(res.is_err());
    }
}
