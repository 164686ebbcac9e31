//! Client configuration from command-line flags and the environment

use std::num::NonZeroUsize;
use std::time::Duration;

use clap::Parser;

/// Play chess against a remote opponent, or watch a game in progress.
#[derive(Parser, Debug, Clone)]
#[command(name = "chess-play")]
#[command(about = "Two-player chess over a publish/subscribe relay", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Your name; also your identity in the room
    #[arg(long, env = "CHESS_NAME")]
    pub name: String,

    /// Room to play in
    #[arg(long, env = "CHESS_GAME", default_value = "game1")]
    pub game: String,

    /// Path of a UCI engine to make your moves
    #[arg(long, env = "CHESS_ENGINE")]
    pub engine: Option<String>,

    /// Engine time per move, e.g. `500ms`, `2s` or a bare number of milliseconds
    #[arg(long = "time", env = "CHESS_MOVE_TIME", default_value = "500ms", value_parser = parse_duration)]
    pub move_time: Duration,

    /// Watch the game instead of playing
    #[arg(long)]
    pub watch: bool,

    /// Address of the relay server
    #[arg(long, env = "RELAY_ADDR", default_value = "127.0.0.1:7878")]
    pub relay: String,

    /// How long to wait to see our own presence entry
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub presence_timeout: Duration,

    /// Grace period before forcing exit after a termination signal
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub grace: Duration,

    /// Delivery buffer per subscription
    #[arg(long, env = "CHANNEL_CAPACITY", default_value = "256")]
    pub channel_capacity: NonZeroUsize,
}

/// Parse `<n>ms`, `<n>s` or a bare number of milliseconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let (digits, scale) = if let Some(ms) = text.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(s) = text.strip_suffix('s') {
        (s, 1000)
    } else {
        (text, 1)
    };
    let millis = digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|value| value.checked_mul(scale))
        .ok_or_else(|| format!("invalid duration '{text}', expected e.g. 500ms or 2s"))?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("18446744073709551615s").is_err());
        assert_eq!(
            parse_duration("18446744073709551615ms").unwrap(),
            Duration::from_millis(u64::MAX)
        );
    }

    #[test]
    fn test_channel_capacity_must_be_positive() {
        let cli = Cli::try_parse_from(["chess-play", "--name", "alice", "--channel-capacity", "8"])
            .unwrap();
        assert_eq!(cli.channel_capacity.get(), 8);
        assert!(
            Cli::try_parse_from(["chess-play", "--name", "alice", "--channel-capacity", "0"])
                .is_err()
        );
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["chess-play", "--name", "alice"]).unwrap();
        assert_eq!(cli.game, "game1");
        assert_eq!(cli.move_time, Duration::from_millis(500));
        assert_eq!(cli.presence_timeout, Duration::from_secs(1));
        assert!(!cli.watch);
        assert!(cli.engine.is_none());
    }

    #[test]
    fn test_name_is_required() {
        assert!(Cli::try_parse_from(["chess-play"]).is_err());
    }
}
