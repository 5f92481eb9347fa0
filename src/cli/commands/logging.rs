//! Log verbosity: repeated `-v` flags or `ZEEK_LOG_LEVEL`.

use clap::{builder::ValueParser, Arg, ArgAction, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order; the index is the `-v` count.
const LEVELS: [(&str, Level); 5] = [
    ("error", Level::ERROR),
    ("warn", Level::WARN),
    ("info", Level::INFO),
    ("debug", Level::DEBUG),
    ("trace", Level::TRACE),
];

fn parse_verbosity(value: &str) -> Result<u8, String> {
    let value = value.trim();
    if let Ok(count) = value.parse::<usize>() {
        return u8::try_from(count)
            .ok()
            .filter(|count| usize::from(*count) < LEVELS.len())
            .ok_or_else(|| format!("verbosity must be between 0 and {}", LEVELS.len() - 1));
    }

    LEVELS
        .iter()
        .position(|(name, _)| name.eq_ignore_ascii_case(value))
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| {
            let names: Vec<&str> = LEVELS.iter().map(|(name, _)| *name).collect();
            format!("unknown log level `{value}`, expected one of {}", names.join(", "))
        })
}

/// Accepts a level name (any case) or its verbosity count.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_verbosity)
}

/// Tracing level for a verbosity count. Counts past `trace` stay at `trace`.
#[must_use]
pub fn level_for(verbosity: u8) -> Level {
    LEVELS
        .get(usize::from(verbosity))
        .map_or(Level::TRACE, |(_, level)| *level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Raise log verbosity; repeat for more (-v warn, -vv info, -vvv debug, -vvvv trace)")
            .env("ZEEK_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_counts_are_accepted() {
        assert_eq!(parse_verbosity("error"), Ok(0));
        assert_eq!(parse_verbosity("WARN"), Ok(1));
        assert_eq!(parse_verbosity(" Debug "), Ok(3));
        assert_eq!(parse_verbosity("4"), Ok(4));
    }

    #[test]
    fn out_of_range_and_unknown_levels_are_rejected() {
        assert!(parse_verbosity("5").is_err());
        assert!(parse_verbosity("300").is_err());
        assert!(parse_verbosity("verbose").is_err_and(|err| err.contains("error, warn, info")));
    }

    #[test]
    fn level_for_saturates_at_trace() {
        assert_eq!(level_for(0), Level::ERROR);
        assert_eq!(level_for(2), Level::INFO);
        assert_eq!(level_for(4), Level::TRACE);
        assert_eq!(level_for(u8::MAX), Level::TRACE);
    }
}
