use std::fmt;

use chrono::Duration;
use services::ServiceSettings;
use services::sessions::SessionConfig;

pub const DEFAULT_DB_URL: &str = "sqlite://lingua.sqlite3?mode=rwc";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, PartialEq, Eq)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidDbUrl { raw: String },
    InvalidTtl { raw: String },
    InvalidSeed { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidTtl { raw } => {
                write!(f, "invalid --ttl value (expected minutes > 0): {raw}")
            }
            ArgsError::InvalidSeed { raw } => write!(f, "invalid --seed value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read study commands from stdin.
    Serve,
    /// Write the demo catalog and exit.
    Seed,
    Help,
}

impl Mode {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "serve" => Some(Self::Serve),
            "seed" => Some(Self::Seed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
    pub db_url: String,
    pub log_filter: String,
    pub ttl: Duration,
    pub jitter_seed: Option<u64>,
}

fn parse_ttl(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|minutes| *minutes > 0)
        .and_then(Duration::try_minutes)
}

impl Config {
    /// Environment first, then flags on top.
    ///
    /// Invalid environment values fall back to defaults; invalid flags are errors.
    pub fn parse(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url = env("LINGUA_DB_URL").unwrap_or_else(|| DEFAULT_DB_URL.into());
        let mut log_filter = env("LINGUA_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.into());
        let mut ttl = env("LINGUA_SESSION_TTL_MINUTES")
            .and_then(|value| parse_ttl(&value))
            .unwrap_or_else(|| SessionConfig::default().ttl);
        let mut jitter_seed =
            env("LINGUA_JITTER_SEED").and_then(|value| value.trim().parse::<u64>().ok());

        let mut args = args.into_iter().peekable();
        let mode = match args.peek().map(String::as_str) {
            None => Mode::Serve,
            Some(first) if first.starts_with('-') => Mode::Serve,
            Some(first) => {
                let mode = Mode::from_arg(first)
                    .ok_or_else(|| ArgsError::UnknownCommand(first.to_owned()))?;
                args.next();
                mode
            }
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--log" => {
                    log_filter = require_value(&mut args, "--log")?;
                }
                "--ttl" => {
                    let value = require_value(&mut args, "--ttl")?;
                    ttl = parse_ttl(&value).ok_or(ArgsError::InvalidTtl { raw: value })?;
                }
                "--seed" => {
                    let value = require_value(&mut args, "--seed")?;
                    let parsed = value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ArgsError::InvalidSeed { raw: value.clone() })?;
                    jitter_seed = Some(parsed);
                }
                "--help" | "-h" => {
                    return Ok(Self {
                        mode: Mode::Help,
                        db_url,
                        log_filter,
                        ttl,
                        jitter_seed,
                    });
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            mode,
            db_url,
            log_filter,
            ttl,
            jitter_seed,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            session: SessionConfig {
                ttl: self.ttl,
                ..SessionConfig::default()
            },
            jitter_seed: self.jitter_seed,
            ..ServiceSettings::default()
        }
    }
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  lingua [serve] [options]   read study commands from stdin");
    eprintln!("  lingua seed [options]      write the demo catalog and exit");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>   SQLite URL (default: {DEFAULT_DB_URL})");
    eprintln!("  --log <filter>      tracing filter (default: {DEFAULT_LOG_FILTER})");
    eprintln!("  --ttl <minutes>     idle minutes before a session expires (default: 30)");
    eprintln!("  --seed <u64>        fixed seed for interval jitter");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Environment (same as flags, also read from .env):");
    eprintln!("  LINGUA_DB_URL, LINGUA_LOG, LINGUA_SESSION_TTL_MINUTES, LINGUA_JITTER_SEED");
    eprintln!();
    eprintln!("Commands on stdin:");
    eprintln!("  start <learner> [beginner|intermediate|advanced]");
    eprintln!("  card <learner>");
    eprintln!("  answer <learner> <easy|good|hard|forgot|wrong>");
    eprintln!("  progress <learner>");
    eprintln!("  end <learner>");
    eprintln!("  stats <learner>");
    eprintln!("  quit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_args_or_env() {
        let config = Config::parse(args(&[]), no_env).unwrap();
        assert_eq!(config.mode, Mode::Serve);
        assert_eq!(config.db_url, DEFAULT_DB_URL);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.ttl, Duration::minutes(30));
        assert_eq!(config.jitter_seed, None);
    }

    #[test]
    fn flags_override_env() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LINGUA_DB_URL", "sqlite://env.sqlite3"),
            ("LINGUA_SESSION_TTL_MINUTES", "5"),
            ("LINGUA_JITTER_SEED", "9"),
        ]);
        let lookup = |key: &str| env.get(key).map(|v| (*v).to_owned());

        let from_env = Config::parse(args(&["serve"]), lookup).unwrap();
        assert_eq!(from_env.db_url, "sqlite://env.sqlite3");
        assert_eq!(from_env.ttl, Duration::minutes(5));
        assert_eq!(from_env.jitter_seed, Some(9));

        let flagged = Config::parse(
            args(&["seed", "--db", "sqlite://flag.sqlite3", "--ttl", "45", "--seed", "1"]),
            lookup,
        )
        .unwrap();
        assert_eq!(flagged.mode, Mode::Seed);
        assert_eq!(flagged.db_url, "sqlite://flag.sqlite3");
        assert_eq!(flagged.ttl, Duration::minutes(45));
        assert_eq!(flagged.jitter_seed, Some(1));
        assert_eq!(flagged.service_settings().session.ttl, Duration::minutes(45));
    }

    #[test]
    fn invalid_env_falls_back_but_invalid_flags_fail() {
        let lookup = |key: &str| (key == "LINGUA_SESSION_TTL_MINUTES").then(|| "zero".to_owned());
        let config = Config::parse(args(&[]), lookup).unwrap();
        assert_eq!(config.ttl, Duration::minutes(30));

        assert_eq!(
            Config::parse(args(&["--ttl", "0"]), no_env).unwrap_err(),
            ArgsError::InvalidTtl { raw: "0".into() }
        );
        assert_eq!(
            Config::parse(args(&["--db"]), no_env).unwrap_err(),
            ArgsError::MissingValue { flag: "--db" }
        );
        assert_eq!(
            Config::parse(args(&["deploy"]), no_env).unwrap_err(),
            ArgsError::UnknownCommand("deploy".into())
        );
    }

    #[test]
    fn ttl_beyond_duration_range_is_rejected() {
        let huge = "999999999999999999";
        assert_eq!(
            Config::parse(args(&["--ttl", huge]), no_env).unwrap_err(),
            ArgsError::InvalidTtl { raw: huge.into() }
        );

        let lookup = |key: &str| (key == "LINGUA_SESSION_TTL_MINUTES").then(|| huge.to_owned());
        let config = Config::parse(args(&[]), lookup).unwrap();
        assert_eq!(config.ttl, Duration::minutes(30));
    }
}
