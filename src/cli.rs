use crate::config::{EngineSettings, Group};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "ticketpool")]
#[command(about = "Concurrent ticket pool fed by timed vendors and drained by customers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database holding config, vendors and the sales log
    #[arg(long, global = true, default_value = "ticketpool.db")]
    pub db: PathBuf,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Append engine logs to this file (the console is silent otherwise)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the engine with a live console
    Run {
        /// Stop after this long (default: until Ctrl-C or q)
        #[arg(long, short = 'd', value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Disable the console, log to stderr
        #[arg(long, short = 'q')]
        quiet: bool,

        /// Worker threads shared by all vendors
        #[arg(long, default_value = "3")]
        vendor_workers: usize,

        /// How long stop waits for in-flight work
        #[arg(long, default_value = "5s", value_parser = parse_duration)]
        grace: Duration,

        /// Bound on each waiting-customer queue
        #[arg(long, default_value = "16")]
        max_waiting: usize,

        /// Customer attempts generated per tick
        #[arg(long, default_value = "2")]
        customers_per_tick: usize,

        /// How often the durable config is checked for outside changes
        #[arg(long, default_value = "5s", value_parser = parse_duration)]
        watch_interval: Duration,
    },

    /// Show system status and every tunable
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark the system running (a live engine picks this up)
    Start,

    /// Mark the system stopped
    Stop,

    /// Ask a live engine to stop a group and start it again
    Restart {
        /// Which group to restart; `all` also marks the system running
        #[arg(long, short = 'g', value_enum, default_value = "all")]
        group: RestartTarget,
    },

    /// Change a tunable
    Config {
        #[command(subcommand)]
        setting: ConfigCommand,
    },

    /// Manage vendors
    Vendors {
        #[command(subcommand)]
        action: VendorCommand,
    },

    /// Print the sales log
    Sales {
        /// Only the newest N entries
        #[arg(long, short = 'n')]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long, conflicts_with = "csv")]
        json: bool,

        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigCommand {
    /// Tickets currently in the pool (0..=max capacity)
    TotalTickets {
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
    /// Pool capacity (at least the current ticket count)
    MaxCapacity {
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
    /// Global minimum seconds between vendor releases
    ReleaseRate {
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
    /// Seconds between customer generator ticks (at least 1)
    RetrievalRate {
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum VendorCommand {
    /// List vendors
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a vendor
    Add {
        name: String,
        /// Tickets released per firing
        #[arg(long, short = 't')]
        tickets: u32,
        /// Seconds between releases
        #[arg(long, short = 'r')]
        rate: u32,
    },
    /// Change fields of an existing vendor
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, short = 't')]
        tickets: Option<u32>,
        #[arg(long, short = 'r')]
        rate: Option<u32>,
    },
    /// Delete a vendor
    Remove { id: i64 },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartTarget {
    Vendors,
    Customers,
    All,
}

impl RestartTarget {
    pub fn groups(self) -> &'static [Group] {
        match self {
            RestartTarget::Vendors => &[Group::Vendors],
            RestartTarget::Customers => &[Group::Customers],
            RestartTarget::All => &Group::ALL,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }

    // Bare number means seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    Err(format!(
        "Invalid duration '{}'. Examples: 30s, 5m, 2h, 1h30m, 90",
        s
    ))
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Run {
                vendor_workers,
                max_waiting,
                customers_per_tick,
                watch_interval,
                ..
            } => {
                if *vendor_workers == 0 || *vendor_workers > 256 {
                    return Err(format!(
                        "Vendor workers must be between 1 and 256, got {}",
                        vendor_workers
                    ));
                }
                if *max_waiting == 0 {
                    return Err("Max waiting must be at least 1".to_string());
                }
                if *customers_per_tick == 0 {
                    return Err("Customers per tick must be at least 1".to_string());
                }
                if watch_interval.is_zero() {
                    return Err("Watch interval must be non-zero".to_string());
                }
            }
            Command::Vendors {
                action: VendorCommand::Add { name, .. },
            } if name.trim().is_empty() => {
                return Err("Vendor name must not be empty".to_string());
            }
            _ => {}
        }
        Ok(())
    }

    /// Engine knobs from `run` flags; defaults for every other command
    pub fn engine_settings(&self) -> EngineSettings {
        match &self.command {
            Command::Run {
                vendor_workers,
                grace,
                max_waiting,
                customers_per_tick,
                watch_interval,
                ..
            } => EngineSettings {
                vendor_workers: *vendor_workers,
                grace_period: *grace,
                customers_per_tick: *customers_per_tick,
                max_waiting: *max_waiting,
                watch_interval: *watch_interval,
            },
            _ => EngineSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_run_flags_become_settings() {
        let cli = Cli::parse_from([
            "ticketpool",
            "run",
            "--vendor-workers",
            "5",
            "--grace",
            "2s",
            "--max-waiting",
            "4",
        ]);
        assert!(cli.validate().is_ok());
        let settings = cli.engine_settings();
        assert_eq!(settings.vendor_workers, 5);
        assert_eq!(settings.grace_period, Duration::from_secs(2));
        assert_eq!(settings.max_waiting, 4);
        assert_eq!(settings.customers_per_tick, 2);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let cli = Cli::parse_from(["ticketpool", "run", "--vendor-workers", "0"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_negative_config_values_parse() {
        let cli = Cli::parse_from(["ticketpool", "config", "release-rate", "-1"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                setting: ConfigCommand::ReleaseRate { value: -1 }
            }
        ));
    }

    #[test]
    fn test_restart_group_flag() {
        let cli = Cli::parse_from(["ticketpool", "restart"]);
        assert!(matches!(
            cli.command,
            Command::Restart {
                group: RestartTarget::All
            }
        ));

        let cli = Cli::parse_from(["ticketpool", "restart", "--group", "customers"]);
        let Command::Restart { group } = cli.command else {
            panic!("expected restart");
        };
        assert_eq!(group.groups(), &[Group::Customers]);
    }

    #[test]
    fn test_global_db_flag() {
        let cli = Cli::parse_from(["ticketpool", "status", "--db", "/tmp/x.db"]);
        assert_eq!(cli.db, PathBuf::from("/tmp/x.db"));
    }
}
