use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

pub const ARG_PORT: &str = "port";
pub const ARG_PUBLIC_DIR: &str = "public-dir";
pub const ARG_PROTECTED_DIR: &str = "protected-dir";
pub const ARG_DATA_DIR: &str = "data-dir";

#[derive(Debug, Clone)]
pub struct Options {
    pub port: u16,
    pub public_dir: PathBuf,
    pub protected_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Options {
    /// Parse listener and directory arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a directory argument is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_dir = |id: &str| -> anyhow::Result<PathBuf> {
            matches
                .get_one::<String>(id)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(3000),
            public_dir: read_dir(ARG_PUBLIC_DIR)?,
            protected_dir: read_dir(ARG_PROTECTED_DIR)?,
            data_dir: read_dir(ARG_DATA_DIR)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("3000")
                .env("ZEEK_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_PUBLIC_DIR)
                .long(ARG_PUBLIC_DIR)
                .help("Directory with the public pages and assets")
                .env("ZEEK_PUBLIC_DIR")
                .default_value("public"),
        )
        .arg(
            Arg::new(ARG_PROTECTED_DIR)
                .long(ARG_PROTECTED_DIR)
                .help("Directory with the member-only dashboard pages")
                .env("ZEEK_PROTECTED_DIR")
                .default_value("protected"),
        )
        .arg(
            Arg::new(ARG_DATA_DIR)
                .long(ARG_DATA_DIR)
                .help("Directory holding the users and subscribers record files")
                .env("ZEEK_DATA_DIR")
                .default_value("data"),
        )
}
