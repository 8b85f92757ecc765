//! Verbosity-gated terminal logging.
//!
//! The library logs through `tracing`. Tiers map onto levels as follows:
//!
//! | tier   | macro     | shown at verbosity |
//! |--------|-----------|--------------------|
//! | info   | `info!`   | 1 and up           |
//! | detail | `debug!`  | 2 and up           |
//! | debug  | `trace!`  | 3                  |
//! | warn   | `warn!`   | 1 and up (stderr)  |
//! | error  | `error!`  | 1 and up (stderr)  |
//!
//! Verbosity 0 silences everything. The entry point builds one [`LogConfig`]
//! from the command line and installs its subscriber once.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::FmtSubscriber;

/// Logger configuration chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    verbosity: u8,
}

impl LogConfig {
    pub const MAX_VERBOSITY: u8 = 3;

    pub fn new(verbosity: u8) -> Self {
        Self {
            verbosity: verbosity.min(Self::MAX_VERBOSITY),
        }
    }

    /// Verbosity from command-line flags: a base of 1, plus one per `-v`,
    /// or 0 when quiet.
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            Self::new(0)
        } else {
            Self::new(verbose.saturating_add(1))
        }
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::OFF,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Build a subscriber writing WARN and ERROR to `err` and everything else
    /// to `out`.
    pub fn subscriber<O, E>(
        &self,
        out: O,
        err: E,
        ansi: bool,
    ) -> impl tracing::Subscriber + Send + Sync + 'static
    where
        O: for<'a> MakeWriter<'a> + Send + Sync + 'static,
        E: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let writer = err.with_max_level(Level::WARN).or_else(out);

        let mut builder = FmtSubscriber::builder()
            .with_max_level(self.level_filter())
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .without_time();

        if self.verbosity >= Self::MAX_VERBOSITY {
            builder = builder.with_file(true).with_line_number(true);
        }

        builder.finish()
    }

    /// Install the terminal subscriber as the global default.
    pub fn init(&self) -> Result<()> {
        let ansi = std::io::stdout().is_terminal() && std::io::stderr().is_terminal();
        let subscriber = self.subscriber(std::io::stdout, std::io::stderr, ansi);
        tracing::subscriber::set_global_default(subscriber)
            .context("installing the global log subscriber")
    }
}
