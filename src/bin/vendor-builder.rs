use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use vendor_builder::config::DEFAULT_SETTINGS_FILE;
use vendor_builder::drivers::{self, OpenSsl, Python, PythonTarget, TlsSsl};
use vendor_builder::{BuildContext, Driver, DriverOptions, LogConfig, Settings};

/// Download, build, relink and package vendored OpenSSL, Python and tlsssl
#[derive(Parser)]
#[command(name = "vendor-builder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file; relative build paths resolve against its directory
    #[arg(short, long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Increase verbosity. Repeatable up to 2 times (-vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print nothing
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct DriverArgs {
    /// Download, compile and relink
    #[arg(short, long)]
    build: bool,

    /// Skip download and compile when previous build output exists.
    /// Only recommended for development.
    #[arg(short, long)]
    skip: bool,

    /// Package the build output
    #[arg(short, long)]
    pkg: bool,
}

impl From<DriverArgs> for DriverOptions {
    fn from(args: DriverArgs) -> Self {
        DriverOptions {
            build: args.build,
            skip: args.skip,
            install: false,
            package: args.pkg,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build OpenSSL
    Openssl {
        /// Install the relinked build into the base install path, for
        /// building Python and tlsssl against it (usually requires root)
        #[arg(short, long)]
        install: bool,

        #[command(flatten)]
        args: DriverArgs,
    },

    /// Build Python against the vendored OpenSSL (requires root)
    Python {
        /// Python major version
        #[arg(short, long, default_value = "2")]
        target: PythonTarget,

        #[command(flatten)]
        args: DriverArgs,
    },

    /// Build the tlsssl extension
    Tlsssl(DriverArgs),

    /// Build, install and package OpenSSL, then build and package Python 2
    /// and tlsssl against it (requires root)
    All,
}

impl Cli {
    fn parse_checked() -> Result<Self, clap::Error> {
        let cli = Cli::try_parse()?;
        let missing = match &cli.command {
            Commands::Openssl { install, args } => !install && !args.build && !args.pkg,
            Commands::Python { args, .. } | Commands::Tlsssl(args) => !args.build && !args.pkg,
            Commands::All => false,
        };
        if missing {
            return Err(Cli::command().error(
                ErrorKind::MissingRequiredArgument,
                "one of --build or --pkg is required",
            ));
        }
        Ok(cli)
    }
}

fn main() -> ExitCode {
    if std::env::args_os().len() < 2 {
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    }

    let cli = match Cli::parse_checked() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let log = LogConfig::from_flags(cli.quiet, cli.verbose);
    if let Err(err) = log.init() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(&cli.config)?;
    let ctx = BuildContext::new(settings);

    match cli.command {
        Commands::Openssl { install, args } => {
            let driver: &dyn Driver = &OpenSsl;
            let opts = DriverOptions {
                install,
                ..args.into()
            };
            drivers::run(&[driver], &ctx, opts)
        }
        Commands::Python { target, args } => {
            let python = Python::new(target);
            let driver: &dyn Driver = &python;
            drivers::run(&[driver], &ctx, args.into())
        }
        Commands::Tlsssl(args) => {
            let driver: &dyn Driver = &TlsSsl;
            drivers::run(&[driver], &ctx, args.into())
        }
        Commands::All => {
            let python = Python::new(PythonTarget::Two);
            let all: [&dyn Driver; 3] = [&OpenSsl, &python, &TlsSsl];
            drivers::run(&all, &ctx, DriverOptions::all())
        }
    }
}
