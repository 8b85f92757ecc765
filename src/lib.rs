//! Build drivers for vendored OpenSSL, Python and tlsssl on macOS.
//!
//! Each dependency is downloaded, hash-verified, extracted, patched, compiled
//! with the system toolchain, relinked to its final install location and
//! optionally wrapped into an installer package with `pkgbuild`.
//!
//! # Architecture
//!
//! ```text
//! vendor-builder (bin)
//!     │
//!     ├── config     settings file ([DEFAULT] + [override])
//!     ├── log        LogConfig -> tracing subscriber
//!     └── drivers    OpenSsl, Python, TlsSsl
//!             │
//!             ├── fetch      curl + tar, hash-verified
//!             ├── patch      appended lines, ed scripts, diffs
//!             ├── relink     install_name_tool / otool
//!             └── package    pkgbuild
//!                     │
//!                     └── process, hash, preflight, root, filesystem
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use vendor_builder::drivers::{self, BuildContext, DriverOptions, OpenSsl};
//! use vendor_builder::Settings;
//!
//! let settings = Settings::load(Path::new("config.toml"))?;
//! let ctx = BuildContext::new(settings);
//! drivers::run(&[&OpenSsl], &ctx, DriverOptions::all())?;
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod fetch;
pub mod filesystem;
pub mod hash;
pub mod log;
pub mod package;
pub mod patch;
pub mod preflight;
pub mod process;
pub mod relink;
pub mod root;

pub use config::Settings;
pub use drivers::{BuildContext, Driver, DriverOptions};
pub use error::BuildError;
pub use log::LogConfig;
