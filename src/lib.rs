//! pjc-mc - deployment tooling for the pjc-mc tournament web application
//!
//! Three independent components share this library:
//! - Service supervisor: PID-file based start/stop/status of the web daemon
//! - Display launcher: waits for the server host to answer, then opens a kiosk browser
//! - Package builder: assembles a Debian staging tree and builds the `.deb`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │   pjc-mc     │   pjc-mc-kiosk   │   pjc-mc-pkg    │
//! ├──────────────────────────────────────────────────┤
//! │  supervisor  │     launcher     │    packaging    │
//! ├──────────────────────────────────────────────────┤
//! │            config  ·  logging                     │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod launcher;
pub mod logging;
pub mod packaging;
pub mod supervisor;

pub use config::{Config, LauncherConfig, PackageConfig, SupervisorConfig};
pub use launcher::Launcher;
pub use packaging::PackageBuilder;
pub use supervisor::Supervisor;
