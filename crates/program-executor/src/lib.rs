//! Host-local program installation and process lifecycle
//!
//! A [`Program`] is the fully rendered descriptor of one task. This crate
//! lays out its job root, links it to a package from the content-addressed
//! cache, writes its configs, and starts, stops and hooks its process.

pub mod error;
pub mod hooks;
pub mod package;
pub mod process;
pub mod program;

pub use error::{Error, InstallError, ProcessError, Result};
pub use package::{HttpFetcher, LocalDirFetcher, PackageCache, PackageFetcher, PackageRef};
pub use process::{LifecycleTimeouts, is_alive};
pub use program::{InstallMode, Program, ProgramStatus};
