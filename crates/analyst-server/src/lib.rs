//! Analyst Server - HTTP and command-line front end
//!
//! Loads configuration, wires the model client and sandbox into a pipeline
//! controller, and exposes it as `POST /api/` or a one-shot `run` command.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod app;
pub mod cli;
pub mod config;
pub mod http;
pub mod logging;

pub use app::{build_controller, build_controller_with, StartupError};
pub use config::{AppConfig, FileConfig, ServerSettings};
pub use http::{read_request, routes, UploadError, QUESTION_FILE};
pub use logging::init_tracing;
