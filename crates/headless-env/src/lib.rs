//! Reset/step environment over a headless simulation worker
//!
//! This crate provides:
//! - [`HeadlessEnv`]: one episode per worker process, with the terminal-reset
//!   retry and fixed-shape observations
//! - [`BlockingEnv`]: the same surface for synchronous callers
//! - [`EnvConfig`]: handshake parameters, buffer shapes and reply deadlines

pub mod blocking;
pub mod config;
pub mod env;

pub use blocking::BlockingEnv;
pub use config::EnvConfig;
pub use env::HeadlessEnv;

pub use headless_bridge::{LaunchSpec, Launcher, TsxLauncher};
