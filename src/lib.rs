// Library surface for the binary and the headless/integration tests.
pub mod alerts;
pub mod app;
pub mod app_dirs;
pub mod config;
pub mod gate;
pub mod history;
pub mod platform;
pub mod quotes;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod setup;
pub mod ui;
pub mod util;
