mod app;
mod commands;
mod config;
mod context;
mod dispatch;
mod env;
mod feedback;
mod runtime;
mod scan;

pub use app::run;
pub use env::CliArgs;
pub use runtime::{default_data_dir, resolve_config_path};
