pub mod app;
pub mod cli;

pub use app::{execute, load_config, run};
pub use cli::{Cli, Command};
