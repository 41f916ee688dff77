pub mod args;
pub mod config;
pub mod logger;
pub mod panic;
pub mod server;

pub use args::{parse, Args, LogFormat};
pub use config::init_config;
pub use logger::init_logging;
pub use panic::install_panic_hook;
pub use server::{run_server, serve};
