pub mod cli;
pub mod config;
pub mod session;

pub use config::Settings;
pub use session::Session;
