pub mod app;
pub mod error;
pub mod library;
pub mod metadata;
pub mod player;
pub mod store;
pub mod util;
