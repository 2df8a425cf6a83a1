pub mod config;
pub mod constants;
pub mod derive;
pub mod error;
pub mod join;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod types;
