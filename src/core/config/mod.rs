pub mod data;
pub mod io;

pub use data::{HubConfig, HUB_URL_ENV};
pub use io::ConfigError;
