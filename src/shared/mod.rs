pub mod config;
pub mod logging;
pub mod models;

pub use config::{ConfigChange, ConfigStore, Configuration, CookieSource, FileConfigStore};
