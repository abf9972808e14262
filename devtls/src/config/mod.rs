mod error;
mod global_toml;

pub use global_toml::GlobalConfig;
