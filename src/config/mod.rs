pub mod manager;
pub mod model;
pub mod toml_config;

pub use manager::ConfigProvider;
pub use model::*;
pub use toml_config::TomlConfig;
