pub mod loader;
pub mod schema;

pub use loader::{
    load_config, load_config_from_str, load_or_default, resolve_config_path, ConfigFormat,
    CONFIG_ENV_VAR,
};
pub use schema::{EngineConfig, StoreBackend};
