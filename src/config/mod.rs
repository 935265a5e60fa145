// Configuration: settings structs and the TOML loader

mod loader;
mod settings;

pub use loader::{load_config, load_config_from};
pub use settings::{ClientConfig, Config, WorkerConfig};
