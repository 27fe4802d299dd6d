pub mod settings;

pub use settings::{BusSettings, RelaySettings, Settings, DEFAULT_CONFIG_FILE};
