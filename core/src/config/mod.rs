mod load;
mod types;

pub use load::{apply_overrides, expand_paths, get_data_dir, load_default, load_from_path};
pub use types::{
    AppConfig, BroadcastConfig, CompatLayerConfig, ControlConfig, DisplayConfig, EventsOutConfig,
    LimitsConfig, LoggingConfig, PlatformConfig, ValidationConfig,
};
