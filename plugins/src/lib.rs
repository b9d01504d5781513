pub mod factory;
pub mod runner;
pub mod services;
pub mod sink;

pub use services::PluginServicesFactory;
