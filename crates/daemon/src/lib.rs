// Record store, configuration and service wiring behind the `km` binary
pub mod database;
pub mod service_state;

// App state (configuration, paths)
pub mod state;

pub use database::{Database, DatabaseSetupError};
pub use service_state::{Documents, State as ServiceState, StateSetupError};
pub use state::{AppConfig, AppState, BlobStoreConfig, StateError};
