pub mod watcher;

// Re-export all configuration types and functions
pub use self::load::*;
pub use self::store::*;
pub use self::types::*;

// Internal organization of config submodules
mod load;
mod store;
mod types;
