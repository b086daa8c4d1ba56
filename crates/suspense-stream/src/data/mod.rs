pub mod cache;
pub mod loader;

pub use cache::{CacheEntry, CacheScope, DataCache, InFlight};
pub use loader::{DataLoader, Loaded, load_data, simulated_value};
