pub mod cache;
pub mod mem;
pub mod persistent;
pub mod preferences;
pub mod traits;

pub use cache::{DashboardCache, Fetched};
pub use mem::InMemoryPrefs;
pub use persistent::FilePrefs;
pub use preferences::ClientPreferences;
pub use traits::*;
