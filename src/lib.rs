pub mod core;
pub mod features;
pub mod http;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use crate::core::content_quality;
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::AppState;

pub use features::reputation;
pub use tools::{batch_scrape, normalize, pipeline};
