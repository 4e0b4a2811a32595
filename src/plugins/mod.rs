pub mod extractors;
pub mod notifiers;
pub mod registry;
pub mod traits;

pub use registry::{ExtractorRegistry, Platform, UnknownPlatform};
pub use traits::ProductExtractor;
