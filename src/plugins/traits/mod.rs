pub mod extractor;

pub use extractor::ProductExtractor;
