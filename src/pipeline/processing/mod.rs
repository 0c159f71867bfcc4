// Pipeline processing: section location, row extraction, validation and table building

pub mod anomaly;
pub mod builder;
pub mod extractor;
pub mod locator;
