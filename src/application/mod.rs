pub mod commands;
pub mod extractor;
pub mod loader;
pub mod ports;
pub mod use_cases;
