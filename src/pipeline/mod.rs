pub mod analyzer;
pub mod collector;
pub mod manager;
pub mod reporter;
pub mod scorer;
