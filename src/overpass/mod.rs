pub mod client;
pub mod discovery;
pub mod geometry;
pub mod query;

pub use client::OverpassClient;
pub use discovery::{discover, LevelRange};
