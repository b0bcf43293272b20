//! Record types served by the people API
//!
//! The cache is generic over its records; these are the shapes the bundled
//! CLI and tests work with.

pub mod person;

pub use person::Person;
