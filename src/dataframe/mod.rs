// DataFrame implementations module
pub mod base;
pub mod transform;

// Re-exports for convenience
pub use base::{format_float, Column, DataFrame};
pub use transform::DummyEncoding;
