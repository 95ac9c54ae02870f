//! Testing utilities

pub mod mocks;

pub use mocks::MockTransport;
