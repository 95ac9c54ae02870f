//! Observability for the GNSS gateway
//!
//! Structured logging only; the gateway's observable output contract
//! (one dispatch line per message on stdout) lives in `dispatch`.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
