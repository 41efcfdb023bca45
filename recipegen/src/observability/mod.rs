//! Observability utilities.

mod logging;
mod timer;

pub use logging::{init_tracing, LogFormat, LoggingConfig, LOG_ENV_VAR};
pub use timer::SpanTimer;
