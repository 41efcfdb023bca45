//! Cooperative cancellation for generation runs.

mod token;

pub use token::CancellationToken;
