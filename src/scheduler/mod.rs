//! Background maintenance tasks.

mod retention;

pub use retention::*;
