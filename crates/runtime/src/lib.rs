//! Process runtime utilities for Etherscribe.

pub mod shutdown;


pub use shutdown::{Interrupt, ShutdownSignal, run_until_shutdown};
