//! Types shared across the AIMS crates.

mod event;
mod incident;
mod pagination;
mod provider;

pub use event::*;
pub use incident::*;
pub use pagination::*;
pub use provider::*;
