//! API handlers

mod applications;
mod endpoints;
mod events;
mod health;

pub use applications::*;
pub use endpoints::*;
pub use events::*;
pub use health::*;
