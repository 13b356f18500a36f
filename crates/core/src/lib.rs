//! Core types for the whale alert service.

pub mod chain;
pub mod event;
pub mod holder;
pub mod rate_limit;
pub mod webhook;

pub use chain::*;
pub use event::*;
pub use holder::*;
pub use rate_limit::*;
pub use webhook::*;
