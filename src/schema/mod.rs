//! The subset of the Model Context Protocol schema served by this crate.

pub mod jsonrpc;
pub mod requests;

mod lifecycle;
mod resources;
mod tools;

pub use jsonrpc::*;
pub use lifecycle::*;
pub use requests::*;
pub use resources::*;
pub use tools::*;
