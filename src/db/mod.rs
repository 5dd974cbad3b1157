pub mod controller;
pub mod server;

pub use controller::DbController;
pub use server::{ConnectionState, ServerConfig};
