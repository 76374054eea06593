pub mod fs_server;
pub mod manager;
pub mod model;

pub use fs_server::{FsServer, FsServerFactory};
pub use manager::{Server, ServerFactory};
pub use model::*;
