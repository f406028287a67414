// src/proxy/mod.rs
mod pool;
mod session;
mod upstream;

pub use pool::ServerPool;
pub use session::{ProxySession, SessionEnd, SessionError};
pub use upstream::Upstream;
