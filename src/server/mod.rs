// src/server/mod.rs
mod balancer;
mod tracker;

pub use balancer::{Balancer, ShutdownError};
pub use tracker::{SessionGuard, SessionTracker};
