//! External dependency implementations: ports and adapters.

pub mod catalog;
pub mod memory_kv;
pub mod memory_shelf;
pub mod ollama;
pub mod ports;
pub mod random;
pub mod redis_kv;
