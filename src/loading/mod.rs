//! Batched eager loading and cycle-aware traversal

pub mod cyclic;
pub mod eager;

pub use cyclic::CyclicLoader;
pub use eager::EagerLoader;
