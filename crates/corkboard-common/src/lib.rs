//! Leaf types shared by the Corkboard core.
//!
//! Nothing in this crate performs I/O: [`position`] computes fractional sort
//! keys and [`policy`] maps board roles to the capabilities they grant.

pub mod policy;
pub mod position;

pub use policy::{Capability, Role};
pub use position::{PositionAllocator, PrecisionExhausted};
