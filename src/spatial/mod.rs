//! Spatial indexing.

pub mod octree;

pub use octree::{ObjectId, Octree};
