//! Probabilistic occupancy octree.
//!
//! An explicit, sparse pointer tree storing log-odds occupancy per node.
//! One tree per mapped instance; each has its own fixed voxel pitch.
//!
//! # Addressing
//!
//! ```text
//! key = floor(coord / pitch) + 32768        (per axis, u16)
//! depth 0 = root, depth 16 = finest voxel
//! node size at depth d = pitch * 2^(16 - d)
//! ```
//!
//! # Module Structure
//!
//! - [`key`]: `VoxelKey` and `KeyCoder` - coordinate/key conversion
//! - [`occupancy`]: `LogOddsModel` - hit/miss update and clamping
//! - [`node`]: `OcNode` - one tree node
//! - [`tree`]: `VoxelOctree` - update, search, prune
//! - [`leaves`]: leaf iteration with depth cap
//! - [`ray`]: key rays and ray casting
//! - [`codec`]: binary and full map serialization
//! - [`bounds`]: `DAabb3` - instance extents

pub mod bounds;
pub mod codec;
pub mod key;
pub mod leaves;
pub mod node;
pub mod occupancy;
pub mod ray;
pub mod tree;

// Re-exports
pub use bounds::DAabb3;
pub use key::{KeyCoder, VoxelKey};
pub use leaves::{LeafInfo, Leaves};
pub use node::OcNode;
pub use occupancy::{logodds, probability, LogOddsModel};
pub use ray::KeyRay;
pub use tree::{KeyExtent, VoxelOctree};
