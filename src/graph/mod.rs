//! Graph-side logic that is independent of the storage backend.
//!
//! ## Modules
//!
//! - [`mutation`]: Compile proposed actions into an ordered `MutationBatch`
//! - [`related`]: Rank nodes reachable from a note by weighted paths

pub mod mutation;
pub mod related;

pub use mutation::{compile, CompileError, GraphMutation, MutationBatch};
pub use related::{
    rank_paths, strongest_paths, EdgeWeights, RecencyDecay, RelatedQuery, MAX_NEIGHBORHOOD_PATHS,
};
