//! Post-processing filters.
//!
//! A filtered subtree is drawn into a pooled offscreen target, then copied back
//! through one or more filter programs. Nested filters stack per target.

mod alpha_mask;
mod filter;
mod manager;
mod pool;
mod quad;
mod state;
mod transforms;

pub use alpha_mask::AlphaMaskFilter;
pub use filter::{Filter, FilterProgram, FilterUniform, PassThroughFilter, UniformEntry, UniformMap};
pub use manager::{FilterManager, FilterPass};
pub use pool::{PoolKey, RenderTargetPool};
pub use quad::{Quad, QUAD_INDICES};
pub use state::FilterState;
pub use transforms::{
    calculate_normalized_screen_space_matrix, calculate_screen_space_matrix, calculate_sprite_matrix,
};
