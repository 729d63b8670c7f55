use std::fmt;
use std::rc::Rc;

use crate::coords::Rect;
use crate::render::target::RenderTargetKey;

use super::filter::Filter;

/// One level of a target's filter stack.
///
/// The bottom entry of every stack describes the target itself and carries no
/// filters; each pushed entry owns the pooled target its subtree renders into.
#[derive(Clone)]
pub struct FilterState {
    pub render_target: RenderTargetKey,
    /// World area captured, padded.
    pub source_frame: Rect,
    /// Area of `render_target` the capture lands in.
    pub destination_frame: Rect,
    /// Footprint of the filtered node before fitting and padding.
    pub target_area: Rect,
    pub resolution: f32,
    pub padding: f32,
    pub filters: Vec<Rc<dyn Filter>>,
}

impl FilterState {
    /// Bottom entry covering all of `target`.
    pub fn base(target: RenderTargetKey, frame: Rect) -> Self {
        Self {
            render_target: target,
            source_frame: frame,
            destination_frame: frame,
            target_area: frame,
            resolution: 1.0,
            padding: 0.0,
            filters: Vec::new(),
        }
    }
}

impl fmt::Debug for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterState")
            .field("render_target", &self.render_target)
            .field("source_frame", &self.source_frame)
            .field("destination_frame", &self.destination_frame)
            .field("resolution", &self.resolution)
            .field("padding", &self.padding)
            .field("filters", &self.filters.len())
            .finish()
    }
}
