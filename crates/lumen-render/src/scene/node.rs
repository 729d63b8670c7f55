use crate::coords::Rect;
use crate::render::{Renderer, TextureKey};

/// A node of the external scene graph, as seen by the renderer.
///
/// The renderer never walks the graph itself: it calls [`render`](Self::render)
/// on the node it was given, and the node draws itself and its children through
/// the renderer (draw commands, filter and mask pushes).
pub trait SceneNode {
    /// Recomputes world transforms of the subtree before drawing.
    fn update_transform(&mut self) {}

    fn render(&self, renderer: &mut Renderer);

    /// World-space bounds of the subtree.
    fn bounds(&self) -> Rect;

    /// Explicit area for filters, overriding [`bounds`](Self::bounds).
    fn filter_area(&self) -> Option<Rect> {
        None
    }

    /// Texture the node draws, if any.
    fn texture(&self) -> Option<TextureKey> {
        None
    }

    fn visit_children(&self, _visit: &mut dyn FnMut(&dyn SceneNode)) {}
}
