/// Identity of one incarnation of the graphics context.
///
/// Device handles are only meaningful for the id they were created under. The
/// renderer owns the current id and moves to [`next`](Self::next) after a context
/// restore, which makes every handle recorded under the old id unreachable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    pub const FIRST: ContextId = ContextId(0);

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn next(self) -> ContextId {
        ContextId(self.0.wrapping_add(1))
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::FIRST
    }
}
