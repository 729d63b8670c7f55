use crate::device::{Backend, BlendMode, Capability};

const BLEND: usize = 0;
const DEPTH_TEST: usize = 1;
const FRONT_FACE: usize = 2;
const CULL_FACE: usize = 3;
const BLEND_FUNC: usize = 4;

const SLOTS: usize = 5;

/// Value no real setting ever takes; forces the next setter to hit the device.
const INVALID: u8 = 32;

/// One value per tracked device flag.
pub type StateSnapshot = [u8; SLOTS];

const DEFAULT_STATE: StateSnapshot = [1, 0, 0, 0, 0];

/// Cache of fixed-function device state.
///
/// Every setter compares against the cached value and only reaches the device
/// on an actual change, so callers may set state unconditionally before each
/// draw.
#[derive(Debug, Clone)]
pub struct StateTracker {
    active: StateSnapshot,
    stack: Vec<StateSnapshot>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self { active: [INVALID; SLOTS], stack: Vec::new() }
    }

    #[inline]
    pub fn snapshot(&self) -> StateSnapshot {
        self.active
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Saves a copy of the active state.
    pub fn push(&mut self) {
        self.stack.push(self.active);
    }

    /// Restores the most recently pushed state through the regular setters.
    pub fn pop(&mut self, backend: &mut dyn Backend) {
        let Some(saved) = self.stack.pop() else {
            debug_assert!(false, "StateTracker::pop without matching push");
            log::warn!("lumen-render: state pop without matching push ignored");
            return;
        };
        self.set_state(backend, saved);
    }

    pub fn set_state(&mut self, backend: &mut dyn Backend, state: StateSnapshot) {
        self.set_blend(backend, state[BLEND] != 0);
        self.set_depth_test(backend, state[DEPTH_TEST] != 0);
        self.set_front_face(backend, state[FRONT_FACE] != 0);
        self.set_cull_face(backend, state[CULL_FACE] != 0);
        if let Some(mode) = BlendMode::from_index(state[BLEND_FUNC]) {
            self.set_blend_mode(backend, mode);
        }
    }

    pub fn set_blend(&mut self, backend: &mut dyn Backend, enabled: bool) {
        if self.swap(BLEND, enabled as u8) {
            backend.set_enabled(Capability::Blend, enabled);
        }
    }

    pub fn set_depth_test(&mut self, backend: &mut dyn Backend, enabled: bool) {
        if self.swap(DEPTH_TEST, enabled as u8) {
            backend.set_enabled(Capability::DepthTest, enabled);
        }
    }

    /// `clockwise` selects CW front faces; the default is CCW.
    pub fn set_front_face(&mut self, backend: &mut dyn Backend, clockwise: bool) {
        if self.swap(FRONT_FACE, clockwise as u8) {
            backend.set_front_face(clockwise);
        }
    }

    pub fn set_cull_face(&mut self, backend: &mut dyn Backend, enabled: bool) {
        if self.swap(CULL_FACE, enabled as u8) {
            backend.set_enabled(Capability::CullFace, enabled);
        }
    }

    pub fn set_blend_mode(&mut self, backend: &mut dyn Backend, mode: BlendMode) {
        if self.swap(BLEND_FUNC, mode.index()) {
            backend.set_blend_mode(mode);
        }
    }

    /// Forgets every cached value and re-issues the defaults: blend on, depth
    /// test off, CCW front faces, no culling, normal blending.
    pub fn reset_to_default(&mut self, backend: &mut dyn Backend) {
        self.active = [INVALID; SLOTS];
        self.set_state(backend, DEFAULT_STATE);
    }

    fn swap(&mut self, slot: usize, value: u8) -> bool {
        if self.active[slot] == value {
            return false;
        }
        self.active[slot] = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, RecordingBackend};

    fn tracker() -> (StateTracker, RecordingBackend) {
        let mut backend = RecordingBackend::new(64, 64);
        let mut state = StateTracker::new();
        state.reset_to_default(&mut backend);
        backend.log().clear();
        (state, backend)
    }

    // ── dedup ─────────────────────────────────────────────────────────────

    #[test]
    fn repeated_setter_issues_one_transition() {
        let (mut state, mut backend) = tracker();
        state.set_blend(&mut backend, false);
        state.set_blend(&mut backend, false);

        let log = backend.log();
        assert_eq!(log.count(|c| *c == DeviceCall::SetEnabled(Capability::Blend, false)), 1);
        assert_eq!(log.count(DeviceCall::is_state_change), 1);
    }

    #[test]
    fn setting_the_current_value_is_silent() {
        let (mut state, mut backend) = tracker();
        state.set_blend(&mut backend, true);
        state.set_blend_mode(&mut backend, BlendMode::Normal);
        assert!(backend.log().calls().is_empty());
    }

    #[test]
    fn blend_mode_changes_reach_the_device() {
        let (mut state, mut backend) = tracker();
        state.set_blend_mode(&mut backend, BlendMode::Add);
        state.set_blend_mode(&mut backend, BlendMode::Add);
        assert_eq!(backend.log().calls(), vec![DeviceCall::SetBlendMode(BlendMode::Add)]);
    }

    // ── push / pop ────────────────────────────────────────────────────────

    #[test]
    fn push_then_pop_without_changes_is_silent() {
        let (mut state, mut backend) = tracker();
        state.push();
        state.pop(&mut backend);
        assert!(backend.log().calls().is_empty());
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn pop_restores_only_changed_flags() {
        let (mut state, mut backend) = tracker();
        state.push();
        state.set_cull_face(&mut backend, true);
        state.set_blend_mode(&mut backend, BlendMode::Screen);
        backend.log().clear();

        state.pop(&mut backend);
        assert_eq!(
            backend.log().calls(),
            vec![
                DeviceCall::SetEnabled(Capability::CullFace, false),
                DeviceCall::SetBlendMode(BlendMode::Normal),
            ]
        );
        assert_eq!(state.snapshot(), DEFAULT_STATE);
    }

    // ── reset ─────────────────────────────────────────────────────────────

    #[test]
    fn reset_reissues_every_flag() {
        let (mut state, mut backend) = tracker();
        state.reset_to_default(&mut backend);
        assert_eq!(backend.log().count(DeviceCall::is_state_change), SLOTS);
    }
}
