#![forbid(unsafe_code)]

//! Render collaborator contract and the shallow-equality memo guard.
//!
//! [`Component`] is the seam a host rendering framework sits behind: a
//! target receives a [`Props`] bundle and draws itself however it likes.
//! The wrappers in this crate are themselves components, so they nest.
//!
//! [`Memo`] wraps any target with the guard a pure component performs:
//! render only when the incoming bundle differs from the previous one under
//! [`Props::shallow_eq`]. This guard is exactly why subscribers tag their
//! output with a version — a subscriber's cached view keeps one handle for
//! its whole life, so the view field alone never looks different here; the
//! version field is what says that data behind the stable handle moved.

use tracing::trace;

use canopy_core::Props;

// ──────────────────────────────── Component ─────────────────────────────────

/// A render target: anything that can receive a props bundle.
pub trait Component {
    fn render(&mut self, props: &Props);
}

/// Adapter turning a closure into a [`Component`].
pub struct FnComponent<F: FnMut(&Props)> {
    render: F,
}

impl<F: FnMut(&Props)> FnComponent<F> {
    pub fn new(render: F) -> Self {
        Self { render }
    }
}

impl<F: FnMut(&Props)> Component for FnComponent<F> {
    fn render(&mut self, props: &Props) {
        (self.render)(props);
    }
}

// ────────────────────────────────── Memo ────────────────────────────────────

/// Shallow-equality render guard around a target component.
///
/// The first render always reaches the target; after that, a bundle that is
/// [`Props::shallow_eq`] to the previously rendered one is skipped.
pub struct Memo<C: Component> {
    target: C,
    last: Option<Props>,
    renders: u64,
}

impl<C: Component> Memo<C> {
    #[must_use]
    pub fn new(target: C) -> Self {
        Self {
            target,
            last: None,
            renders: 0,
        }
    }

    /// Number of renders that reached the wrapped target.
    #[must_use]
    pub const fn render_count(&self) -> u64 {
        self.renders
    }

    #[must_use]
    pub fn target(&self) -> &C {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut C {
        &mut self.target
    }

    #[must_use]
    pub fn into_target(self) -> C {
        self.target
    }
}

impl<C: Component> Component for Memo<C> {
    fn render(&mut self, props: &Props) {
        if let Some(last) = &self.last {
            if last.shallow_eq(props) {
                trace!(renders = self.renders, "props shallow-equal, render skipped");
                return;
            }
        }
        self.last = Some(props.clone());
        self.renders += 1;
        self.target.render(props);
    }
}

// ═════════════════════════════════ Tests ════════════════════════════════════
