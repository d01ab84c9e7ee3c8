#![forbid(unsafe_code)]

//! Render scopes and hook slots.
//!
//! Each mounted component owns an ordered list of hook slots. During a
//! render the [`Scope`] hands out slots by call order: the n-th hook call
//! of every render addresses the n-th slot. Hooks must therefore be called
//! unconditionally and in the same order on every render.
//!
//! # Hooks
//!
//! | Hook | Slot contents |
//! |---|---|
//! | [`use_state`](Scope::use_state) | an [`Observable`] plus the subscription that schedules a re-render |
//! | [`use_effect`](Scope::use_effect) | the previous dependency list and the live RAII guard |
//! | [`use_memo`](Scope::use_memo) / [`use_callback`](Scope::use_callback) | the dependency list and the cached value |
//! | [`use_ref`](Scope::use_ref) | a shared mutable cell |
//!
//! # Effects
//!
//! `use_effect` only records what should happen. After the render returns,
//! the host commits recorded effects: first every stale guard is dropped
//! (teardown), then every setup runs and its guard is stored. The guard
//! lives until the dependency list changes again or the component unmounts.
//!
//! # Failure Modes
//!
//! - **Hook order changes**: the mismatched slot is reset to a fresh state
//!   so the render can finish, and the render reports
//!   [`HostError::HookOrder`](crate::HostError::HookOrder).

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::callback::Callback;
use crate::host::Host;
use crate::reactive::{Observable, Subscription, WeakObservable};

/// Identifies a mounted component within its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u64);

impl ComponentId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) type Guard = Box<dyn Any>;

pub(crate) enum Slot {
    Value(Box<dyn Any>),
    Effect {
        deps: Option<Box<dyn Any>>,
        guard: Option<Guard>,
    },
}

/// Per-component hook storage.
#[derive(Default)]
pub(crate) struct HookList {
    slots: Vec<Slot>,
    /// Set after the first render; from then on the slot count is fixed.
    sealed: bool,
}

impl HookList {
    pub(crate) fn take_guard(&mut self, index: usize) -> Option<Guard> {
        match self.slots.get_mut(index) {
            Some(Slot::Effect { guard, .. }) => guard.take(),
            _ => None,
        }
    }

    /// Store `new` in the effect slot at `index`. Returns whatever could not
    /// be stored so the caller can drop it outside the borrow.
    pub(crate) fn put_guard(&mut self, index: usize, new: Guard) -> Option<Guard> {
        match self.slots.get_mut(index) {
            Some(Slot::Effect { guard, .. }) => guard.replace(new),
            _ => Some(new),
        }
    }

    pub(crate) fn take_all(&mut self) -> Vec<Slot> {
        std::mem::take(&mut self.slots)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

pub(crate) struct PendingEffect {
    pub(crate) index: usize,
    pub(crate) setup: Box<dyn FnOnce() -> Guard>,
}

pub(crate) struct RenderOutcome {
    pub(crate) pending: Vec<PendingEffect>,
    pub(crate) violation: Option<usize>,
}

struct StateSlot<T> {
    cell: Observable<T>,
    _rerender: Subscription,
}

struct MemoSlot<D, V> {
    entry: Option<(D, V)>,
}

/// Render context handed to a component's render function.
pub struct Scope<'a> {
    host: &'a Host,
    id: ComponentId,
    hooks: &'a mut HookList,
    cursor: usize,
    first_render: bool,
    pending: Vec<PendingEffect>,
    violation: Option<usize>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(host: &'a Host, id: ComponentId, hooks: &'a mut HookList) -> Self {
        let first_render = !hooks.sealed;
        Self {
            host,
            id,
            hooks,
            cursor: 0,
            first_render,
            pending: Vec::new(),
            violation: None,
        }
    }

    pub(crate) fn finish(self) -> RenderOutcome {
        let mut violation = self.violation;
        if !self.first_render && violation.is_none() && self.cursor != self.hooks.len() {
            violation = Some(self.cursor);
        }
        self.hooks.sealed = true;
        RenderOutcome {
            pending: self.pending,
            violation,
        }
    }

    /// The host this component is mounted on.
    #[must_use]
    pub fn host(&self) -> &Host {
        self.host
    }

    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// True during the mount render.
    #[must_use]
    pub fn is_first_render(&self) -> bool {
        self.first_render
    }

    fn mark_violation(&mut self, index: usize) {
        if self.violation.is_none() {
            tracing::warn!(
                message = "hook.order",
                component = self.id.get(),
                slot = index
            );
            self.violation = Some(index);
        }
    }

    /// Claim the next slot, (re)initialising it when it is missing or holds
    /// a different kind of hook.
    fn claim(&mut self, fits: impl Fn(&Slot) -> bool, fresh: impl FnOnce() -> Slot) -> usize {
        let index = self.cursor;
        self.cursor += 1;
        match self.hooks.slots.get(index).map(&fits) {
            Some(true) => {}
            Some(false) => {
                self.mark_violation(index);
                let stale = std::mem::replace(&mut self.hooks.slots[index], fresh());
                drop(stale);
            }
            None => {
                if self.hooks.sealed {
                    self.mark_violation(index);
                }
                self.hooks.slots.push(fresh());
            }
        }
        index
    }

    fn value_slot<S: 'static>(&mut self, init: impl FnOnce() -> S) -> &mut S {
        let index = self.claim(
            |slot| matches!(slot, Slot::Value(value) if value.is::<S>()),
            || Slot::Value(Box::new(init())),
        );
        match &mut self.hooks.slots[index] {
            Slot::Value(value) => value
                .downcast_mut::<S>()
                .expect("claimed value slot always holds S"),
            Slot::Effect { .. } => unreachable!("claimed value slot is never an effect"),
        }
    }

    /// Component-local state.
    ///
    /// `init` runs on the first render only. The returned value is a clone
    /// of the current state; the setter replaces it and schedules a
    /// re-render of this component.
    pub fn use_state<T>(&mut self, init: impl FnOnce() -> T) -> (T, StateSetter<T>)
    where
        T: Clone + PartialEq + 'static,
    {
        let host = self.host.downgrade();
        let id = self.id;
        let slot = self.value_slot(move || {
            let cell = Observable::new(init());
            let rerender = cell.subscribe(move |_| {
                if let Some(host) = host.upgrade() {
                    host.mark_dirty(id);
                }
            });
            StateSlot {
                cell,
                _rerender: rerender,
            }
        });
        (
            slot.cell.get(),
            StateSetter {
                cell: slot.cell.downgrade(),
            },
        )
    }

    /// Schedule `setup` to run after this render when `deps` differ from the
    /// previous render's (always on the first render).
    ///
    /// `setup` returns a guard that is dropped when the effect is torn down.
    /// Returns `true` when the effect was scheduled.
    pub fn use_effect<D, G>(&mut self, deps: D, setup: impl FnOnce() -> G + 'static) -> bool
    where
        D: PartialEq + 'static,
        G: 'static,
    {
        let index = self.claim(
            |slot| matches!(slot, Slot::Effect { .. }),
            || Slot::Effect {
                deps: None,
                guard: None,
            },
        );
        let changed = match &mut self.hooks.slots[index] {
            Slot::Effect { deps: prev, .. } => {
                let changed = prev
                    .as_ref()
                    .and_then(|prev| prev.downcast_ref::<D>())
                    .is_none_or(|prev| *prev != deps);
                if changed {
                    *prev = Some(Box::new(deps));
                }
                changed
            }
            Slot::Value(_) => unreachable!("claimed effect slot is never a value"),
        };
        if changed {
            self.pending.push(PendingEffect {
                index,
                setup: Box::new(move || Box::new(setup()) as Guard),
            });
        }
        changed
    }

    /// Cache `compute()` until `deps` change.
    pub fn use_memo<D, V>(&mut self, deps: D, compute: impl FnOnce() -> V) -> V
    where
        D: PartialEq + 'static,
        V: Clone + 'static,
    {
        let slot = self.value_slot(|| MemoSlot::<D, V> { entry: None });
        if let Some((prev, value)) = &slot.entry {
            if *prev == deps {
                return value.clone();
            }
        }
        let value = compute();
        slot.entry = Some((deps, value.clone()));
        value
    }

    /// A [`Callback`] whose identity is stable until `deps` change.
    pub fn use_callback<D, A, R>(&mut self, deps: D, f: impl Fn(&A) -> R + 'static) -> Callback<A, R>
    where
        D: PartialEq + 'static,
        A: ?Sized + 'static,
        R: 'static,
    {
        self.use_memo(deps, move || Callback::new(f))
    }

    /// A mutable cell that persists across renders without scheduling any.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
        Rc::clone(self.value_slot(|| Rc::new(RefCell::new(init()))))
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("cursor", &self.cursor)
            .field("first_render", &self.first_render)
            .field("pending_effects", &self.pending.len())
            .finish()
    }
}

/// Writes a component's [`use_state`](Scope::use_state) cell.
///
/// Holds the cell weakly: once the component unmounts every setter becomes
/// inert.
pub struct StateSetter<T> {
    cell: WeakObservable<T>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("live", &self.cell.is_alive())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> StateSetter<T> {
    /// Replace the state. Returns `true` if the value changed, which
    /// schedules a re-render.
    pub fn set(&self, value: T) -> bool {
        self.cell.upgrade().is_some_and(|cell| cell.set(value))
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        self.cell.upgrade().is_some_and(|cell| cell.update(f))
    }

    /// Current state, or `None` once the component is gone.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.cell.upgrade().map(|cell| cell.get())
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.cell.is_alive()
    }
}
