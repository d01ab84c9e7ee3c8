#![forbid(unsafe_code)]

//! Component host: mounting, re-rendering and unmounting.
//!
//! A [`Host`] owns the global [`EventSource`], the [`TimerQueue`] and the
//! registry of mounted components. Everything runs on one thread; the host
//! advances only when its owner calls into it.
//!
//! # Turns
//!
//! Every entry point is a complete, synchronous turn:
//!
//! 1. [`dispatch()`](Host::dispatch) delivers one event to its listeners;
//!    [`pump()`](Host::pump) fires due timers, one at a time.
//! 2. Listener and timer callbacks write component state. Writes that
//!    change a value put the component on the dirty queue.
//! 3. [`flush()`](Host::flush) re-renders dirty components in FIFO order
//!    and commits their effects (teardowns, then setups).
//!
//! A timer firing is followed by a flush before the next timer fires, so a
//! re-render that restarts a timer takes effect immediately.
//!
//! # Time
//!
//! On the wall clock, call [`pump()`](Host::pump) from the owner's event
//! loop. On a [`LabClock`], [`advance()`](Host::advance) moves time from
//! deadline to deadline and pumps at each one.
//!
//! # Failure Modes
//!
//! - **Render loop**: a flush that performs more than
//!   `max_renders_per_flush` renders returns [`HostError::RenderLoop`] and
//!   drops the remaining dirty queue.
//! - **Panics** in render functions, listeners or timer callbacks propagate
//!   to the caller of the entry point. The host stays usable.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};
use tracing::field::Empty;
use vhooks_core::clock::{Clock, LabClock};
use vhooks_core::event::Event;
use web_time::{Duration, Instant};

use crate::component::{ComponentId, HookList, PendingEffect, Scope};
use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::event_source::EventSource;
use crate::timer::TimerQueue;

trait Mounted {
    fn render(&self, host: &Host) -> Result<()>;
}

#[derive(Default)]
struct DirtyQueue {
    order: VecDeque<ComponentId>,
    queued: AHashSet<ComponentId>,
}

pub(crate) struct HostInner {
    config: HostConfig,
    clock: Clock,
    events: EventSource,
    timers: TimerQueue,
    components: RefCell<AHashMap<ComponentId, Rc<dyn Mounted>>>,
    dirty: RefCell<DirtyQueue>,
    next_component: Cell<u64>,
    flushing: Cell<bool>,
}

impl HostInner {
    pub(crate) fn mark_dirty(&self, id: ComponentId) {
        let mut dirty = self.dirty.borrow_mut();
        if dirty.queued.insert(id) {
            dirty.order.push_back(id);
        }
    }

    fn pop_dirty(&self) -> Option<ComponentId> {
        let mut dirty = self.dirty.borrow_mut();
        let id = dirty.order.pop_front()?;
        dirty.queued.remove(&id);
        Some(id)
    }

    fn clear_dirty(&self) {
        let mut dirty = self.dirty.borrow_mut();
        dirty.order.clear();
        dirty.queued.clear();
    }
}

/// Resets the re-entrancy flag even when a render panics.
struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Single-threaded component host.
///
/// Cloning creates a new handle to the same host.
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.inner.config)
            .field("lab_clock", &self.inner.clock.is_lab())
            .field("mounted", &self.mounted_count())
            .field("events", &self.inner.events)
            .field("timers", &self.inner.timers)
            .finish()
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Host {
    /// A host on the wall clock with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::build(HostConfig::default(), Clock::Real)
    }

    /// A deterministic host driven by `clock`.
    #[must_use]
    pub fn lab(clock: &LabClock) -> Self {
        Self::build(HostConfig::default(), Clock::Lab(clock.clone()))
    }

    pub fn with_config(config: HostConfig, clock: Clock) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: HostConfig, clock: Clock) -> Self {
        Self {
            inner: Rc::new(HostInner {
                config,
                clock,
                events: EventSource::new(),
                timers: TimerQueue::new(),
                components: RefCell::new(AHashMap::new()),
                dirty: RefCell::new(DirtyQueue::default()),
                next_component: Cell::new(1),
                flushing: Cell::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<HostInner> {
        Rc::downgrade(&self.inner)
    }

    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    /// The global event source.
    #[must_use]
    pub fn events(&self) -> &EventSource {
        &self.inner.events
    }

    #[must_use]
    pub fn timers(&self) -> &TimerQueue {
        &self.inner.timers
    }

    #[must_use]
    pub fn mounted_count(&self) -> usize {
        self.inner.components.borrow().len()
    }

    #[must_use]
    pub fn has_pending_renders(&self) -> bool {
        !self.inner.dirty.borrow().order.is_empty()
    }

    /// Mount a component and run its first render and effects.
    ///
    /// `render` is called with a fresh [`Scope`] and the current props on
    /// every render. Dropping the returned handle unmounts the component.
    pub fn mount<P, V>(
        &self,
        props: P,
        render: impl FnMut(&mut Scope<'_>, &P) -> V + 'static,
    ) -> Result<ComponentHandle<P, V>>
    where
        P: 'static,
        V: Clone + 'static,
    {
        let id = ComponentId(self.inner.next_component.get());
        self.inner.next_component.set(id.0 + 1);

        let cell = Rc::new(ComponentCell {
            id,
            props: RefCell::new(props),
            render: RefCell::new(Box::new(render)),
            hooks: RefCell::new(HookList::default()),
            output: RefCell::new(None),
            renders: Cell::new(0),
            mounted: Cell::new(true),
        });
        self.inner
            .components
            .borrow_mut()
            .insert(id, Rc::clone(&cell) as Rc<dyn Mounted>);
        tracing::debug!(message = "host.mount", component = id.get());

        // On error the handle drops here and unmounts the component.
        let handle = ComponentHandle {
            host: self.clone(),
            cell,
        };
        handle.cell.render(self)?;
        self.flush()?;
        Ok(handle)
    }

    fn unmount(&self, id: ComponentId) {
        let removed = self.inner.components.borrow_mut().remove(&id);
        if removed.is_some() {
            tracing::debug!(message = "host.unmount", component = id.get());
        }
    }

    /// Re-render every dirty component, including components dirtied by
    /// the renders themselves. Returns the number of renders performed.
    ///
    /// Nested calls (from inside a render or effect) return `Ok(0)`; the
    /// outer flush picks up their work.
    pub fn flush(&self) -> Result<usize> {
        if self.inner.flushing.replace(true) {
            return Ok(0);
        }
        let _reset = FlushGuard(&self.inner.flushing);
        let span = tracing::debug_span!("host.flush", rendered = Empty);
        let _entered = span.enter();

        let limit = self.inner.config.max_renders_per_flush;
        let mut rendered = 0usize;
        while let Some(id) = self.inner.pop_dirty() {
            let component = self.inner.components.borrow().get(&id).cloned();
            let Some(component) = component else {
                continue;
            };
            if rendered >= limit {
                self.inner.clear_dirty();
                tracing::warn!(message = "host.render_loop", limit, component = id.get());
                return Err(HostError::RenderLoop { limit });
            }
            rendered += 1;
            component.render(self)?;
        }
        span.record("rendered", rendered as u64);
        Ok(rendered)
    }

    /// Deliver `event` to the global event source, then flush.
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &Event) -> Result<usize> {
        let invoked = self.inner.events.dispatch(event);
        self.flush()?;
        Ok(invoked)
    }

    /// Fire every timer due at the current time, flushing after each
    /// firing. Returns the number of firings.
    ///
    /// Each timer fires at most `max_timer_catch_up` times, and timers
    /// started by the pump's own callbacks or renders wait for the next
    /// pump, so the number of firings is bounded by the timers armed when
    /// the pump began.
    pub fn pump(&self) -> Result<usize> {
        let now = self.now();
        let timers = &self.inner.timers;
        timers.begin_pump();
        let mut fired = 0usize;
        while timers.fire_next(now, self.inner.config.max_timer_catch_up) {
            fired += 1;
            self.flush()?;
        }
        Ok(fired)
    }

    /// Move a lab clock forward by `delta`, firing timers at their exact
    /// deadlines along the way. Returns the number of firings.
    pub fn advance(&self, delta: Duration) -> Result<usize> {
        let lab = self.inner.clock.as_lab().ok_or(HostError::RealClock)?;
        let target = lab.now() + delta;
        let mut fired = 0;
        loop {
            let step = self
                .inner
                .timers
                .next_deadline()
                .filter(|due| *due <= target)
                .unwrap_or(target);
            lab.advance_to(step);
            fired += self.pump()?;
            if step >= target {
                break;
            }
        }
        Ok(fired)
    }
}

struct ComponentCell<P, V> {
    id: ComponentId,
    props: RefCell<P>,
    render: RefCell<Box<dyn FnMut(&mut Scope<'_>, &P) -> V>>,
    hooks: RefCell<HookList>,
    output: RefCell<Option<V>>,
    renders: Cell<u64>,
    mounted: Cell<bool>,
}

impl<P, V> ComponentCell<P, V> {
    fn commit(&self, pending: Vec<PendingEffect>) {
        if pending.is_empty() {
            return;
        }
        let stale: Vec<_> = {
            let mut hooks = self.hooks.borrow_mut();
            pending
                .iter()
                .filter_map(|effect| hooks.take_guard(effect.index))
                .collect()
        };
        drop(stale);

        for effect in pending {
            let guard = (effect.setup)();
            if !self.mounted.get() {
                drop(guard);
                continue;
            }
            let leftover = self.hooks.borrow_mut().put_guard(effect.index, guard);
            drop(leftover);
        }
    }

    fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        let slots = self.hooks.borrow_mut().take_all();
        drop(slots);
        self.output.borrow_mut().take();
    }
}

impl<P: 'static, V: 'static> Mounted for ComponentCell<P, V> {
    fn render(&self, host: &Host) -> Result<()> {
        if !self.mounted.get() {
            return Ok(());
        }
        let (output, outcome) = {
            let props = self.props.borrow();
            let mut render = self.render.borrow_mut();
            let mut hooks = self.hooks.borrow_mut();
            let mut scope = Scope::new(host, self.id, &mut hooks);
            let output = (*render)(&mut scope, &props);
            (output, scope.finish())
        };
        *self.output.borrow_mut() = Some(output);
        self.renders.set(self.renders.get() + 1);
        self.commit(outcome.pending);

        match outcome.violation {
            Some(slot) => Err(HostError::HookOrder {
                component: self.id,
                slot,
            }),
            None => Ok(()),
        }
    }
}

/// Owner handle for a mounted component.
///
/// Dropping the handle unmounts the component: every effect guard is
/// dropped (listeners removed, timers stopped) and all state is released.
pub struct ComponentHandle<P: 'static, V: 'static> {
    host: Host,
    cell: Rc<ComponentCell<P, V>>,
}

impl<P: 'static, V: Clone + 'static> ComponentHandle<P, V> {
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.cell.id
    }

    /// Output of the latest render; `None` once unmounted.
    #[must_use]
    pub fn output(&self) -> Option<V> {
        self.cell.output.borrow().clone()
    }

    /// Number of completed renders.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.cell.renders.get()
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.cell.mounted.get()
    }

    /// Replace the props and re-render.
    pub fn set_props(&self, props: P) -> Result<()> {
        self.update_props(|current| *current = props)
    }

    /// Edit the props in place and re-render.
    pub fn update_props(&self, edit: impl FnOnce(&mut P)) -> Result<()> {
        if !self.is_mounted() {
            return Err(HostError::Unmounted {
                component: self.cell.id,
            });
        }
        edit(&mut self.cell.props.borrow_mut());
        self.host.inner.mark_dirty(self.cell.id);
        self.host.flush().map(|_| ())
    }

    /// Unmount now. Equivalent to dropping the handle.
    pub fn unmount(self) {
        drop(self);
    }
}

impl<P: 'static, V: 'static> Drop for ComponentHandle<P, V> {
    fn drop(&mut self) {
        self.host.unmount(self.cell.id);
        self.cell.unmount();
    }
}

impl<P: fmt::Debug + 'static, V: fmt::Debug + 'static> fmt::Debug for ComponentHandle<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.cell.id)
            .field("props", &self.cell.props.borrow())
            .field("output", &self.cell.output.borrow())
            .field("renders", &self.cell.renders.get())
            .field("mounted", &self.cell.mounted.get())
            .finish()
    }
}
