//! Asynchronous event notification.
//!
//! A dedicated waiter thread per session blocks on the driver's event
//! primitive, filters the signaled conditions against the currently
//! enabled mask, and invokes registered listeners in registration order
//! on its own thread. Listeners are free to call back into the device
//! (a data-arrival handler typically reads right away); the command
//! mutex is never held while the waiter is parked, so such re-entrant
//! I/O cannot deadlock.

use crate::consts;
use crate::device::{lock_unpoisoned, Ft232x, SessionInner};
use crate::error::{Error, Result};
use log::{debug, trace, warn};
use std::ops;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

/// A bitset over the device's event conditions.
///
/// Combine with `|`; test with [`contains`](EventMask::contains). The
/// enabled set stored per session is always a subset of
/// [`EventMask::ALL`]; the reserved [`WAIT_FAULT`](EventMask::WAIT_FAULT)
/// bit only ever appears in a dispatched [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventMask(u32);

impl EventMask {
    /// One or more characters arrived in the receive queue.
    pub const RXCHAR: EventMask = EventMask(consts::events::RXCHAR);
    /// A modem status line (CTS/DSR/RI/DCD) changed state.
    pub const MODEM_STATUS: EventMask = EventMask(consts::events::MODEM_STATUS);
    /// A line status condition (OE/PE/FE/BI) was raised.
    pub const LINE_STATUS: EventMask = EventMask(consts::events::LINE_STATUS);
    /// Synthetic condition: the wait primitive itself failed and the
    /// waiter is halting. Cannot be enabled; only dispatched.
    pub const WAIT_FAULT: EventMask = EventMask(consts::events::WAIT_FAULT);
    /// Every enableable event condition.
    pub const ALL: EventMask = EventMask(consts::events::ALL);

    /// The empty mask.
    pub const fn empty() -> Self {
        EventMask(0)
    }

    /// Builds a mask from raw driver bits.
    pub const fn from_raw(bits: u32) -> Self {
        EventMask(bits)
    }

    /// Raw bit value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for EventMask {
    type Output = EventMask;
    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: EventMask) {
        self.0 |= rhs.0;
    }
}

impl ops::BitAnd for EventMask {
    type Output = EventMask;
    fn bitand(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 & rhs.0)
    }
}

/// Immutable descriptor of one wake, handed to every listener.
///
/// `triggered` is a subset of the mask that was enabled at wake time,
/// with the single exception of the synthetic
/// [`WAIT_FAULT`](EventMask::WAIT_FAULT) descriptor delivered once when
/// the wait primitive fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// The conditions that fired, filtered by the enabled mask.
    pub triggered: EventMask,
}

impl Event {
    /// Whether this is the terminal wait-failure notification.
    pub fn is_fault(&self) -> bool {
        self.triggered.contains(EventMask::WAIT_FAULT)
    }
}

/// A registered event handler.
///
/// Invoked synchronously on the waiter thread, in registration order.
/// The `device` argument is a handle onto the session that produced the
/// event; calling back into it (reads, bit-mode changes) from here is
/// supported. Returning an error does not stop dispatch to the
/// remaining listeners; it is logged and counted in the session's
/// diagnostic fault counter.
pub trait EventListener: Send + Sync {
    fn on_event(&self, device: &Ft232x, event: &Event) -> Result<()>;
}

/// Removal token returned by [`Ft232x::event_add_listener`].
///
/// Registering the same listener value twice yields two distinct ids
/// and two invocations per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Lifecycle of the per-session waiter thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    /// Not running: never started, or exited after the enabled mask
    /// drained. Restartable with [`Ft232x::event_start`].
    Idle,
    /// Parked on the driver's wait primitive.
    Waiting,
    /// Invoking listeners for one descriptor.
    Dispatching,
    /// Halted by an explicit stop, session close, or a wait failure.
    /// Restartable with [`Ft232x::event_start`].
    Stopped,
}

const STATE_IDLE: u8 = 0;
const STATE_WAITING: u8 = 1;
const STATE_DISPATCHING: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// Per-session table of enabled conditions and registered listeners.
pub(crate) struct NotificationRegistry {
    mask: AtomicU32,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn EventListener>)>>,
    next_id: AtomicU64,
    faults: AtomicUsize,
}

impl NotificationRegistry {
    pub(crate) fn new() -> Self {
        NotificationRegistry {
            mask: AtomicU32::new(0),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            faults: AtomicUsize::new(0),
        }
    }

    pub(crate) fn mask(&self) -> EventMask {
        EventMask(self.mask.load(Ordering::Acquire))
    }

    /// ORs `mask` into the enabled set, returning the new value.
    pub(crate) fn enable(&self, mask: EventMask) -> EventMask {
        EventMask(self.mask.fetch_or(mask.0, Ordering::AcqRel) | mask.0)
    }

    /// Clears the bits of `mask`, returning what remains enabled.
    pub(crate) fn disable(&self, mask: EventMask) -> EventMask {
        EventMask(self.mask.fetch_and(!mask.0, Ordering::AcqRel) & !mask.0)
    }

    pub(crate) fn add(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock_unpoisoned(&self.listeners).push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = lock_unpoisoned(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Snapshot of the table in registration order. Dispatch iterates
    /// the snapshot so listeners can mutate the registry re-entrantly.
    fn snapshot(&self) -> Vec<(ListenerId, Arc<dyn EventListener>)> {
        lock_unpoisoned(&self.listeners).clone()
    }

    fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fault_count(&self) -> usize {
        self.faults.load(Ordering::Relaxed)
    }
}

/// Thread control block for the session's event waiter.
pub(crate) struct EventWaiter {
    state: AtomicU8,
    stop: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
    /// Id of the live waiter thread, written at loop entry. Lets a stop
    /// issued from inside a listener detect itself without touching the
    /// join slot (self-join would deadlock).
    thread_id: Mutex<Option<ThreadId>>,
}

impl EventWaiter {
    pub(crate) fn new() -> Self {
        EventWaiter {
            state: AtomicU8::new(STATE_IDLE),
            stop: AtomicBool::new(false),
            thread: Mutex::new(None),
            thread_id: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> WaiterState {
        match self.state.load(Ordering::Acquire) {
            STATE_WAITING => WaiterState::Waiting,
            STATE_DISPATCHING => WaiterState::Dispatching,
            STATE_STOPPED => WaiterState::Stopped,
            _ => WaiterState::Idle,
        }
    }

    fn set_state(&self, state: WaiterState) {
        let value = match state {
            WaiterState::Idle => STATE_IDLE,
            WaiterState::Waiting => STATE_WAITING,
            WaiterState::Dispatching => STATE_DISPATCHING,
            WaiterState::Stopped => STATE_STOPPED,
        };
        self.state.store(value, Ordering::Release);
    }

    /// Spawns the waiter thread for `session`. No-op if it is already
    /// running; fails with [`Error::InvalidArgument`] when nothing is
    /// enabled (there would be nothing to wait for).
    pub(crate) fn start(session: &Arc<SessionInner>) -> Result<()> {
        let waiter = &session.waiter;
        if session.events.mask().is_empty() {
            return Err(Error::InvalidArgument(
                "cannot start the event waiter with an empty event mask".to_string(),
            ));
        }
        let mut slot = lock_unpoisoned(&waiter.thread);
        match waiter.state() {
            WaiterState::Waiting | WaiterState::Dispatching => return Ok(()),
            WaiterState::Idle | WaiterState::Stopped => {}
        }
        // Reap the previous run before spawning a fresh one.
        if let Some(handle) = slot.take() {
            let _ = handle.join();
        }
        waiter.stop.store(false, Ordering::Release);
        waiter.set_state(WaiterState::Waiting);
        let session = Arc::clone(session);
        let handle = thread::Builder::new()
            .name("ft232x-event-waiter".to_string())
            .spawn(move || run(session))
            .map_err(|e| Error::io(format!("failed to spawn event waiter: {e}")))?;
        *slot = Some(handle);
        Ok(())
    }

    /// Requests a stop, wakes a parked wait, and joins the thread.
    ///
    /// Safe to call from inside a listener: the waiter thread
    /// recognizes itself, skips the join, and the loop observes the
    /// stop flag once the callback returns.
    pub(crate) fn stop(session: &SessionInner) {
        let waiter = &session.waiter;
        waiter.stop.store(true, Ordering::Release);
        session.port.wake();
        if *lock_unpoisoned(&waiter.thread_id) == Some(thread::current().id()) {
            return;
        }
        let mut slot = lock_unpoisoned(&waiter.thread);
        if let Some(handle) = slot.take() {
            let _ = handle.join();
            waiter.set_state(WaiterState::Stopped);
        }
    }
}

/// The waiter loop. Runs on its own thread, one per session.
fn run(session: Arc<SessionInner>) {
    let waiter = &session.waiter;
    *lock_unpoisoned(&waiter.thread_id) = Some(thread::current().id());
    let handle = Ft232x::from_inner(Arc::clone(&session));
    debug!("Event waiter started");
    loop {
        if waiter.stop.load(Ordering::Acquire) {
            break;
        }
        let enabled = session.events.mask();
        if enabled.is_empty() {
            debug!("Enabled mask drained; event waiter going idle");
            waiter.set_state(WaiterState::Idle);
            return;
        }
        waiter.set_state(WaiterState::Waiting);
        // Parked with no crate lock held: commands from other threads
        // (and from listeners later) proceed while we block here.
        let raw = match session.port.wait_for_event(enabled) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Event wait failed: {e}; halting waiter");
                waiter.set_state(WaiterState::Dispatching);
                dispatch(
                    &handle,
                    &session,
                    Event {
                        triggered: EventMask::WAIT_FAULT,
                    },
                );
                waiter.set_state(WaiterState::Stopped);
                return;
            }
        };
        if waiter.stop.load(Ordering::Acquire) {
            break;
        }
        // Re-read the mask so a disable issued while we were parked
        // takes effect for this very wake.
        let triggered = raw & session.events.mask();
        if triggered.is_empty() {
            trace!("Spurious wake (raw {:08X})", raw.raw());
            continue;
        }
        waiter.set_state(WaiterState::Dispatching);
        dispatch(&handle, &session, Event { triggered });
    }
    debug!("Event waiter stopped");
    waiter.set_state(WaiterState::Stopped);
}

/// Invokes every listener from a snapshot, in registration order, on
/// the calling (waiter) thread. A listener failure or panic is logged,
/// counted once, and never reaches the other listeners or the loop.
fn dispatch(handle: &Ft232x, session: &SessionInner, event: Event) {
    let snapshot = session.events.snapshot();
    trace!(
        "Dispatching {:08X} to {} listener(s)",
        event.triggered.raw(),
        snapshot.len()
    );
    for (id, listener) in snapshot {
        match catch_unwind(AssertUnwindSafe(|| listener.on_event(handle, &event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                session.events.record_fault();
                warn!("Listener {:?} failed on event {:08X}: {}", id, event.triggered.raw(), e);
            }
            Err(_) => {
                session.events.record_fault();
                warn!("Listener {:?} panicked on event {:08X}", id, event.triggered.raw());
            }
        }
    }
}

impl Ft232x {
    // --- Event notification ---

    /// Enables the event classes in `mask`, ORing them into the stored
    /// set. Takes effect immediately; a waiter already parked picks the
    /// change up on its next mask read.
    ///
    /// Fails with [`Error::InvalidArgument`] if `mask` contains bits
    /// outside [`EventMask::ALL`] (the fault bit is reserved).
    pub fn event_enable(&self, mask: EventMask) -> Result<()> {
        if !EventMask::ALL.contains(mask) {
            return Err(Error::InvalidArgument(format!(
                "event mask {:08X} contains reserved bits",
                mask.raw()
            )));
        }
        let now = self.inner().events.enable(mask);
        trace!("Enabled events {:08X}, mask now {:08X}", mask.raw(), now.raw());
        Ok(())
    }

    /// Disables the event classes in `mask` (AND-NOT on the stored
    /// set). Disabling bits that are not set is a no-op, so the call is
    /// idempotent.
    ///
    /// When this empties the mask, a parked waiter is woken so it winds
    /// down to [`WaiterState::Idle`] instead of staying blocked on a
    /// future event. This is the shutdown path for a session.
    pub fn event_disable(&self, mask: EventMask) {
        let remaining = self.inner().events.disable(mask);
        trace!("Disabled events {:08X}, mask now {:08X}", mask.raw(), remaining.raw());
        if remaining.is_empty() {
            self.inner().port.wake();
        }
    }

    /// The currently enabled event mask.
    pub fn event_mask(&self) -> EventMask {
        self.inner().events.mask()
    }

    /// Registers `listener`, appending it to the dispatch order.
    /// Duplicate registrations are permitted and invoked per
    /// registration. Returns the token for
    /// [`event_remove_listener`](Ft232x::event_remove_listener).
    pub fn event_add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.inner().events.add(listener)
    }

    /// Removes a previously registered listener. Returns `false` if the
    /// token was already removed.
    pub fn event_remove_listener(&self, id: ListenerId) -> bool {
        self.inner().events.remove(id)
    }

    /// Starts the background event waiter for this session.
    ///
    /// Fails with [`Error::InvalidArgument`] if the enabled mask is
    /// empty and with [`Error::Io`] if the session is closed. Calling
    /// it while the waiter runs is a no-op. After a stop or a wait
    /// fault this spawns a fresh waiter (restart is always an explicit
    /// caller action).
    pub fn event_start(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        EventWaiter::start(self.inner())
    }

    /// Stops the background waiter, unblocking a parked wait promptly,
    /// and waits for the thread to finish. Idempotent; callable from
    /// inside a listener (the join is skipped there and the waiter
    /// winds down as soon as the callback returns).
    pub fn event_stop(&self) {
        EventWaiter::stop(self.inner());
    }

    /// Current lifecycle state of the event waiter.
    pub fn event_state(&self) -> WaiterState {
        self.inner().waiter.state()
    }

    /// Number of listener failures (errors or panics) recorded by
    /// dispatch since the session opened.
    pub fn event_fault_count(&self) -> usize {
        self.inner().events.fault_count()
    }
}
