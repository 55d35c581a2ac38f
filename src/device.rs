//! Device session handle and serialized command issuance.

use crate::driver::{Capabilities, DeviceDetails, Driver, DriverPort};
use crate::error::{Error, Result};
use crate::event::{EventWaiter, NotificationRegistry};
use log::{debug, trace};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lock acquisition that shrugs off poisoning: a panic in another
/// thread's critical section leaves our plain data usable.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared per-session state. Owned jointly by every cloned handle and
/// by the waiter thread; dropped when the last of them goes away.
pub(crate) struct SessionInner {
    pub(crate) port: Box<dyn DriverPort>,
    /// The transport accepts one in-flight command at a time. Every
    /// device command takes this; the event wait never does.
    io_lock: Mutex<()>,
    closed: AtomicBool,
    details: DeviceDetails,
    capabilities: Capabilities,
    pub(crate) events: NotificationRegistry,
    pub(crate) waiter: EventWaiter,
}

/// A handle to an opened FT232x device session.
///
/// All I/O, bit-mode, EEPROM and event operations hang off this type.
/// Clones share the same session (the event dispatcher hands listeners
/// such a clone as the event source); the session ends on
/// [`close`](Ft232x::close), after which every command fails with
/// [`Error::Io`].
#[derive(Clone)]
pub struct Ft232x {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Ft232x {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ft232x")
            .field("details", &self.inner.details)
            .field("capabilities", &self.inner.capabilities)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Ft232x {
    // --- Session lifecycle ---

    /// Opens the device at enumeration `index` through `driver`.
    pub fn open(driver: &dyn Driver, index: usize) -> Result<Self> {
        debug!("Opening device at index {}", index);
        let port = driver.open(index)?;
        let details = port.details();
        let capabilities = port.capabilities();
        trace!("Opened {:?}, capabilities {:?}", details, capabilities);
        Ok(Ft232x {
            inner: Arc::new(SessionInner {
                port,
                io_lock: Mutex::new(()),
                closed: AtomicBool::new(false),
                details,
                capabilities,
                events: NotificationRegistry::new(),
                waiter: EventWaiter::new(),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Ft232x { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<SessionInner> {
        &self.inner
    }

    /// Identification strings reported by the device descriptor.
    pub fn device_info(&self) -> DeviceDetails {
        self.inner.details.clone()
    }

    /// Detected capabilities of the connected device.
    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    /// Whether [`close`](Ft232x::close) has been called on this session.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Ends the session: stops the event waiter (unblocking a parked
    /// wait) and fails all subsequent commands. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing device session");
        EventWaiter::stop(&self.inner);
    }

    /// Issues one device command under the session's I/O mutex.
    ///
    /// The guard never spans a wait suspension: the event waiter parks
    /// without it, so a listener issuing a command from dispatch (on
    /// the waiter thread) acquires it like any application thread.
    pub(crate) fn command<T>(&self, f: impl FnOnce(&dyn DriverPort) -> Result<T>) -> Result<T> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        let _guard = lock_unpoisoned(&self.inner.io_lock);
        f(self.inner.port.as_ref())
    }

    // --- Data I/O ---

    /// Reads up to `len` bytes from the receive queue.
    pub fn read(&self, len: usize) -> Result<Vec<u8>> {
        trace!("Reading up to {} byte(s)", len);
        self.command(|port| port.read_bytes(len))
    }

    /// Writes `data` to the transmit queue, returning the number of
    /// bytes accepted.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        trace!("Writing {} byte(s)", data.len());
        self.command(|port| port.write_bytes(data))
    }

    /// Number of bytes currently waiting in the receive queue.
    pub fn queue_status(&self) -> Result<usize> {
        self.command(|port| port.queued_bytes())
    }
}
