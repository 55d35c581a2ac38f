//! The boundary to the native D2XX-style driver.
//!
//! Everything below the chip command protocol (USB transport,
//! enumeration, the EEPROM block codec, the blocking event primitive)
//! lives behind these traits. The crate never talks to hardware
//! directly; it issues commands through a [`DriverPort`] obtained from
//! a [`Driver`].

use crate::bitmode::BitMode;
use crate::eeprom::ConfigRecord;
use crate::error::Result;
use crate::event::EventMask;

/// Entry point of the native driver: opens devices by enumeration index.
pub trait Driver {
    /// Opens the device at `index`, yielding the session port.
    ///
    /// Fails with [`Error::DeviceNotFoundByIndex`](crate::Error) if no
    /// device exists at that index.
    fn open(&self, index: usize) -> Result<Box<dyn DriverPort>>;
}

/// One opened driver session.
///
/// All methods are synchronous calls into the native driver. They may
/// block briefly on transport I/O but are bounded and non-cancellable,
/// with the single exception of [`wait_for_event`], which blocks
/// indefinitely until a condition is signaled or [`wake`] is called.
///
/// The port itself carries no locking; the crate serializes every
/// command externally. Implementations must tolerate `wake` being
/// called from another thread while `wait_for_event` is parked.
///
/// [`wait_for_event`]: DriverPort::wait_for_event
/// [`wake`]: DriverPort::wake
pub trait DriverPort: Send + Sync {
    /// Identification strings reported by the device descriptor.
    fn details(&self) -> DeviceDetails;

    /// Feature set of the attached chip, detected at open time.
    fn capabilities(&self) -> Capabilities;

    /// Reads up to `len` bytes from the receive queue, blocking until
    /// they are available.
    fn read_bytes(&self, len: usize) -> Result<Vec<u8>>;

    /// Writes `data` to the transmit queue, returning the number of
    /// bytes accepted.
    fn write_bytes(&self, data: &[u8]) -> Result<usize>;

    /// Number of bytes currently waiting in the receive queue.
    fn queued_bytes(&self) -> Result<usize>;

    /// Issues the bit-mode command with an already validated mask.
    fn set_bit_mode(&self, mask: u8, mode: BitMode) -> Result<()>;

    /// Reads the instantaneous pin snapshot for the active bit mode.
    fn bit_mode(&self) -> Result<u8>;

    /// Reads and decodes the configuration block.
    ///
    /// Returns [`Error::Checksum`](crate::Error) if the device reports
    /// the block as corrupt.
    fn read_config(&self) -> Result<ConfigRecord>;

    /// Encodes and programs the full configuration block. The record
    /// has already passed field validation.
    fn write_config(&self, record: &ConfigRecord) -> Result<()>;

    /// Blocks the calling thread until at least one of the conditions
    /// in `enabled` is signaled, then returns the raw signaled bitmask.
    ///
    /// A return with an empty mask is a spurious wake (typically caused
    /// by [`wake`](DriverPort::wake)) and is not an error.
    fn wait_for_event(&self, enabled: EventMask) -> Result<EventMask>;

    /// Unblocks a thread currently parked in
    /// [`wait_for_event`](DriverPort::wait_for_event), promptly.
    ///
    /// The wake must be latched: if no thread is parked, the next wait
    /// returns immediately (with an empty mask) instead of losing the
    /// wakeup. The native auto-reset event primitive behaves this way.
    fn wake(&self);
}

/// Identification of an opened FT232x device.
#[derive(Debug, Clone)]
pub struct DeviceDetails {
    /// USB vendor ID (0x0403 for FTDI).
    pub vendor_id: u16,
    /// USB product ID identifying the chip family.
    pub product_id: u16,
    /// Unique serial number string for this device instance.
    pub serial_number: Option<String>,
    /// Human-readable product description.
    pub description: Option<String>,
}

/// Detected capabilities of the connected FT232x device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Bitwise OR of the wire values of the supported bit modes.
    pub bit_modes: u8,
}

impl Capabilities {
    /// Whether the device supports entering `mode`.
    pub fn supports(&self, mode: BitMode) -> bool {
        // Reset is leaving bit-bang, always possible.
        mode == BitMode::Reset || self.bit_modes & mode.wire_value() != 0
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        // FT232R feature set: async/sync bit-bang plus CBUS bit-bang.
        Capabilities {
            bit_modes: crate::consts::bitmode::ASYNC_BITBANG
                | crate::consts::bitmode::SYNC_BITBANG
                | crate::consts::bitmode::CBUS_BITBANG,
        }
    }
}
