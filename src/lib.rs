//! # ft232x-d2xx
//!
//! A Rust crate for controlling FTDI FT232x-class USB-to-serial bridge
//! devices through a D2XX-style native driver: CBUS/GPIO bit-bang mode,
//! EEPROM configuration, and asynchronous event notification.
//!
//! The native driver itself (USB transport, enumeration, the chip
//! command wire protocol, the EEPROM block codec) is reached through
//! the [`driver`] traits and is not part of this crate. Anything that
//! implements [`driver::Driver`] (a vendor library binding, a test
//! double) plugs in underneath.
//!
//! ## Features
//!
//! *   Session handling (`open`, `close`, `device_info`, `capabilities`).
//! *   Data I/O (`read`, `write`, `queue_status`).
//! *   Bit-bang mode control with mode/mask validation
//!     (`set_bit_mode`, `bit_mode`), including CBUS bit-bang on the
//!     four auxiliary control lines.
//! *   Typed EEPROM read-modify-write (`eeprom_read`,
//!     `eeprom_program`) with field validation before commit.
//! *   Event notification without busy-polling: enable event classes
//!     (`event_enable` / `event_disable`), register listeners, start a
//!     background waiter (`event_start`) that dispatches
//!     [`Event`] descriptors in registration order. Listeners may call
//!     back into the device from the callback; the crate serializes
//!     every device command on one internal mutex that is never held
//!     across the blocking wait.
//!
//! ## Concurrency model
//!
//! One waiter thread per session blocks on the driver's event
//! primitive; application threads issue commands concurrently. The
//! underlying transport accepts a single in-flight command, so every
//! command takes the session's I/O mutex. Stopping the waiter
//! (`event_stop`, `close`, or disabling every event class) wakes a
//! parked wait promptly rather than waiting for a future device event.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ft232x_d2xx::{driver::Driver, Event, EventListener, EventMask, Ft232x, Result};
//!
//! struct RxDump;
//!
//! impl EventListener for RxDump {
//!     fn on_event(&self, device: &Ft232x, event: &Event) -> Result<()> {
//!         if event.triggered.contains(EventMask::RXCHAR) {
//!             let queued = device.queue_status()?;
//!             let data = device.read(queued)?;
//!             println!("RX event: {:02X?}", data);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! fn demo(driver: &dyn Driver) -> Result<()> {
//!     let device = Ft232x::open(driver, 0)?;
//!
//!     device.event_add_listener(Arc::new(RxDump));
//!     device.event_enable(EventMask::RXCHAR | EventMask::MODEM_STATUS)?;
//!     device.event_start()?;
//!
//!     // ... application work; events arrive on the waiter thread ...
//!
//!     device.event_disable(EventMask::ALL);
//!     device.close();
//!     Ok(())
//! }
//! ```
//!
//! ## CBUS bit-bang
//!
//! ```no_run
//! use ft232x_d2xx::{BitMode, Ft232x, Result};
//!
//! fn blink(device: &Ft232x) -> Result<()> {
//!     // Drive CBUS lanes 0 and 1 as outputs.
//!     device.set_bit_mode(0x03, BitMode::CbusBitbang)?;
//!     let snapshot = device.bit_mode()?; // low nibble = lane levels
//!     device.set_bit_mode(snapshot ^ 0x03, BitMode::CbusBitbang)?;
//!     device.set_bit_mode(0, BitMode::Reset)
//! }
//! ```
//!
//! ## License
//!
//! This project is licensed under the WTFPL - see the [LICENSE](LICENSE) file for details.

// Make internal modules private, re-export public types
mod bitmode;
mod consts;
mod device;
pub mod driver;
mod eeprom;
mod error;
mod event;

pub use bitmode::BitMode;
pub use device::Ft232x;
pub use eeprom::{CbusFunction, ConfigRecord, LineInverts};
pub use error::{Error, Result};
pub use event::{Event, EventListener, EventMask, ListenerId, WaiterState};
// Re-export only essential public constants
pub use consts::{FT232R_PID, FTDI_VID};
