//! Auxiliary-line bit-bang mode control.

use crate::consts;
use crate::device::Ft232x;
use crate::error::{Error, Result};
use log::debug;

/// Bit-bang mode selection.
///
/// Used with [`Ft232x::set_bit_mode`]. The direction mask that
/// accompanies the mode selects which lines are driven as outputs; which
/// of its bits are defined depends on the mode (see
/// [`defined_mask`](BitMode::defined_mask)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitMode {
    /// Normal serial/FIFO mode (bit-bang disabled).
    #[default]
    Reset,
    /// Asynchronous bit-bang on the eight data lines.
    AsyncBitbang,
    /// Synchronous bit-bang on the eight data lines.
    SyncBitbang,
    /// MPSSE engine (FT2232x-class parts only).
    Mpsse,
    /// CBUS bit-bang on the four auxiliary control lines.
    CbusBitbang,
}

impl BitMode {
    /// Wire value for the bit-mode command, as the native driver
    /// expects it.
    pub fn wire_value(self) -> u8 {
        match self {
            Self::Reset => consts::bitmode::RESET,
            Self::AsyncBitbang => consts::bitmode::ASYNC_BITBANG,
            Self::SyncBitbang => consts::bitmode::SYNC_BITBANG,
            Self::Mpsse => consts::bitmode::MPSSE,
            Self::CbusBitbang => consts::bitmode::CBUS_BITBANG,
        }
    }

    /// Direction-mask bits that are defined for this mode.
    ///
    /// `Reset` takes no mask at all, CBUS bit-bang only has the four
    /// auxiliary lanes in the low nibble, and the full-byte modes drive
    /// all eight data lines.
    pub fn defined_mask(self) -> u8 {
        match self {
            Self::Reset => 0x00,
            Self::CbusBitbang => consts::bitmode::CBUS_LANE_MASK,
            Self::AsyncBitbang | Self::SyncBitbang | Self::Mpsse => 0xFF,
        }
    }

    /// Which bits of a pin-state readback are meaningful in this mode.
    pub fn readback_mask(self) -> u8 {
        match self {
            Self::CbusBitbang => consts::bitmode::CBUS_LANE_MASK,
            _ => 0xFF,
        }
    }
}

impl Ft232x {
    // --- Bit-bang mode control ---

    /// Selects a bit-bang `mode` with the given direction `mask`.
    ///
    /// Takes effect on the physical lines immediately; there is no
    /// batching and no way back other than issuing another mode change.
    /// Fails with [`Error::InvalidConfiguration`] if the device does not
    /// support `mode` or if `mask` sets bits that are undefined for it.
    pub fn set_bit_mode(&self, mask: u8, mode: BitMode) -> Result<()> {
        if !self.capabilities().supports(mode) {
            return Err(Error::invalid_config(format!(
                "bit mode {mode:?} is not supported by this device"
            )));
        }
        let undefined = mask & !mode.defined_mask();
        if undefined != 0 {
            return Err(Error::invalid_config(format!(
                "direction mask {mask:#04X} sets bits {undefined:#04X} undefined in {mode:?} mode"
            )));
        }
        debug!("Setting bit mode {:?} with mask {:#04X}", mode, mask);
        self.command(|port| port.set_bit_mode(mask, mode))
    }

    /// Reads the instantaneous pin snapshot: input-capable line levels
    /// merged with the last commanded output mask.
    ///
    /// Every call round-trips to the device; nothing is cached. In CBUS
    /// mode only the low nibble of the returned byte is meaningful.
    pub fn bit_mode(&self) -> Result<u8> {
        self.command(|port| port.bit_mode())
    }
}
