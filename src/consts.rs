//! Internal constants, wire values, and field limits.

// Default Vendor/Product IDs
/// FTDI vendor ID for FT232x devices.
pub const FTDI_VID: u16 = 0x0403;

/// Default product ID for the FT232R / FT245R family.
pub const FT232R_PID: u16 = 0x6001;

// --- Bit mode wire values (SIO_SET_BITMODE request, high byte) ---
pub mod bitmode {
    pub const RESET: u8 = 0x00;
    pub const ASYNC_BITBANG: u8 = 0x01;
    pub const MPSSE: u8 = 0x02;
    pub const SYNC_BITBANG: u8 = 0x04;
    pub const CBUS_BITBANG: u8 = 0x20;

    /// Direction-mask bits defined in CBUS bit-bang mode. Only the four
    /// CBUS lanes exist; bits 4-7 are undefined and rejected.
    pub const CBUS_LANE_MASK: u8 = 0x0F;
}

// --- Event condition bits (wait-notification mask) ---
pub mod events {
    /// One or more characters arrived in the receive queue.
    pub const RXCHAR: u32 = 0x0000_0001;
    /// A modem status line (CTS/DSR/RI/DCD) changed state.
    pub const MODEM_STATUS: u32 = 0x0000_0002;
    /// A line status condition (OE/PE/FE/BI) was raised.
    pub const LINE_STATUS: u32 = 0x0000_0004;

    /// Synthetic condition reported when the wait primitive itself
    /// fails. Never part of an enabled mask; reserved bit.
    pub const WAIT_FAULT: u32 = 0x8000_0000;

    /// All real (non-synthetic) event conditions.
    pub const ALL: u32 = RXCHAR | MODEM_STATUS | LINE_STATUS;
}

// --- EEPROM record field limits (FT232R configuration block) ---
pub mod eeprom {
    /// Maximum bus power draw the descriptor may advertise, in mA.
    pub const MAX_POWER_MA: u16 = 500;

    /// String descriptor limits in bytes. Manufacturer, description and
    /// serial share one string area in the block, so a combined limit
    /// applies on top of the per-field ones.
    pub const MAX_MANUFACTURER_LEN: usize = 32;
    pub const MAX_DESCRIPTION_LEN: usize = 64;
    pub const MAX_SERIAL_LEN: usize = 16;
    pub const MAX_TOTAL_STRING_LEN: usize = 96;

    /// Number of CBUS lanes with a programmable function.
    pub const CBUS_LANES: usize = 5;
}
