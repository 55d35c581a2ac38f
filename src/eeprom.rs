//! Persistent configuration (EEPROM) access.
//!
//! The on-wire block layout and its checksum are the driver's business;
//! this module owns the typed in-memory record, its field validation,
//! and the read-modify-write flow against the device.

use crate::consts;
use crate::device::Ft232x;
use crate::error::{Error, Result};
use log::debug;

/// Programmable function of a CBUS lane.
///
/// Lanes C0-C3 accept any function; C4 cannot be switched to
/// [`IoMode`](CbusFunction::IoMode) (it has no bit-bang data path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CbusFunction {
    /// Drive high while the transmitter is enabled.
    #[default]
    TxdEn,
    /// Power-on indicator.
    PwrEn,
    /// Pulse on receive activity.
    RxLed,
    /// Pulse on transmit activity.
    TxLed,
    /// Pulse on either direction of activity.
    TxRxLed,
    /// High while the device is in USB suspend.
    Sleep,
    /// 48 MHz clock output.
    Clk48,
    /// 24 MHz clock output.
    Clk24,
    /// 12 MHz clock output.
    Clk12,
    /// 6 MHz clock output.
    Clk6,
    /// General-purpose I/O, usable from CBUS bit-bang mode.
    IoMode,
    /// Strobe on bit-bang writes.
    BitbangWr,
    /// Strobe on bit-bang reads.
    BitbangRd,
}

/// UART line-inversion flags.
///
/// Each flag inverts the electrical polarity of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineInverts {
    pub txd: bool,
    pub rxd: bool,
    pub rts: bool,
    pub cts: bool,
    pub dtr: bool,
    pub dsr: bool,
    pub dcd: bool,
    pub ri: bool,
}

/// Typed snapshot of the device's persistent configuration block.
///
/// Materialized by [`Ft232x::eeprom_read`], mutated in memory, and
/// committed whole by [`Ft232x::eeprom_program`]; the device programs
/// the block as a unit, so there are no partial-field writes. A record
/// read back and programmed unmodified leaves the device in an
/// observably identical state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    /// USB vendor ID presented in the device descriptor.
    pub vendor_id: u16,
    /// USB product ID presented in the device descriptor.
    pub product_id: u16,
    /// Manufacturer string descriptor.
    pub manufacturer: String,
    /// Product description string descriptor.
    pub description: String,
    /// Serial number string descriptor.
    pub serial_number: String,
    /// Advertised maximum bus power draw, in mA.
    pub max_power_ma: u16,
    /// Device reports itself as self-powered.
    pub self_powered: bool,
    /// Device may wake the host from suspend.
    pub remote_wakeup: bool,
    /// Pull lines down in USB suspend.
    pub pull_down_enable: bool,
    /// Drive I/O pins at the higher current option.
    pub high_current_drive: bool,
    /// UART line polarity inversions.
    pub invert: LineInverts,
    /// Function assignment per CBUS lane (C0-C4).
    pub cbus: [CbusFunction; consts::eeprom::CBUS_LANES],
}

impl Default for ConfigRecord {
    fn default() -> Self {
        ConfigRecord {
            vendor_id: consts::FTDI_VID,
            product_id: consts::FT232R_PID,
            manufacturer: "FTDI".to_string(),
            description: "FT232R USB UART".to_string(),
            serial_number: String::new(),
            max_power_ma: 90,
            self_powered: false,
            remote_wakeup: false,
            pull_down_enable: false,
            high_current_drive: false,
            invert: LineInverts::default(),
            cbus: [
                CbusFunction::TxdEn,
                CbusFunction::PwrEn,
                CbusFunction::TxLed,
                CbusFunction::RxLed,
                CbusFunction::Sleep,
            ],
        }
    }
}

impl ConfigRecord {
    /// Checks every fixed-size field against the ranges the device
    /// accepts. Called before transmission; the first offending field
    /// is named in the error.
    pub fn validate(&self) -> Result<()> {
        if self.max_power_ma > consts::eeprom::MAX_POWER_MA {
            return Err(Error::invalid_config(format!(
                "max_power_ma {} exceeds the {} mA descriptor limit",
                self.max_power_ma,
                consts::eeprom::MAX_POWER_MA
            )));
        }
        Self::check_string("manufacturer", &self.manufacturer, consts::eeprom::MAX_MANUFACTURER_LEN)?;
        Self::check_string("description", &self.description, consts::eeprom::MAX_DESCRIPTION_LEN)?;
        Self::check_string("serial_number", &self.serial_number, consts::eeprom::MAX_SERIAL_LEN)?;
        let total = self.manufacturer.len() + self.description.len() + self.serial_number.len();
        if total > consts::eeprom::MAX_TOTAL_STRING_LEN {
            return Err(Error::invalid_config(format!(
                "string descriptors total {} bytes, the block holds {}",
                total,
                consts::eeprom::MAX_TOTAL_STRING_LEN
            )));
        }
        // C4 has no bit-bang data path.
        if self.cbus[4] == CbusFunction::IoMode {
            return Err(Error::invalid_config(
                "CBUS lane C4 cannot be assigned IoMode",
            ));
        }
        Ok(())
    }

    fn check_string(field: &str, value: &str, max: usize) -> Result<()> {
        if !value.is_ascii() {
            return Err(Error::invalid_config(format!(
                "{field} must be ASCII for the string descriptor area"
            )));
        }
        if value.len() > max {
            return Err(Error::invalid_config(format!(
                "{field} is {} bytes, limit is {max}",
                value.len()
            )));
        }
        Ok(())
    }
}

impl Ft232x {
    // --- EEPROM access ---

    /// Reads the persistent configuration block into a typed record.
    ///
    /// Fails with [`Error::Io`] on transport failure and
    /// [`Error::Checksum`] if the device reports the block corrupt.
    pub fn eeprom_read(&self) -> Result<ConfigRecord> {
        debug!("Reading EEPROM configuration block");
        self.command(|port| port.read_config())
    }

    /// Validates `record` and programs the full configuration block.
    ///
    /// The block is committed as a whole; there is no partial-field
    /// write. Fails with [`Error::InvalidConfiguration`] before any
    /// transmission if a field is out of range.
    pub fn eeprom_program(&self, record: &ConfigRecord) -> Result<()> {
        record.validate()?;
        debug!(
            "Programming EEPROM: VID={:04X} PID={:04X} '{}'",
            record.vendor_id, record.product_id, record.description
        );
        self.command(|port| port.write_config(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_is_valid() {
        assert!(ConfigRecord::default().validate().is_ok());
    }

    #[test]
    fn rejects_excess_power() {
        let record = ConfigRecord {
            max_power_ma: 501,
            ..ConfigRecord::default()
        };
        assert!(matches!(
            record.validate(),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn rejects_oversized_strings() {
        let record = ConfigRecord {
            serial_number: "S".repeat(17),
            ..ConfigRecord::default()
        };
        assert!(record.validate().is_err());

        let record = ConfigRecord {
            manufacturer: "M".repeat(32),
            description: "D".repeat(64),
            serial_number: "S".repeat(16),
            ..ConfigRecord::default()
        };
        // Each field fits, the shared string area does not.
        assert!(record.validate().is_err());
    }

    #[test]
    fn rejects_non_ascii_strings() {
        let record = ConfigRecord {
            description: "FT232R \u{2014} UART".to_string(),
            ..ConfigRecord::default()
        };
        assert!(record.validate().is_err());
    }

    #[test]
    fn rejects_iomode_on_c4() {
        let mut record = ConfigRecord::default();
        record.cbus[4] = CbusFunction::IoMode;
        assert!(record.validate().is_err());
        // The same function is fine on the bit-bang capable lanes.
        record.cbus[4] = CbusFunction::Sleep;
        record.cbus[0] = CbusFunction::IoMode;
        assert!(record.validate().is_ok());
    }
}
