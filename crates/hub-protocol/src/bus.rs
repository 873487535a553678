//! Host Transport Abstraction
//!
//! The hub is addressed through a flat byte register window; the physical
//! bus behind it is a platform concern. Implementations must tolerate burst
//! reads of the FIFO window up to the reported byte count.

use crate::error::HubError;

/// Register-level access to the hub
pub trait HubBus: Send {
    /// Read `buf.len()` bytes starting at `reg`
    fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), HubError>;

    /// Write `data` starting at `reg`
    fn write(&mut self, reg: u8, data: &[u8]) -> Result<(), HubError>;

    /// Read a single register byte
    fn read_u8(&mut self, reg: u8) -> Result<u8, HubError> {
        let mut buf = [0u8; 1];
        self.read(reg, &mut buf)?;
        Ok(buf[0])
    }

    /// Write a single register byte
    fn write_u8(&mut self, reg: u8, value: u8) -> Result<(), HubError> {
        self.write(reg, &[value])
    }

    /// Read a little-endian u16 register pair
    fn read_u16_le(&mut self, reg: u8) -> Result<u16, HubError> {
        let mut buf = [0u8; 2];
        self.read(reg, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Write a little-endian u16 register pair
    fn write_u16_le(&mut self, reg: u8, value: u16) -> Result<(), HubError> {
        self.write(reg, &value.to_le_bytes())
    }

    /// Read a little-endian u32 register quad
    fn read_u32_le(&mut self, reg: u8) -> Result<u32, HubError> {
        let mut buf = [0u8; 4];
        self.read(reg, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

/// Read-modify-write a single register byte.
///
/// The caller is expected to hold the transport lock across the sequence.
pub fn update_u8(
    bus: &mut dyn HubBus,
    reg: u8,
    f: impl FnOnce(u8) -> u8,
) -> Result<u8, HubError> {
    let old = bus.read_u8(reg)?;
    let new = f(old);
    bus.write_u8(reg, new)?;
    Ok(new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHub;
    use crate::reg;

    #[test]
    fn test_scalar_helpers() {
        let mut hub = MockHub::new();
        hub.write_u16_le(reg::UPLOAD_ADDR_0, 0x1234).unwrap();
        assert_eq!(hub.read_u16_le(reg::UPLOAD_ADDR_0).unwrap(), 0x1234);

        hub.write_u8(reg::CHIP_CTRL, 0x02).unwrap();
        assert_eq!(hub.read_u8(reg::CHIP_CTRL).unwrap(), 0x02);
    }

    #[test]
    fn test_update_u8_sets_and_clears_bits() {
        let mut hub = MockHub::new();
        update_u8(&mut hub, reg::HOST_CTRL, |v| v | 0x20).unwrap();
        assert_eq!(hub.read_u8(reg::HOST_CTRL).unwrap() & 0x20, 0x20);
        update_u8(&mut hub, reg::HOST_CTRL, |v| v & !0x20).unwrap();
        assert_eq!(hub.read_u8(reg::HOST_CTRL).unwrap() & 0x20, 0);
    }
}
