//! The Si4703 register map and our shadow copy of it.
//!
//! The Si4703 has sixteen 16-bit registers but no register address pointer.
//! A read always streams all sixteen, starting at `0x0A` (STATUSRSSI) and
//! wrapping round to `0x00` after `0x0F`. A write always starts at `0x02`
//! (POWERCFG). We only ever write the six control registers `0x02..=0x07`.

use embedded_hal::blocking::i2c;

//
// Public Types
//

/// The set of registers in the Si4703, by logical index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Part number and manufacturer ID
    DeviceId = 0x00,
    /// Silicon revision, device and firmware version
    ChipId = 0x01,
    /// Power configuration
    PowerCfg = 0x02,
    /// Channel selection
    Channel = 0x03,
    /// System configuration 1
    SysConfig1 = 0x04,
    /// System configuration 2
    SysConfig2 = 0x05,
    /// System configuration 3
    SysConfig3 = 0x06,
    /// Test 1 (oscillator enable lives here)
    Test1 = 0x07,
    /// Test 2 (reserved)
    Test2 = 0x08,
    /// Boot configuration (reserved)
    BootConfig = 0x09,
    /// Status and RSSI
    StatusRssi = 0x0A,
    /// Read channel
    ReadChan = 0x0B,
    /// RDS block A
    RdsA = 0x0C,
    /// RDS block B
    RdsB = 0x0D,
    /// RDS block C
    RdsC = 0x0E,
    /// RDS block D
    RdsD = 0x0F,
}

/// An in-memory image of all sixteen Si4703 registers.
///
/// Nothing here talks to the chip except [`RegisterImage::read_all`] and
/// [`RegisterImage::write_all`]. Everything else works on the cached values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterImage {
    registers: [u16; NUM_REGISTERS],
}

//
// Public Data
//

/// Number of registers in the Si4703.
pub const NUM_REGISTERS: usize = 16;

/// Bytes in one full read transfer.
pub const READ_LEN: usize = NUM_REGISTERS * 2;

/// Number of registers sent in one write transfer.
pub const NUM_WRITABLE: usize = 6;

/// Bytes in one write transfer.
pub const WRITE_LEN: usize = NUM_WRITABLE * 2;

/// The register the chip starts streaming from on a read.
pub const READ_START: Register = Register::StatusRssi;

/// The register the chip starts filling on a write.
pub const WRITE_START: Register = Register::PowerCfg;

/// Bits in register 0x00 - DEVICEID
pub mod device_id {
    /// Divisor that splits DEVICEID into part number and manufacturer ID
    pub const PART_NUMBER_RADIX: u16 = 0x1000;
}

/// Bits in register 0x01 - CHIPID
pub mod chip_id {
    /// Divisor that splits off the silicon revision
    pub const REVISION_RADIX: u16 = 0x400;
    /// Divisor that splits the remainder into device and firmware
    pub const DEVICE_RADIX: u16 = 0x40;
}

/// Bits in register 0x02 - POWERCFG
pub mod powercfg {
    /// Softmute disable
    pub const SMUTE: u16 = 1 << 15;
    /// Mute disable (1 = unmuted)
    pub const DMUTE: u16 = 1 << 14;
    /// Seek mode (1 = stop at the band limit)
    pub const SKMODE: u16 = 1 << 10;
    /// Seek direction (1 = up)
    pub const SEEKUP: u16 = 1 << 9;
    /// Start a seek
    pub const SEEK: u16 = 1 << 8;
    /// Power-down. Set together with ENABLE to shut down.
    pub const DISABLE: u16 = 1 << 6;
    /// Power-up
    pub const ENABLE: u16 = 1 << 0;
}

/// Bits in register 0x03 - CHANNEL
pub mod channel {
    /// Start a tune
    pub const TUNE: u16 = 1 << 15;
    /// Channel number, in spacing steps above the band floor
    pub const CHAN_MASK: u16 = 0x03FF;
}

/// Bits in register 0x04 - SYSCONFIG1
pub mod sysconfig1 {
    /// RDS interrupt enable
    pub const RDSIEN: u16 = 1 << 15;
    /// Seek/tune complete interrupt enable
    pub const STCIEN: u16 = 1 << 14;
    /// RDS enable
    pub const RDS: u16 = 1 << 12;
    /// De-emphasis (1 = 50 µs, used outside the Americas)
    pub const DE: u16 = 1 << 11;
    /// AGC disable
    pub const AGCD: u16 = 1 << 10;
}

/// Bits in register 0x05 - SYSCONFIG2
pub mod sysconfig2 {
    /// RSSI seek threshold
    pub const SEEKTH_MASK: u16 = 0xFF00;
    /// Channel spacing, high bit
    pub const SPACE1: u16 = 1 << 5;
    /// Channel spacing, low bit (01 = 100 kHz)
    pub const SPACE0: u16 = 1 << 4;
    /// Volume, 0 to 15
    pub const VOLUME_MASK: u16 = 0x000F;
}

/// Bits in register 0x06 - SYSCONFIG3
pub mod sysconfig3 {
    /// Seek SNR threshold
    pub const SKSNR_MASK: u16 = 0x00F0;
    /// Seek FM impulse detection threshold
    pub const SKCNT_MASK: u16 = 0x000F;
}

/// Bits in register 0x07 - TEST1
pub mod test1 {
    /// Crystal oscillator enable
    pub const XOSCEN: u16 = 1 << 15;
    /// Audio high-Z enable
    pub const AHIZEN: u16 = 1 << 14;
}

/// Bits in register 0x0A - STATUSRSSI
pub mod status_rssi {
    /// RDS ready
    pub const RDSR: u16 = 1 << 15;
    /// Seek/tune complete
    pub const STC: u16 = 1 << 14;
    /// Seek fail / band limit
    pub const SFBL: u16 = 1 << 13;
    /// AFC rail
    pub const AFCRL: u16 = 1 << 12;
    /// RDS synchronised
    pub const RDSS: u16 = 1 << 11;
    /// Stereo indicator
    pub const STEREO: u16 = 1 << 8;
    /// Received signal strength, in dBµV
    pub const RSSI_MASK: u16 = 0x00FF;
}

/// Bits in register 0x0B - READCHAN
pub mod read_chan {
    /// The channel the tuner actually settled on
    pub const READCHAN_MASK: u16 = 0x03FF;
}

//
// Public Functions
//

/// Which logical register lands at word `position` of a read transfer.
pub const fn read_position_to_register(position: usize) -> usize {
    (READ_START as usize + position) % NUM_REGISTERS
}

/// Which word of a read transfer carries logical register `register`.
pub const fn register_to_read_position(register: usize) -> usize {
    (register + NUM_REGISTERS - READ_START as usize) % NUM_REGISTERS
}

/// Which logical register is filled by word `position` of a write transfer.
pub const fn write_position_to_register(position: usize) -> usize {
    WRITE_START as usize + position
}

/// Which word of a write transfer carries logical register `register`, if
/// that register is writable at all.
pub const fn register_to_write_position(register: usize) -> Option<usize> {
    let start = WRITE_START as usize;
    if register >= start && register < start + NUM_WRITABLE {
        Some(register - start)
    } else {
        None
    }
}

//
// impls on Public Types
//

impl Register {
    /// Is this one of the registers we send on a write?
    pub const fn is_writable(self) -> bool {
        register_to_write_position(self as usize).is_some()
    }
}

impl Default for RegisterImage {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterImage {
    /// Create an image with every register zeroed.
    pub const fn new() -> RegisterImage {
        RegisterImage {
            registers: [0; NUM_REGISTERS],
        }
    }

    /// Get the cached value of a register.
    pub fn get(&self, register: Register) -> u16 {
        self.registers[register as usize]
    }

    /// Replace the cached value of a register.
    ///
    /// Call [`RegisterImage::write_all`] to send it to the chip. Values put
    /// into read-only registers are never sent, and are lost on the next read.
    pub fn set(&mut self, register: Register, value: u16) {
        self.registers[register as usize] = value;
    }

    /// Get the bits of a register selected by `mask`.
    pub fn bits(&self, register: Register, mask: u16) -> u16 {
        self.get(register) & mask
    }

    /// Are all the bits in `mask` set?
    pub fn is_set(&self, register: Register, mask: u16) -> bool {
        self.bits(register, mask) == mask
    }

    /// Set the bits in `mask`.
    pub fn set_bits(&mut self, register: Register, mask: u16) {
        self.registers[register as usize] |= mask;
    }

    /// Clear the bits in `mask`.
    pub fn clear_bits(&mut self, register: Register, mask: u16) {
        self.registers[register as usize] &= !mask;
    }

    /// Replace the bits in `mask` with the matching bits of `value`.
    pub fn update_bits(&mut self, register: Register, value: u16, mask: u16) {
        // Clear the bits we want to change
        self.clear_bits(register, mask);
        // Set any bits as necessary, but only in the cleared section
        self.set_bits(register, value & mask);
    }

    /// The whole image, by logical index.
    pub fn as_array(&self) -> &[u16; NUM_REGISTERS] {
        &self.registers
    }

    /// Load all sixteen registers from a read transfer.
    pub fn decode(&mut self, block: &[u8; READ_LEN]) {
        for (position, word) in block.chunks_exact(2).enumerate() {
            let register = read_position_to_register(position);
            self.registers[register] = u16::from_be_bytes([word[0], word[1]]);
        }
    }

    /// Build a write transfer from registers 0x02 to 0x07.
    pub fn encode(&self) -> [u8; WRITE_LEN] {
        let mut block = [0u8; WRITE_LEN];
        for (position, word) in block.chunks_exact_mut(2).enumerate() {
            let register = write_position_to_register(position);
            word.copy_from_slice(&self.registers[register].to_be_bytes());
        }
        block
    }

    /// Refresh every register from the chip.
    ///
    /// If the transfer fails the image is left as it was.
    pub fn read_all<B>(&mut self, bus: &mut B, address: u8) -> Result<(), B::Error>
    where
        B: i2c::Read,
    {
        let mut block = [0u8; READ_LEN];
        bus.read(address, &mut block)?;
        self.decode(&block);
        Ok(())
    }

    /// Send registers 0x02 to 0x07 to the chip.
    ///
    /// The chip is not read back afterwards.
    pub fn write_all<B>(&self, bus: &mut B, address: u8) -> Result<(), B::Error>
    where
        B: i2c::Write,
    {
        let block = self.encode();
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Writing Si4703 0x02..=0x07 as {=[?]:#x}",
            &self.registers[WRITE_START as usize..WRITE_START as usize + NUM_WRITABLE]
        );
        bus.write(address, &block)
    }
}

//
// Tests
//
