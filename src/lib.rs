//! # Si4703 Driver
//!
//! This is a driver for the Silicon Labs Si4700/01/02/03 FM radio tuner.
//!
//! Specifically, this driver handles the control registers over I²C - it
//! does not decode RDS, and it does not use the GPIO2 seek/tune-complete
//! interrupt.
//!
//! The Si4703 does not let you address individual registers. Every read
//! returns all sixteen registers (starting at `0x0A` and wrapping round) and
//! every write fills `0x02` to `0x07` in order. The [`Si4703`] object
//! therefore keeps a [`RegisterImage`] of the whole chip, and every operation
//! is a read of the whole image, a change to a few bits, and a write of the
//! whole image.
//!
//! Tuning and seeking run in the background on the chip. This driver waits
//! for them by polling the STC bit, so [`Si4703::set_channel`] and
//! [`Si4703::seek`] block until the chip is done. See [`PollLimit`] if you
//! would rather give up than wait forever.
//!
//! # Example
//!
//! You might setup the radio like this:
//!
//! ```rust
//! # struct I2c;
//! # impl embedded_hal::blocking::i2c::Read for I2c {
//! #     type Error = ();
//! #     fn read(&mut self, _address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
//! #         buffer.fill(0);
//! #         // STATUSRSSI comes first, so this sets STC
//! #         buffer[0] = 0x40;
//! #         Ok(())
//! #     }
//! # }
//! # impl embedded_hal::blocking::i2c::Write for I2c {
//! #     type Error = ();
//! #     fn write(&mut self, _address: u8, _bytes: &[u8]) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! # struct Pin;
//! # impl embedded_hal::digital::v2::OutputPin for Pin {
//! #     type Error = ();
//! #     fn set_low(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! #     fn set_high(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # struct Delay;
//! # impl embedded_hal::blocking::delay::DelayMs<u16> for Delay {
//! #     fn delay_ms(&mut self, _ms: u16) {}
//! # }
//! # let (i2c, reset_pin, mut delay) = (I2c, Pin, Delay);
//! let mut radio = si4703::Si4703::new(i2c, reset_pin);
//! radio.initialize(&mut delay)?;
//! radio.set_volume(5)?;
//! // 97.4 MHz
//! radio.set_channel(974)?;
//! radio.seek(si4703::SeekDirection::Up)?;
//! let _station = radio.get_channel()?;
//! radio.shutdown()?;
//! # Ok::<(), si4703::Error<(), ()>>(())
//! ```

#![no_std]
#![deny(unsafe_code)]
#![deny(missing_docs)]

pub mod registers;

#[cfg(test)]
mod testing;

use embedded_hal::blocking::{delay::DelayMs, i2c};
use embedded_hal::digital::v2::OutputPin;

use registers::{
    chip_id, device_id, powercfg, read_chan, status_rssi, sysconfig1, sysconfig2, test1,
};

pub use registers::{Register, RegisterImage};

//
// Public Types
//

/// Everything that can go wrong talking to the Si4703.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E, P> {
    /// An I²C read or write failed
    Bus(E),
    /// The reset pin could not be driven
    ResetPin(P),
    /// The chip did not raise STC within the configured [`PollLimit`]
    Timeout,
    /// The requested channel (MHz × 10) is outside 87.5 to 108.0 MHz
    ChannelOutOfRange(u16),
}

/// Where the chip is in its power-up sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Not yet initialised, or shut down
    Unpowered,
    /// Reset pulse sent, two-wire mode latched
    Resetting,
    /// Crystal oscillator enabled and settling
    OscillatorWarmup,
    /// Powered up with the audio path running
    Active,
}

/// Which way to seek.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SeekDirection {
    /// Towards 87.5 MHz
    Down,
    /// Towards 108 MHz
    Up,
}

/// How long to keep polling for seek/tune complete.
///
/// Each poll is one full 32-byte register read, so at 100 kHz a poll takes
/// roughly 3 ms.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollLimit {
    /// Poll until the chip says it is done, however long that takes.
    #[default]
    Unbounded,
    /// Give up with [`Error::Timeout`] after this many status reads.
    Attempts(u32),
}

/// The member of the Si470x family, from CHIPID.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Model {
    /// FM receiver
    Si4700,
    /// FM receiver with RDS
    Si4701,
    /// FM receiver, small package
    Si4702,
    /// FM receiver with RDS, small package
    Si4703,
}

/// The contents of the DEVICEID and CHIPID registers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Identity {
    /// Part number (0x1 for the Si470x family)
    pub part_number: u8,
    /// Manufacturer ID (0x242 for Silicon Labs)
    pub manufacturer_id: u16,
    /// Silicon revision (0x2 is rev B, 0x3 is rev C)
    pub revision: u8,
    /// Device code
    pub device: u8,
    /// Firmware version
    pub firmware: u8,
}

/// A printable chip version, like `B16`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
    /// Silicon revision letter, if we know it
    pub revision: Option<char>,
    /// Firmware version
    pub firmware: u8,
}

/// A snapshot of the STATUSRSSI register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Seek/tune complete
    pub seek_tune_complete: bool,
    /// The last seek failed, or stopped at the edge of the band
    pub seek_failed: bool,
    /// Receiving in stereo
    pub stereo: bool,
    /// Received signal strength, in dBµV
    pub rssi: u8,
}

/// Represents our view of an Si4703 chip, and owns the bus it is on.
pub struct Si4703<I2C, RST> {
    i2c: I2C,
    reset_pin: RST,
    bus_address: u8,
    image: RegisterImage,
    power_state: PowerState,
    poll_limit: PollLimit,
}

//
// Public Data
//

/// The Si4703's fixed 7-bit I²C address.
pub const DEFAULT_ADDRESS: u8 = 0x10;

/// The bottom of the 87.5-108 MHz band, in MHz × 10.
pub const BAND_FLOOR: u16 = 875;

/// The top of the 87.5-108 MHz band, in MHz × 10.
pub const BAND_CEILING: u16 = 1080;

/// The loudest volume setting.
pub const MAX_VOLUME: u8 = 15;

/// How long to hold reset low so the chip latches two-wire mode.
pub const RESET_HOLD_MS: u16 = 100;

/// How long the crystal oscillator needs to stabilise.
pub const OSCILLATOR_SETTLE_MS: u16 = 500;

/// How long the audio path needs after power-up.
pub const POWER_UP_MS: u16 = 110;

//
// impls on Public Types
//

impl<E, P> Error<E, P> {
    /// Is this a failure of the I²C bus?
    pub fn is_bus(&self) -> bool {
        matches!(self, Error::Bus(_))
    }
}

impl Model {
    /// Decode the device field of CHIPID.
    pub fn from_device_code(code: u8) -> Option<Model> {
        match code {
            0x9 => Some(Model::Si4703),
            0x8 => Some(Model::Si4701),
            0x1 => Some(Model::Si4702),
            0x0 => Some(Model::Si4700),
            _ => None,
        }
    }

    /// The part name, as printed on the chip.
    pub fn name(self) -> &'static str {
        match self {
            Model::Si4700 => "Si4700",
            Model::Si4701 => "Si4701",
            Model::Si4702 => "Si4702",
            Model::Si4703 => "Si4703",
        }
    }
}

impl core::fmt::Display for Model {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl Identity {
    /// Split DEVICEID and CHIPID into their fields.
    pub fn from_registers(deviceid: u16, chipid: u16) -> Identity {
        let part_number = deviceid / device_id::PART_NUMBER_RADIX;
        let manufacturer_id = deviceid % device_id::PART_NUMBER_RADIX;
        let revision = chipid / chip_id::REVISION_RADIX;
        let other = chipid % chip_id::REVISION_RADIX;
        let device = other / chip_id::DEVICE_RADIX;
        let firmware = other % chip_id::DEVICE_RADIX;
        Identity {
            part_number: part_number as u8,
            manufacturer_id,
            revision: revision as u8,
            device: device as u8,
            firmware: firmware as u8,
        }
    }

    /// Is this a Silicon Labs Si470x part at all?
    pub fn is_silicon_labs(&self) -> bool {
        self.part_number == 0x1 && self.manufacturer_id == 0x242
    }

    /// Which member of the family this is, if the device code is known.
    pub fn model(&self) -> Option<Model> {
        Model::from_device_code(self.device)
    }

    /// The silicon revision and firmware version.
    pub fn version(&self) -> Version {
        let revision = match self.revision {
            0x2 => Some('B'),
            0x3 => Some('C'),
            _ => None,
        };
        Version {
            revision,
            firmware: self.firmware,
        }
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(letter) = self.revision {
            write!(f, "{}", letter)?;
        }
        write!(f, "{}", self.firmware)
    }
}

impl Status {
    /// Decode a STATUSRSSI value.
    pub fn from_register(value: u16) -> Status {
        Status {
            seek_tune_complete: value & status_rssi::STC != 0,
            seek_failed: value & status_rssi::SFBL != 0,
            stereo: value & status_rssi::STEREO != 0,
            rssi: (value & status_rssi::RSSI_MASK) as u8,
        }
    }
}

impl<I2C, RST> Si4703<I2C, RST> {
    /// Create a new Si4703 proxy object at the usual address.
    ///
    /// Nothing is sent to the chip until you call [`Si4703::initialize`].
    pub fn new(i2c: I2C, reset_pin: RST) -> Si4703<I2C, RST> {
        Si4703::with_address(i2c, reset_pin, DEFAULT_ADDRESS)
    }

    /// Create a new Si4703 proxy object at some other address.
    pub fn with_address(i2c: I2C, reset_pin: RST, bus_address: u8) -> Si4703<I2C, RST> {
        Si4703 {
            i2c,
            reset_pin,
            bus_address,
            image: RegisterImage::new(),
            power_state: PowerState::Unpowered,
            poll_limit: PollLimit::Unbounded,
        }
    }

    /// Where we think the chip is in its power-up sequence.
    pub fn power_state(&self) -> PowerState {
        self.power_state
    }

    /// Get how long [`Si4703::set_channel`] and [`Si4703::seek`] will wait.
    pub fn poll_limit(&self) -> PollLimit {
        self.poll_limit
    }

    /// Set how long [`Si4703::set_channel`] and [`Si4703::seek`] will wait.
    pub fn set_poll_limit(&mut self, poll_limit: PollLimit) {
        self.poll_limit = poll_limit;
    }

    /// The register values from the last read, plus any changes made since.
    pub fn registers(&self) -> &RegisterImage {
        &self.image
    }

    /// Decode STATUSRSSI from the last read, without touching the bus.
    ///
    /// The chip drops STC and SFBL as soon as the driver clears SEEK or
    /// TUNE, so straight after [`Si4703::seek`] this is the only place the
    /// seek result can still be seen.
    pub fn cached_status(&self) -> Status {
        Status::from_register(self.image.get(Register::StatusRssi))
    }

    /// Give back the bus and the reset pin.
    pub fn release(self) -> (I2C, RST) {
        (self.i2c, self.reset_pin)
    }

    fn set_power_state(&mut self, power_state: PowerState) {
        #[cfg(feature = "defmt")]
        defmt::debug!("Si4703 {} -> {}", self.power_state, power_state);
        self.power_state = power_state;
    }
}

impl<I2C, RST, E, P> Si4703<I2C, RST>
where
    I2C: i2c::Read<Error = E> + i2c::Write<Error = E>,
    RST: OutputPin<Error = P>,
{
    /// Reset the chip and power it up.
    ///
    /// This takes at least 710 ms. Any failure part-way through leaves the
    /// chip in an unknown state - reset it again rather than carrying on.
    ///
    /// Note that the chip only picks two-wire mode if SDIO is low when reset
    /// goes high; that is up to the board.
    pub fn initialize<D>(&mut self, delay: &mut D) -> Result<(), Error<E, P>>
    where
        D: DelayMs<u16>,
    {
        self.set_power_state(PowerState::Resetting);
        self.reset_pin.set_low().map_err(Error::ResetPin)?;
        delay.delay_ms(RESET_HOLD_MS);
        self.reset_pin.set_high().map_err(Error::ResetPin)?;

        // The registers are readable even before the chip is powered up
        self.read()?;
        self.image.set_bits(Register::Test1, test1::XOSCEN);
        self.write()?;
        self.set_power_state(PowerState::OscillatorWarmup);
        delay.delay_ms(OSCILLATOR_SETTLE_MS);

        self.read()?;
        self.image
            .set_bits(Register::PowerCfg, powercfg::DMUTE | powercfg::ENABLE);
        // 50 µs de-emphasis and 100 kHz spacing, as used in Europe and Asia
        self.image.set_bits(Register::SysConfig1, sysconfig1::DE);
        self.image.set_bits(Register::SysConfig2, sysconfig2::SPACE0);
        self.image
            .update_bits(Register::SysConfig2, 1, sysconfig2::VOLUME_MASK);
        self.write()?;
        delay.delay_ms(POWER_UP_MS);
        self.set_power_state(PowerState::Active);
        Ok(())
    }

    /// Power the chip down.
    ///
    /// The registers stay readable afterwards.
    pub fn shutdown(&mut self) -> Result<(), Error<E, P>> {
        self.read()?;
        // ENABLE and DISABLE together is the documented power-down request
        self.image
            .set_bits(Register::PowerCfg, powercfg::ENABLE | powercfg::DISABLE);
        self.write()?;
        self.set_power_state(PowerState::Unpowered);
        Ok(())
    }

    /// Tune to a channel, given in MHz × 10 (so 97.4 MHz is `974`).
    ///
    /// Blocks until the chip reports the tune is complete. Channels outside
    /// 87.5 to 108.0 MHz are rejected without touching the chip.
    pub fn set_channel(&mut self, channel: u16) -> Result<(), Error<E, P>> {
        if !(BAND_FLOOR..=BAND_CEILING).contains(&channel) {
            return Err(Error::ChannelOutOfRange(channel));
        }
        self.read()?;
        self.image.update_bits(
            Register::Channel,
            channel - BAND_FLOOR,
            registers::channel::CHAN_MASK,
        );
        self.image
            .set_bits(Register::Channel, registers::channel::TUNE);
        self.write()?;
        self.complete_command(Register::Channel, registers::channel::TUNE)
    }

    /// Get the channel the chip is actually tuned to, in MHz × 10.
    ///
    /// After a seek this is the only way to find out where it stopped.
    pub fn get_channel(&mut self) -> Result<u16, Error<E, P>> {
        self.read()?;
        let offset = self.image.bits(Register::ReadChan, read_chan::READCHAN_MASK);
        Ok(offset + BAND_FLOOR)
    }

    /// Seek to the next station in the given direction.
    ///
    /// Blocks until the chip reports the seek is complete. The seek stops at
    /// the edge of the band rather than wrapping; check
    /// [`Si4703::cached_status`] straight afterwards to see whether it found
    /// anything. Use [`Si4703::get_channel`] to find out where it stopped.
    pub fn seek(&mut self, direction: SeekDirection) -> Result<(), Error<E, P>> {
        self.read()?;
        self.image.set_bits(Register::PowerCfg, powercfg::SKMODE);
        match direction {
            SeekDirection::Up => self.image.set_bits(Register::PowerCfg, powercfg::SEEKUP),
            SeekDirection::Down => self.image.clear_bits(Register::PowerCfg, powercfg::SEEKUP),
        }
        self.image.set_bits(Register::PowerCfg, powercfg::SEEK);
        self.write()?;
        self.complete_command(Register::PowerCfg, powercfg::SEEK)
    }

    /// Seek towards 108 MHz.
    pub fn seek_up(&mut self) -> Result<(), Error<E, P>> {
        self.seek(SeekDirection::Up)
    }

    /// Seek towards 87.5 MHz.
    pub fn seek_down(&mut self) -> Result<(), Error<E, P>> {
        self.seek(SeekDirection::Down)
    }

    /// Set the volume. Values over 15 are treated as 15.
    ///
    /// Zero is silent, but the chip also has a mute - see
    /// [`Si4703::set_mute`].
    pub fn set_volume(&mut self, level: u8) -> Result<(), Error<E, P>> {
        let level = level.min(MAX_VOLUME);
        self.read()?;
        self.image
            .update_bits(Register::SysConfig2, level as u16, sysconfig2::VOLUME_MASK);
        self.write()
    }

    /// Get the current volume, from 0 to 15.
    pub fn get_volume(&mut self) -> Result<u8, Error<E, P>> {
        self.read()?;
        Ok(self.image.bits(Register::SysConfig2, sysconfig2::VOLUME_MASK) as u8)
    }

    /// Mute or unmute the audio output.
    pub fn set_mute(&mut self, muted: bool) -> Result<(), Error<E, P>> {
        self.read()?;
        // DMUTE is "disable mute", so it is set when we are *not* muted
        if muted {
            self.image.clear_bits(Register::PowerCfg, powercfg::DMUTE);
        } else {
            self.image.set_bits(Register::PowerCfg, powercfg::DMUTE);
        }
        self.write()
    }

    /// Get whether the audio output is muted.
    pub fn is_muted(&mut self) -> Result<bool, Error<E, P>> {
        self.read()?;
        Ok(!self.image.is_set(Register::PowerCfg, powercfg::DMUTE))
    }

    /// Read the signal status.
    pub fn status(&mut self) -> Result<Status, Error<E, P>> {
        self.read()?;
        Ok(Status::from_register(self.image.get(Register::StatusRssi)))
    }

    /// Read which chip this is.
    pub fn identify(&mut self) -> Result<Identity, Error<E, P>> {
        self.read()?;
        Ok(Identity::from_registers(
            self.image.get(Register::DeviceId),
            self.image.get(Register::ChipId),
        ))
    }

    /// Wait for STC, then clear the bit that started the command.
    ///
    /// The chip will not start another tune or seek until TUNE/SEEK has been
    /// cleared, so we clear it even if we gave up waiting.
    fn complete_command(&mut self, register: Register, start_bit: u16) -> Result<(), Error<E, P>> {
        let completed = match self.wait_for_stc() {
            Ok(_polls) => true,
            Err(Error::Timeout) => false,
            Err(e) => return Err(e),
        };
        self.read()?;
        self.image.clear_bits(register, start_bit);
        self.write()?;
        if completed {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    /// Read the registers until STC is set. Returns how many reads it took.
    fn wait_for_stc(&mut self) -> Result<u32, Error<E, P>> {
        let mut polls: u32 = 0;
        loop {
            if let PollLimit::Attempts(max) = self.poll_limit {
                if polls >= max {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Si4703 STC not set after {=u32} polls", polls);
                    return Err(Error::Timeout);
                }
            }
            self.read()?;
            polls = polls.saturating_add(1);
            if self.image.is_set(Register::StatusRssi, status_rssi::STC) {
                #[cfg(feature = "defmt")]
                defmt::debug!("Si4703 STC set after {=u32} polls", polls);
                return Ok(polls);
            }
        }
    }

    fn read(&mut self) -> Result<(), Error<E, P>> {
        self.image
            .read_all(&mut self.i2c, self.bus_address)
            .map_err(Error::Bus)
    }

    fn write(&mut self) -> Result<(), Error<E, P>> {
        self.image
            .write_all(&mut self.i2c, self.bus_address)
            .map_err(Error::Bus)
    }
}

//
// impls on Private Types
//

// None

//
// Tests
//
