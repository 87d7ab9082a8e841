//! A simulated Si4703 behind the `embedded-hal` traits, for unit tests.
//!
//! The bus, the reset pin and the delay all append to one shared event log,
//! so tests can check the order things happened in.

extern crate std;

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::blocking::{delay::DelayMs, i2c};
use embedded_hal::digital::v2::OutputPin;

use crate::registers::{
    channel, powercfg, read_chan, read_position_to_register, status_rssi,
    write_position_to_register, NUM_REGISTERS, NUM_WRITABLE, READ_LEN, WRITE_LEN,
};

/// Highest channel offset in the 87.5-108 MHz band at 100 kHz spacing.
pub(crate) const TOP_OF_BAND: u16 = 205;

/// DEVICEID as reported by a real part.
pub(crate) const DEVICE_ID: u16 = 0x1242;

/// CHIPID for an Si4703 rev B, firmware 10.
pub(crate) const CHIP_ID: u16 = (0x2 << 10) | (0x9 << 6) | 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    ResetLow,
    ResetHigh,
    Delay(u16),
    Read,
    Write([u16; NUM_WRITABLE]),
}

pub(crate) type EventLog = Rc<RefCell<Vec<Event>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BusFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PinFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Busy {
    Idle,
    Tuning { target: u16, polls_left: u32 },
    Seeking { target: u16, failed: bool, polls_left: u32 },
}

/// The chip's internal state.
#[derive(Debug)]
pub(crate) struct FakeChip {
    pub(crate) registers: [u16; NUM_REGISTERS],
    /// Channel offsets a seek can stop on, ascending.
    pub(crate) stations: Vec<u16>,
    /// How many status reads a tune or seek takes to complete.
    pub(crate) polls_to_complete: u32,
    /// Never raise STC.
    pub(crate) wedged: bool,
    pub(crate) fail_reads: bool,
    pub(crate) fail_writes: bool,
    /// Start failing reads once this many have succeeded.
    pub(crate) fail_reads_after: Option<usize>,
    /// Start failing writes once this many have succeeded.
    pub(crate) fail_writes_after: Option<usize>,
    pub(crate) reads: usize,
    pub(crate) writes: usize,
    busy: Busy,
    log: EventLog,
}

impl FakeChip {
    fn new(log: EventLog) -> FakeChip {
        let mut registers = [0u16; NUM_REGISTERS];
        registers[0x00] = DEVICE_ID;
        registers[0x01] = CHIP_ID;
        // TEST1 reset value
        registers[0x07] = 0x0100;
        FakeChip {
            registers,
            stations: std::vec![12, 99, 150],
            polls_to_complete: 2,
            wedged: false,
            fail_reads: false,
            fail_writes: false,
            fail_reads_after: None,
            fail_writes_after: None,
            reads: 0,
            writes: 0,
            busy: Busy::Idle,
            log,
        }
    }

    pub(crate) fn powercfg(&self) -> u16 {
        self.registers[0x02]
    }

    pub(crate) fn channel(&self) -> u16 {
        self.registers[0x03]
    }

    pub(crate) fn sysconfig1(&self) -> u16 {
        self.registers[0x04]
    }

    pub(crate) fn sysconfig2(&self) -> u16 {
        self.registers[0x05]
    }

    pub(crate) fn test1(&self) -> u16 {
        self.registers[0x07]
    }

    fn current_channel(&self) -> u16 {
        self.registers[0x0B] & read_chan::READCHAN_MASK
    }

    fn start_commands(&mut self) {
        let tune = self.channel() & channel::TUNE != 0;
        let seek = self.powercfg() & powercfg::SEEK != 0;
        if !tune && !seek {
            // Clearing TUNE/SEEK ends the cycle and drops STC
            self.registers[0x0A] &= !(status_rssi::STC | status_rssi::SFBL);
            self.busy = Busy::Idle;
            return;
        }
        if self.busy != Busy::Idle || self.registers[0x0A] & status_rssi::STC != 0 {
            return;
        }
        if tune {
            self.busy = Busy::Tuning {
                target: self.channel() & channel::CHAN_MASK,
                polls_left: self.polls_to_complete,
            };
        } else {
            let current = self.current_channel();
            let up = self.powercfg() & powercfg::SEEKUP != 0;
            let found = if up {
                self.stations.iter().copied().find(|&s| s > current)
            } else {
                self.stations.iter().copied().rev().find(|&s| s < current)
            };
            let (target, failed) = match found {
                Some(station) => (station, false),
                None if up => (TOP_OF_BAND, true),
                None => (0, true),
            };
            self.busy = Busy::Seeking {
                target,
                failed,
                polls_left: self.polls_to_complete,
            };
        }
    }

    fn advance(&mut self) {
        if self.wedged {
            return;
        }
        let (target, failed) = match &mut self.busy {
            Busy::Idle => return,
            Busy::Tuning { target, polls_left } => {
                *polls_left = polls_left.saturating_sub(1);
                if *polls_left > 0 {
                    return;
                }
                (*target, false)
            }
            Busy::Seeking {
                target,
                failed,
                polls_left,
            } => {
                *polls_left = polls_left.saturating_sub(1);
                if *polls_left > 0 {
                    return;
                }
                (*target, *failed)
            }
        };
        self.busy = Busy::Idle;
        self.registers[0x0B] = (self.registers[0x0B] & !read_chan::READCHAN_MASK) | target;
        self.registers[0x0A] |= status_rssi::STC | status_rssi::STEREO | 0x0024;
        if failed {
            self.registers[0x0A] |= status_rssi::SFBL;
        }
    }
}

/// The I²C side of the fake chip.
pub(crate) struct FakeBus {
    chip: Rc<RefCell<FakeChip>>,
}

impl i2c::Read for FakeBus {
    type Error = BusFault;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        assert_eq!(address, 0x10);
        assert_eq!(buffer.len(), READ_LEN);
        let mut chip = self.chip.borrow_mut();
        if chip.fail_reads || matches!(chip.fail_reads_after, Some(limit) if chip.reads >= limit) {
            return Err(BusFault);
        }
        chip.reads += 1;
        chip.log.borrow_mut().push(Event::Read);
        chip.advance();
        for (position, word) in buffer.chunks_exact_mut(2).enumerate() {
            let register = read_position_to_register(position);
            word.copy_from_slice(&chip.registers[register].to_be_bytes());
        }
        Ok(())
    }
}

impl i2c::Write for FakeBus {
    type Error = BusFault;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        assert_eq!(address, 0x10);
        assert_eq!(bytes.len(), WRITE_LEN);
        let mut chip = self.chip.borrow_mut();
        if chip.fail_writes || matches!(chip.fail_writes_after, Some(limit) if chip.writes >= limit)
        {
            return Err(BusFault);
        }
        chip.writes += 1;
        let mut words = [0u16; NUM_WRITABLE];
        for (position, word) in bytes.chunks_exact(2).enumerate() {
            words[position] = u16::from_be_bytes([word[0], word[1]]);
            chip.registers[write_position_to_register(position)] = words[position];
        }
        chip.log.borrow_mut().push(Event::Write(words));
        chip.start_commands();
        Ok(())
    }
}

/// The reset line.
pub(crate) struct MockPin {
    pub(crate) fail: bool,
    log: EventLog,
}

impl OutputPin for MockPin {
    type Error = PinFault;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.fail {
            return Err(PinFault);
        }
        self.log.borrow_mut().push(Event::ResetLow);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.fail {
            return Err(PinFault);
        }
        self.log.borrow_mut().push(Event::ResetHigh);
        Ok(())
    }
}

pub(crate) struct MockDelay {
    log: EventLog,
}

impl DelayMs<u16> for MockDelay {
    fn delay_ms(&mut self, ms: u16) {
        self.log.borrow_mut().push(Event::Delay(ms));
    }
}

/// Everything a test needs to inspect the fake chip.
pub(crate) struct Rig {
    pub(crate) chip: Rc<RefCell<FakeChip>>,
    pub(crate) log: EventLog,
    pub(crate) delay: MockDelay,
}

impl Rig {
    /// Build a rig, plus the bus and reset pin to hand to the driver.
    pub(crate) fn new() -> (Rig, FakeBus, MockPin) {
        let log: EventLog = Rc::new(RefCell::new(Vec::new()));
        let chip = Rc::new(RefCell::new(FakeChip::new(log.clone())));
        let bus = FakeBus { chip: chip.clone() };
        let pin = MockPin {
            fail: false,
            log: log.clone(),
        };
        let rig = Rig {
            delay: MockDelay { log: log.clone() },
            chip,
            log,
        };
        (rig, bus, pin)
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    pub(crate) fn clear_events(&self) {
        self.log.borrow_mut().clear();
    }

    /// All the writes since the log was last cleared.
    pub(crate) fn writes(&self) -> Vec<[u16; NUM_WRITABLE]> {
        self.log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Write(words) => Some(*words),
                _ => None,
            })
            .collect()
    }
}
