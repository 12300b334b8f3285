use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::warn;

pub const BUFFER_LEN: usize = 17;

// Settle time between bus edges, microseconds.
const ACTION_DELAY_US: u32 = 4;

/// Controller commands; the low 8 bits of the 9-bit datasheet code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    SysDis = 0x00,
    SysEn = 0x01,
    LcdOff = 0x02,
    LcdOn = 0x03,
    WdtDis = 0x05,
    ToneOff = 0x08,
    ToneOn = 0x09,
    Rc256K = 0x30,
    BiasThird4Com = 0x52,
}

/// (bus address, mirror index) pairs in the order commit walks the glass.
/// Mirror indices 0 and 9..=13 have no segments routed and never transmit.
pub const COMMIT_ORDER: [(u8, usize); 11] = [
    (2, 16),
    (4, 15),
    (6, 14),
    (18, 8),
    (20, 7),
    (22, 6),
    (24, 5),
    (26, 4),
    (28, 3),
    (30, 2),
    (32, 1),
];

/// RAM mirror of the display element. The compositor edits this; nothing
/// reaches the glass until a commit pushes it over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBuffer {
    bytes: [u8; BUFFER_LEN],
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0; BUFFER_LEN],
        }
    }

    pub fn get(&self, addr: usize) -> u8 {
        assert!(addr < BUFFER_LEN, "segment buffer address {addr} out of range");
        self.bytes[addr]
    }

    pub fn set(&mut self, addr: usize, byte: u8) {
        assert!(addr < BUFFER_LEN, "segment buffer address {addr} out of range");
        self.bytes[addr] = byte;
    }

    pub fn clear(&mut self) {
        self.bytes = [0; BUFFER_LEN];
    }

    pub fn as_bytes(&self) -> &[u8; BUFFER_LEN] {
        &self.bytes
    }
}

impl Default for SegmentBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// What the state controller needs from the display element. `Ht1621` is the
/// hardware implementation; tests substitute a recording mock.
pub trait SegmentPanel {
    fn buffer(&mut self) -> &mut SegmentBuffer;
    /// Pushes the mirror to display RAM. Fire-and-forget.
    fn commit(&mut self);
    /// Zeroes display RAM without touching the mirror.
    fn wipe_ram(&mut self);
    fn beep(&mut self, on: bool);
}

/// HT1621-class driver over a bit-banged 3-wire bus. Bits are clocked
/// MSB-first on the rising edge of WR while CS is held low.
pub struct Ht1621<CS, WR, DATA, D> {
    cs: CS,
    wr: WR,
    data: DATA,
    delay: D,
    buffer: SegmentBuffer,
}

impl<CS, WR, DATA, D, E> Ht1621<CS, WR, DATA, D>
where
    CS: OutputPin<Error = E>,
    WR: OutputPin<Error = E>,
    DATA: OutputPin<Error = E>,
    D: DelayNs,
    E: Debug,
{
    pub fn new(cs: CS, wr: WR, data: DATA, delay: D) -> Self {
        Self {
            cs,
            wr,
            data,
            delay,
            buffer: SegmentBuffer::new(),
        }
    }

    /// Power-on init: idle the bus, wait out the controller's settle time,
    /// send the config sequence, then wipe RAM and the mirror.
    pub fn begin(&mut self) {
        log_bus_error(self.try_begin());
    }

    pub fn display_on(&mut self) {
        log_bus_error(self.command_frame(Command::LcdOn));
    }

    pub fn display_off(&mut self) {
        log_bus_error(self.command_frame(Command::LcdOff));
    }

    fn try_begin(&mut self) -> Result<(), E> {
        self.cs.set_high()?;
        self.wr.set_high()?;
        self.data.set_high()?;
        self.delay.delay_ms(1000);

        self.command_frame(Command::BiasThird4Com)?;
        self.command_frame(Command::Rc256K)?;
        self.command_frame(Command::SysDis)?;
        self.command_frame(Command::WdtDis)?;
        self.command_frame(Command::SysEn)?;
        self.command_frame(Command::LcdOn)?;
        self.command_frame(Command::ToneOff)?;

        self.try_wipe_ram()?;
        self.buffer.clear();
        Ok(())
    }

    fn try_commit(&mut self) -> Result<(), E> {
        for (addr, index) in COMMIT_ORDER {
            self.write_frame(addr, self.buffer.get(index))?;
        }
        Ok(())
    }

    // Zero writes to bus addresses 0, 2, .. 30. The mirror keeps its
    // contents so the next commit repaints the glass.
    fn try_wipe_ram(&mut self) -> Result<(), E> {
        for addr in (0..=30).step_by(2) {
            self.write_frame(addr, 0)?;
        }
        Ok(())
    }

    fn write_frame(&mut self, addr: u8, data: u8) -> Result<(), E> {
        self.cs.set_low()?;
        self.delay.delay_us(ACTION_DELAY_US);
        self.push_bits(0b1010_0000, 3)?;
        self.push_bits(addr << 2, 6)?;
        self.push_bits(data, 8)?;
        self.cs.set_high()?;
        self.delay.delay_us(ACTION_DELAY_US);
        Ok(())
    }

    fn command_frame(&mut self, command: Command) -> Result<(), E> {
        self.cs.set_low()?;
        self.delay.delay_us(ACTION_DELAY_US);
        self.push_bits(0b1000_0000, 4)?;
        self.push_bits(command as u8, 8)?;
        self.cs.set_high()?;
        self.delay.delay_us(ACTION_DELAY_US);
        Ok(())
    }

    fn push_bits(&mut self, value: u8, count: u8) -> Result<(), E> {
        let mut mask = 0x80u8;
        for _ in 0..count {
            self.wr.set_low()?;
            self.delay.delay_us(ACTION_DELAY_US);
            if value & mask != 0 {
                self.data.set_high()?;
            } else {
                self.data.set_low()?;
            }
            self.delay.delay_us(ACTION_DELAY_US);
            self.wr.set_high()?;
            self.delay.delay_us(ACTION_DELAY_US);
            mask >>= 1;
        }
        Ok(())
    }
}

impl<CS, WR, DATA, D, E> SegmentPanel for Ht1621<CS, WR, DATA, D>
where
    CS: OutputPin<Error = E>,
    WR: OutputPin<Error = E>,
    DATA: OutputPin<Error = E>,
    D: DelayNs,
    E: Debug,
{
    fn buffer(&mut self) -> &mut SegmentBuffer {
        &mut self.buffer
    }

    fn commit(&mut self) {
        log_bus_error(self.try_commit());
    }

    fn wipe_ram(&mut self) {
        log_bus_error(self.try_wipe_ram());
    }

    fn beep(&mut self, on: bool) {
        let command = if on { Command::ToneOn } else { Command::ToneOff };
        log_bus_error(self.command_frame(command));
    }
}

// The display element never acknowledges, so a failed write has nowhere to
// propagate. Log it and keep running.
fn log_bus_error<E: Debug>(result: Result<(), E>) {
    if let Err(err) = result {
        warn!("display bus write failed: {err:?}");
    }
}
