//! Driver for the ADG2128 12x8 analog crosspoint switch.
//!
//! # Description
//! Every switch of the 12x8 array is programmed through a 16-bit word sent over I2C. The first
//! byte carries the switch state and the X/Y address of the crosspoint. The second byte carries
//! the LDSW bit. When LDSW is clear, the word is only latched into the device and the switch does
//! not move. When LDSW is set, every word latched since the last update takes effect together.
//! This driver uses that behaviour to apply batches of switch updates atomically.
//!
//! The device has no software reset. The RESET pin is pulsed low to open every switch.
#![cfg_attr(not(test), no_std)]
#![deny(warnings)]

use bit_field::BitField;
use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c};

/// The number of X lines on the device.
pub const X_LINES: usize = 12;

/// The number of Y lines on the device.
pub const Y_LINES: usize = 8;

/// The largest batch that can be sent in a single transaction (one frame per crosspoint).
pub const MAX_BATCH: usize = X_LINES * Y_LINES;

/// The I2C address of the device when all address pins are tied low.
pub const DEFAULT_ADDRESS: u8 = 0x70;

/// The nominal width of the reset pulse in milliseconds.
pub const RESET_PULSE_MS: u32 = 100;

// AX3..AX0 address codes of each X line. The silicon does not use codes 0x6 and 0x7.
const X_CODES: [u8; X_LINES] = [0x0, 0x1, 0x2, 0x3, 0x4, 0x5, 0x8, 0x9, 0xA, 0xB, 0xC, 0xD];

// Readback select bytes for each X line.
const READBACK_ADDRESSES: [u8; X_LINES] = [
    0x34, 0x3C, 0x74, 0x7C, 0x35, 0x3D, 0x75, 0x7D, 0x36, 0x3E, 0x76, 0x7E,
];

/// Represents possible errors from the crosspoint driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error<E> {
    InvalidCoordinate,
    BatchTooLong,
    Interface(E),
    Reset,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Interface(e)
    }
}

/// The position of a single crosspoint in the switch array.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    x: u8,
    y: u8,
}

impl Coordinate {
    /// Construct a crosspoint coordinate.
    ///
    /// # Args
    /// * `x` - The X line, from 0 to 11.
    /// * `y` - The Y line, from 0 to 7.
    ///
    /// # Returns
    /// The coordinate, or `None` if either line is outside of the switch array.
    pub fn new(x: u8, y: u8) -> Option<Self> {
        if (x as usize) < X_LINES && (y as usize) < Y_LINES {
            Some(Self { x, y })
        } else {
            None
        }
    }

    pub fn x(&self) -> u8 {
        self.x
    }

    pub fn y(&self) -> u8 {
        self.y
    }

    /// Iterate over every crosspoint of the array, X line by X line.
    pub fn all() -> impl Iterator<Item = Coordinate> {
        (0..X_LINES as u8).flat_map(|x| (0..Y_LINES as u8).map(move |y| Coordinate { x, y }))
    }

    fn x_code(&self) -> u8 {
        X_CODES[self.x as usize]
    }
}

/// The requested state of a switch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SwitchState {
    Off = 0,
    On = 1,
}

/// The LDSW setting of a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Latch {
    /// Hold the update in the device without moving the switch.
    Latch = 0,

    /// Move this switch and every switch latched before it.
    Commit = 1,
}

/// A single switch update.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwitchCommand {
    pub coordinate: Coordinate,
    pub state: SwitchState,
}

impl SwitchCommand {
    pub fn new(state: SwitchState, coordinate: Coordinate) -> Self {
        Self { coordinate, state }
    }
}

/// The two-byte wire representation of a switch update.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Frame([u8; 2]);

impl Frame {
    /// Encode a switch update.
    ///
    /// # Args
    /// * `command` - The switch update to encode.
    /// * `latch` - Specifies if the update is held or committed.
    pub fn new(command: SwitchCommand, latch: Latch) -> Self {
        let mut msb = 0u8;
        msb.set_bit(7, command.state == SwitchState::On);
        msb.set_bits(3..7, command.coordinate.x_code());
        msb.set_bits(0..3, command.coordinate.y());

        let mut lsb = 0u8;
        lsb.set_bit(0, latch == Latch::Commit);

        Frame([msb, lsb])
    }

    pub fn msb(&self) -> u8 {
        self.0[0]
    }

    pub fn lsb(&self) -> u8 {
        self.0[1]
    }

    pub fn bytes(&self) -> [u8; 2] {
        self.0
    }

    pub fn latch(&self) -> Latch {
        if self.lsb().get_bit(0) {
            Latch::Commit
        } else {
            Latch::Latch
        }
    }

    /// Decode the switch update carried by the frame.
    ///
    /// # Returns
    /// The encoded command, or `None` if the frame addresses an X code unused by the silicon.
    pub fn command(&self) -> Option<SwitchCommand> {
        let code = self.msb().get_bits(3..7);
        let x = X_CODES.iter().position(|&c| c == code)? as u8;
        let coordinate = Coordinate::new(x, self.msb().get_bits(0..3))?;

        let state = if self.msb().get_bit(7) {
            SwitchState::On
        } else {
            SwitchState::Off
        };

        Some(SwitchCommand::new(state, coordinate))
    }
}

impl From<[u8; 2]> for Frame {
    fn from(bytes: [u8; 2]) -> Self {
        Frame(bytes)
    }
}

/// Encode a standalone switch update that takes effect immediately.
pub fn encode_single(command: SwitchCommand) -> Frame {
    Frame::new(command, Latch::Commit)
}

/// Encode a batch of switch updates.
///
/// # Note
/// Frames are produced in the order of `commands`. Every frame but the last is latched, so no
/// switch moves until the final frame commits the whole batch.
pub fn encode_batch(commands: &[SwitchCommand]) -> impl Iterator<Item = Frame> + '_ {
    let last = commands.len().saturating_sub(1);
    commands.iter().enumerate().map(move |(index, command)| {
        let latch = if index == last {
            Latch::Commit
        } else {
            Latch::Latch
        };
        Frame::new(*command, latch)
    })
}

/// Get the readback select byte of an X line.
pub fn readback_address(x: u8) -> Option<u8> {
    READBACK_ADDRESSES.get(x as usize).copied()
}

/// The Y lines connected to a single X line.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Connections(u8);

impl Connections {
    /// The raw readback byte. Bit `i` is set when Y line `i` is connected.
    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, y: u8) -> bool {
        (y as usize) < Y_LINES && self.0.get_bit(y as usize)
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate over the connected Y lines in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> {
        let bits = self.0;
        (0..Y_LINES as u8).filter(move |&y| bits.get_bit(y as usize))
    }
}

/// Decode the data byte of a readback into the set of connected Y lines.
pub fn decode(data: u8) -> Connections {
    Connections(data)
}

/// The driver for the ADG2128 crosspoint switch.
pub struct Adg2128<I2C, RST> {
    i2c: I2C,
    address: u8,
    reset: RST,
}

impl<I2C, RST> Adg2128<I2C, RST>
where
    I2C: I2c,
    RST: OutputPin,
{
    /// Construct a new crosspoint switch driver.
    ///
    /// # Note
    /// The device is not reset during construction. Switch state is volatile, so callers should
    /// reset the device before relying on the state of any switch.
    ///
    /// # Args
    /// * `i2c` - The I2C bus to use for communication with the switch.
    /// * `address` - The 7-bit I2C address of the device.
    /// * `reset` - A pin connected to the active-low RESET input of the device.
    pub fn new(i2c: I2C, address: u8, reset: RST) -> Self {
        Adg2128 {
            i2c,
            address,
            reset,
        }
    }

    /// Construct a new crosspoint switch driver with a default address.
    ///
    /// # Args
    /// * `i2c` - The I2C bus to use for communication with the switch.
    /// * `reset` - A pin connected to the active-low RESET input of the device.
    pub fn default(i2c: I2C, reset: RST) -> Self {
        Adg2128::new(i2c, DEFAULT_ADDRESS, reset)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Update a single switch immediately.
    pub fn set_switch(&mut self, command: SwitchCommand) -> Result<(), Error<I2C::Error>> {
        let frame = encode_single(command);
        self.i2c.write(self.address, &frame.bytes())?;

        Ok(())
    }

    /// Update a batch of switches simultaneously.
    ///
    /// # Note
    /// All frames are sent in a single I2C write, so the batch is never interleaved with other
    /// traffic to the device. An empty batch does not access the bus.
    ///
    /// # Args
    /// * `commands` - The switch updates, in the order they should be sent to the device.
    pub fn set_switches(&mut self, commands: &[SwitchCommand]) -> Result<(), Error<I2C::Error>> {
        if commands.is_empty() {
            return Ok(());
        }

        if commands.len() > MAX_BATCH {
            return Err(Error::BatchTooLong);
        }

        let mut buffer = [0u8; 2 * MAX_BATCH];
        for (frame, chunk) in encode_batch(commands).zip(buffer.chunks_exact_mut(2)) {
            chunk.copy_from_slice(&frame.bytes());
        }

        self.i2c.write(self.address, &buffer[..2 * commands.len()])?;

        Ok(())
    }

    /// Read back the switches of an X line.
    ///
    /// # Args
    /// * `x` - The X line to read, from 0 to 11.
    ///
    /// # Returns
    /// The Y lines currently connected to the X line.
    pub fn read_line(&mut self, x: u8) -> Result<Connections, Error<I2C::Error>> {
        let select = readback_address(x).ok_or(Error::InvalidCoordinate)?;

        let mut reply: [u8; 2] = [0; 2];
        self.i2c.write_read(self.address, &[select, 0x00], &mut reply)?;

        // The first byte of the reply is a dummy.
        Ok(decode(reply[1]))
    }

    /// Read back the switches of every X line.
    pub fn read_all(&mut self) -> Result<[Connections; X_LINES], Error<I2C::Error>> {
        let mut lines = [Connections::default(); X_LINES];
        for (x, line) in lines.iter_mut().enumerate() {
            *line = self.read_line(x as u8)?;
        }

        Ok(lines)
    }

    /// Reset the device, opening every switch.
    ///
    /// # Args
    /// * `delay` - A means of delaying for the width of the reset pulse.
    /// * `pulse_ms` - The time to hold the reset line low.
    pub fn reset(
        &mut self,
        delay: &mut impl DelayNs,
        pulse_ms: u32,
    ) -> Result<(), Error<I2C::Error>> {
        self.reset.set_low().map_err(|_| Error::Reset)?;
        delay.delay_ms(pulse_ms);
        self.reset.set_high().map_err(|_| Error::Reset)?;

        Ok(())
    }

    /// Destroy the driver and return the bus and reset pin.
    pub fn release(self) -> (I2C, RST) {
        (self.i2c, self.reset)
    }
}
