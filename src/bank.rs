//! HATS switch matrix bank management.
use adg2128::{Adg2128, Connections, SwitchCommand, SwitchState, X_LINES};
use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c};
use enum_iterator::Sequence;

use crate::{
    matrix::{Matrix, MatrixMachine},
    Error, HatsSettings,
};

/// Indicates a switch matrix of the bank.
#[derive(Sequence, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Device {
    One = 1,
    Two = 2,
}

impl Device {
    fn index(self) -> usize {
        self as usize - 1
    }
}

impl TryFrom<u8> for Device {
    type Error = Error;

    fn try_from(device: u8) -> Result<Self, Error> {
        match device {
            1 => Ok(Device::One),
            2 => Ok(Device::Two),
            _ => Err(Error::InvalidDevice),
        }
    }
}

impl core::fmt::Display for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Selects the matrices affected by a reset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    Single(Device),
    Both,
}

impl Selector {
    /// The selected devices, in reset order.
    pub fn devices(self) -> impl Iterator<Item = Device> {
        enum_iterator::all::<Device>().filter(move |device| match self {
            Selector::Single(selected) => *device == selected,
            Selector::Both => true,
        })
    }
}

impl TryFrom<u8> for Selector {
    type Error = Error;

    fn try_from(selector: u8) -> Result<Self, Error> {
        match selector {
            3 => Ok(Selector::Both),
            device => Device::try_from(device).map(Selector::Single),
        }
    }
}

/// An operation applied to a single matrix of the bank.
#[derive(Copy, Clone, Debug)]
pub enum Operation<'a> {
    /// Update one switch immediately.
    Set { state: SwitchState, x: u8, y: u8 },
    /// Update a list of switches to the same state simultaneously.
    SetMany {
        state: SwitchState,
        pairs: &'a [(u8, u8)],
    },
    /// Send a batch of independent switch updates simultaneously.
    Send(&'a [SwitchCommand]),
    /// Connect exactly the listed crosspoints.
    Plan(&'a [(u8, u8)]),
    /// Read back a single X line.
    Read(u8),
    /// Read back every X line.
    ReadAll,
    Reset,
}

/// The result of an [Operation].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Done,
    Line(u8, Connections),
    Lines([Connections; X_LINES]),
}

/// Represents the two switch matrices of the test-bench.
pub struct MatrixBank<I2C, RST, DELAY> {
    matrices: [MatrixMachine<I2C, RST>; 2],
    delay: DELAY,
    reset_pulse_ms: u32,
}

impl<I2C, RST, DELAY> MatrixBank<I2C, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Construct the matrix bank.
    ///
    /// # Note
    /// The matrices are not reset during construction.
    ///
    /// # Args
    /// * `buses` - The I2C bus handle of each matrix. Matrices on a shared bus should each be
    ///   given their own handle from a bus manager.
    /// * `resets` - The reset pin of each matrix.
    /// * `delay` - A means of delaying during reset pulses.
    /// * `settings` - The addresses and reset timing of the matrices.
    ///
    /// # Returns
    /// The bank, or `Error::Settings` if the settings are inconsistent.
    pub fn new(
        buses: [I2C; 2],
        resets: [RST; 2],
        delay: DELAY,
        settings: &HatsSettings,
    ) -> Result<Self, Error> {
        settings.validate().map_err(|reason| {
            log::error!("Invalid matrix settings: {}", reason);
            Error::Settings(reason)
        })?;

        let [bus_one, bus_two] = buses;
        let [reset_one, reset_two] = resets;
        let [one, two] = settings.matrix;

        let matrices = [
            Matrix::new(
                Device::One,
                one.reset_line,
                Adg2128::new(bus_one, one.address, reset_one),
            ),
            Matrix::new(
                Device::Two,
                two.reset_line,
                Adg2128::new(bus_two, two.address, reset_two),
            ),
        ];

        for matrix in matrices.iter() {
            log::info!(
                "Matrix {} at address {:#04x}, reset on GPIO {}",
                matrix.device(),
                matrix.address(),
                matrix.reset_line()
            );
        }

        Ok(MatrixBank {
            matrices,
            delay,
            reset_pulse_ms: settings.reset_pulse_ms,
        })
    }

    /// Get the controller of a single matrix.
    pub fn matrix(&mut self, device: Device) -> &mut MatrixMachine<I2C, RST> {
        &mut self.matrices[device.index()]
    }

    /// Apply an operation to a matrix.
    ///
    /// # Args
    /// * `device` - The matrix to operate on, either 1 or 2.
    /// * `operation` - The operation to apply.
    ///
    /// # Returns
    /// The result of the operation. Unknown devices are rejected without touching the bus.
    pub fn apply(&mut self, device: u8, operation: Operation<'_>) -> Result<Reply, Error> {
        let device = Device::try_from(device).map_err(|e| {
            log::warn!("Rejecting operation for unknown matrix {}", device);
            e
        })?;

        self.apply_to(device, operation)
    }

    /// Apply an operation to a matrix.
    pub fn apply_to(&mut self, device: Device, operation: Operation<'_>) -> Result<Reply, Error> {
        let matrix = &mut self.matrices[device.index()];

        match operation {
            Operation::Set { state, x, y } => matrix.set_switch(state, x, y).map(|_| Reply::Done),
            Operation::SetMany { state, pairs } => {
                matrix.set_switches(state, pairs).map(|_| Reply::Done)
            }
            Operation::Send(commands) => matrix.send(commands).map(|_| Reply::Done),
            Operation::Plan(pairs) => matrix.apply_plan(pairs).map(|_| Reply::Done),
            Operation::Read(x) => matrix
                .read_line(x)
                .map(|connections| Reply::Line(x, connections)),
            Operation::ReadAll => matrix.read_all().map(Reply::Lines),
            Operation::Reset => matrix
                .reset(&mut self.delay, self.reset_pulse_ms)
                .map(|_| Reply::Done),
        }
    }

    /// Reset the selected matrices.
    ///
    /// # Note
    /// Matrices are reset one after the other, so their switches are not released
    /// simultaneously.
    pub fn reset(&mut self, selector: Selector) -> Result<(), Error> {
        for device in selector.devices() {
            self.matrices[device.index()].reset(&mut self.delay, self.reset_pulse_ms)?;
        }

        Ok(())
    }

    /// Reset both matrices.
    pub fn reset_all(&mut self) -> Result<(), Error> {
        self.reset(Selector::Both)
    }
}
