//! Crosspoint controller for a single ADG2128 switch matrix.
//!
//! # Description
//! The controller validates requests from the bank, hands them to the ADG2128 driver and tracks
//! whether a transaction is in flight on the bus. Coordinates are always validated before the
//! bus is touched, so a rejected request never produces partial traffic.
use adg2128::{
    Adg2128, Connections, Coordinate, SwitchCommand, SwitchState, MAX_BATCH, X_LINES, Y_LINES,
};
use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c};
use heapless::Vec;

use crate::{bank::Device, Error};

/// A physical switch matrix and the driver used to talk to it.
pub struct Matrix<I2C, RST> {
    device: Device,
    reset_line: u8,
    driver: Adg2128<I2C, RST>,
}

impl<I2C, RST> Matrix<I2C, RST> {
    /// Construct the controller for a switch matrix.
    ///
    /// # Args
    /// * `device` - The position of the matrix in the bank.
    /// * `reset_line` - The GPIO line wired to the RESET input of the matrix.
    /// * `driver` - The driver of the physical ADG2128.
    pub fn new(
        device: Device,
        reset_line: u8,
        driver: Adg2128<I2C, RST>,
    ) -> MatrixMachine<I2C, RST> {
        sm::StateMachine::new(Matrix {
            device,
            reset_line,
            driver,
        })
    }
}

mod sm {
    use smlang::statemachine;

    statemachine! {
        derive_states: [Debug, Copy, Clone],
        transitions: {
            *Idle + Transmit = Transmitting,
            Transmitting + Complete = Idle,
        }
    }
}

pub use sm::States;

impl<I2C, RST> sm::StateMachineContext for Matrix<I2C, RST> {}

pub type MatrixMachine<I2C, RST> = sm::StateMachine<Matrix<I2C, RST>>;

/// Validate a list of X/Y pairs and convert them into switch commands.
///
/// # Note
/// The whole list is rejected if any pair lies outside of the switch array.
fn commands(state: SwitchState, pairs: &[(u8, u8)]) -> Result<Vec<SwitchCommand, MAX_BATCH>, Error> {
    if pairs.len() > MAX_BATCH {
        return Err(Error::BatchTooLong);
    }

    pairs
        .iter()
        .map(|&(x, y)| {
            Coordinate::new(x, y)
                .map(|coordinate| SwitchCommand::new(state, coordinate))
                .ok_or(Error::InvalidCoordinate)
        })
        .collect()
}

impl<I2C, RST> sm::StateMachine<Matrix<I2C, RST>>
where
    I2C: I2c,
    RST: OutputPin,
{
    pub fn device(&self) -> Device {
        self.context().device
    }

    pub fn address(&self) -> u8 {
        self.context().driver.address()
    }

    pub fn reset_line(&self) -> u8 {
        self.context().reset_line
    }

    /// Run a single bus operation on the driver.
    ///
    /// # Note
    /// The machine returns to `Idle` once the operation finishes, whether or not the transport
    /// succeeded.
    fn transmit<R>(
        &mut self,
        operation: impl FnOnce(&mut Adg2128<I2C, RST>) -> Result<R, adg2128::Error<I2C::Error>>,
    ) -> Result<R, Error> {
        self.process_event(sm::Events::Transmit).map_err(|_| Error::Busy)?;

        let result = operation(&mut self.context_mut().driver);

        self.process_event(sm::Events::Complete).ok();

        result.map_err(|e| {
            let error = Error::from(e);
            log::warn!("Matrix {} transaction failed: {}", self.device(), error);
            error
        })
    }

    /// Update a single switch immediately.
    ///
    /// # Args
    /// * `state` - The state to place the switch into.
    /// * `x` - The X line of the switch, from 0 to 11.
    /// * `y` - The Y line of the switch, from 0 to 7.
    pub fn set_switch(&mut self, state: SwitchState, x: u8, y: u8) -> Result<(), Error> {
        let coordinate = Coordinate::new(x, y).ok_or(Error::InvalidCoordinate)?;

        log::debug!("Matrix {}: X{} & Y{} -> {:?}", self.device(), x, y, state);
        self.transmit(|driver| driver.set_switch(SwitchCommand::new(state, coordinate)))
    }

    /// Update a list of switches to the same state simultaneously.
    ///
    /// # Args
    /// * `state` - The state to place every listed switch into.
    /// * `pairs` - The X/Y lines of each switch to update.
    pub fn set_switches(&mut self, state: SwitchState, pairs: &[(u8, u8)]) -> Result<(), Error> {
        let commands = commands(state, pairs)?;
        self.send(&commands)
    }

    /// Send a batch of switch updates that takes effect simultaneously.
    ///
    /// # Note
    /// The commands are sent in order in a single bus transaction. Only the last frame commits
    /// the batch.
    pub fn send(&mut self, commands: &[SwitchCommand]) -> Result<(), Error> {
        if commands.is_empty() {
            return Ok(());
        }

        log::debug!(
            "Matrix {}: committing {} switch updates",
            self.device(),
            commands.len()
        );
        self.transmit(|driver| driver.set_switches(commands))
    }

    /// Connect exactly the listed crosspoints and open every other switch.
    ///
    /// # Note
    /// Every crosspoint of the array is written in one committed batch, so the matrix moves
    /// from its previous configuration to the plan in a single step.
    pub fn apply_plan(&mut self, pairs: &[(u8, u8)]) -> Result<(), Error> {
        let mut plan = [[false; Y_LINES]; X_LINES];
        for command in commands(SwitchState::On, pairs)? {
            plan[command.coordinate.x() as usize][command.coordinate.y() as usize] = true;
        }

        let batch: Vec<SwitchCommand, MAX_BATCH> = Coordinate::all()
            .map(|coordinate| {
                let state = if plan[coordinate.x() as usize][coordinate.y() as usize] {
                    SwitchState::On
                } else {
                    SwitchState::Off
                };
                SwitchCommand::new(state, coordinate)
            })
            .collect();

        self.send(&batch)
    }

    /// Read back the Y lines connected to an X line.
    pub fn read_line(&mut self, x: u8) -> Result<Connections, Error> {
        if x as usize >= X_LINES {
            return Err(Error::InvalidCoordinate);
        }

        self.transmit(|driver| driver.read_line(x))
    }

    /// Read back the connections of every X line.
    pub fn read_all(&mut self) -> Result<[Connections; X_LINES], Error> {
        self.transmit(|driver| driver.read_all())
    }

    /// Reset the matrix through its dedicated reset line, opening every switch.
    ///
    /// # Args
    /// * `delay` - A means of delaying for the reset pulse.
    /// * `pulse_ms` - The width of the reset pulse.
    pub fn reset(&mut self, delay: &mut impl DelayNs, pulse_ms: u32) -> Result<(), Error> {
        log::info!(
            "Resetting matrix {} (GPIO {})",
            self.device(),
            self.reset_line()
        );
        self.context_mut()
            .driver
            .reset(delay, pulse_ms)
            .map_err(Error::from)
    }
}
