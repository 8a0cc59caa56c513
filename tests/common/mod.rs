//! A simulated test-bench with ADG2128 matrices on an I2C bus.
#![allow(dead_code)]

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use adg2128::{readback_address, Frame, Latch, SwitchCommand, SwitchState, X_LINES};
use embedded_hal::{
    delay::DelayNs,
    digital::{self, OutputPin},
    i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation},
};
use hats::{HatsSettings, MatrixBank};

/// Everything observable on the bench, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write(u8, Vec<u8>),
    WriteRead(u8, Vec<u8>),
    ResetLow(u8),
    ResetHigh(u8),
    Delay(u32),
}

#[derive(Default)]
struct Chip {
    latched: Vec<SwitchCommand>,
    lines: [u8; X_LINES],
}

impl Chip {
    fn write(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks_exact(2) {
            let frame = Frame::from([chunk[0], chunk[1]]);
            if let Some(command) = frame.command() {
                self.latched.push(command);
            }

            if frame.latch() == Latch::Commit {
                for command in self.latched.drain(..) {
                    let line = &mut self.lines[command.coordinate.x() as usize];
                    let mask = 1 << command.coordinate.y();
                    match command.state {
                        SwitchState::On => *line |= mask,
                        SwitchState::Off => *line &= !mask,
                    }
                }
            }
        }
    }

    fn clear(&mut self) {
        self.latched.clear();
        self.lines = [0; X_LINES];
    }
}

#[derive(Default)]
pub struct Bench {
    chips: BTreeMap<u8, Chip>,
    events: Vec<Event>,
    bus_fault: bool,
    pin_fault: bool,
}

pub type SharedBench = Rc<RefCell<Bench>>;

impl Bench {
    pub fn new(addresses: &[u8]) -> SharedBench {
        let mut bench = Bench::default();
        for &address in addresses {
            bench.chips.insert(address, Chip::default());
        }

        Rc::new(RefCell::new(bench))
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.clone()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn set_bus_fault(&mut self, fault: bool) {
        self.bus_fault = fault;
    }

    pub fn set_pin_fault(&mut self, fault: bool) {
        self.pin_fault = fault;
    }

    /// Check if a crosspoint of a chip is physically closed.
    pub fn is_closed(&self, address: u8, x: u8, y: u8) -> bool {
        self.chips[&address].lines[x as usize] & (1 << y) != 0
    }

    pub fn closed_count(&self, address: u8) -> u32 {
        self.chips[&address]
            .lines
            .iter()
            .map(|line| line.count_ones())
            .sum()
    }
}

/// A handle to the bench I2C bus.
pub struct FakeBus {
    bench: SharedBench,
}

impl FakeBus {
    pub fn new(bench: &SharedBench) -> Self {
        Self {
            bench: bench.clone(),
        }
    }
}

impl i2c::ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut bench = self.bench.borrow_mut();
        if bench.bus_fault {
            return Err(ErrorKind::Other);
        }

        let Bench { chips, events, .. } = &mut *bench;
        let chip = chips
            .get_mut(&address)
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))?;

        let mut written = Vec::new();
        let mut read = false;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => written.extend_from_slice(bytes),
                Operation::Read(buffer) => {
                    read = true;
                    let line = (0..X_LINES as u8)
                        .find(|&x| readback_address(x) == written.first().copied());
                    buffer.fill(0);
                    if let (Some(x), Some(data)) = (line, buffer.get_mut(1)) {
                        *data = chip.lines[x as usize];
                    }
                }
            }
        }

        if read {
            events.push(Event::WriteRead(address, written));
        } else {
            chip.write(&written);
            events.push(Event::Write(address, written));
        }

        Ok(())
    }
}

/// The reset line of a single chip.
pub struct FakePin {
    bench: SharedBench,
    address: u8,
}

impl FakePin {
    pub fn new(bench: &SharedBench, address: u8) -> Self {
        Self {
            bench: bench.clone(),
            address,
        }
    }
}

impl digital::ErrorType for FakePin {
    type Error = digital::ErrorKind;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut bench = self.bench.borrow_mut();
        if bench.pin_fault {
            return Err(digital::ErrorKind::Other);
        }

        bench.events.push(Event::ResetLow(self.address));
        if let Some(chip) = bench.chips.get_mut(&self.address) {
            chip.clear();
        }

        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut bench = self.bench.borrow_mut();
        if bench.pin_fault {
            return Err(digital::ErrorKind::Other);
        }

        bench.events.push(Event::ResetHigh(self.address));
        Ok(())
    }
}

pub struct FakeDelay {
    bench: SharedBench,
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.bench.borrow_mut().events.push(Event::Delay(ms));
    }
}

pub type FakeBank = MatrixBank<FakeBus, FakePin, FakeDelay>;

/// Construct a matrix bank wired to a fresh bench.
pub fn bank(settings: &HatsSettings) -> (SharedBench, FakeBank) {
    let [one, two] = settings.matrix;
    let bench = Bench::new(&[one.address, two.address]);

    let bank = MatrixBank::new(
        [FakeBus::new(&bench), FakeBus::new(&bench)],
        [
            FakePin::new(&bench, one.address),
            FakePin::new(&bench, two.address),
        ],
        delay(&bench),
        settings,
    )
    .unwrap();

    (bench, bank)
}

pub fn delay(bench: &SharedBench) -> FakeDelay {
    FakeDelay {
        bench: bench.clone(),
    }
}
