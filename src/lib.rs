//! HATS Switch Matrix Controller
//!
//! # Description
//! Controls the two ADG2128 12x8 crosspoint switch matrices that route signals on the HATS
//! hardware automated test-bench. Matrices are addressed as device 1 and 2 and are accessed
//! through any [embedded_hal] I2C bus, output pin and delay implementation.
#![cfg_attr(not(test), no_std)]

pub mod bank;
mod error;
pub mod matrix;
pub mod settings;
pub mod terminal;

pub use adg2128::{Connections, Coordinate, SwitchCommand, SwitchState, X_LINES, Y_LINES};
pub use bank::{Device, MatrixBank, Operation, Reply, Selector};
pub use error::Error;
pub use settings::{HatsSettings, MatrixSettings};
pub use terminal::{process_line, Request, Terminal};
