//! Error type definitions for the HATS matrix controller
use embedded_hal::i2c;

/// An enumeration of possible errors with the switch matrices.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// An X or Y line outside of the 12x8 switch array was requested.
    InvalidCoordinate,
    /// A device selector other than 1 or 2 was requested.
    InvalidDevice,
    /// The I2C transport failed.
    Bus(i2c::ErrorKind),
    /// The reset line could not be driven.
    Reset,
    /// A batch held more updates than the switch array has crosspoints.
    BatchTooLong,
    /// A transaction was requested while another was in flight on the matrix.
    Busy,
    /// The settings could not be loaded or are inconsistent.
    Settings(&'static str),
    /// The request names an unknown object or command.
    UnknownCommand,
    /// The arguments of the request could not be parsed.
    Malformed,
}

impl<E: i2c::Error> From<adg2128::Error<E>> for Error {
    fn from(error: adg2128::Error<E>) -> Self {
        match error {
            adg2128::Error::InvalidCoordinate => Error::InvalidCoordinate,
            adg2128::Error::BatchTooLong => Error::BatchTooLong,
            adg2128::Error::Interface(e) => Error::Bus(e.kind()),
            adg2128::Error::Reset => Error::Reset,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidCoordinate => write!(f, "InvalidCoordinate"),
            Error::InvalidDevice => write!(f, "InvalidDevice"),
            Error::Bus(kind) => write!(f, "BusError ({:?})", kind),
            Error::Reset => write!(f, "ResetFailed"),
            Error::BatchTooLong => write!(f, "BatchTooLong"),
            Error::Busy => write!(f, "Busy"),
            Error::Settings(reason) => write!(f, "InvalidSettings ({})", reason),
            Error::UnknownCommand => write!(f, "UnknownCommand"),
            Error::Malformed => write!(f, "Malformed"),
        }
    }
}
