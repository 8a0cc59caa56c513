//! Line-oriented request interface for the switch matrices.
//!
//! # Description
//! Requests follow the `/<object>/<command> <args...>` layout used by the test-bench RPC
//! helpers, e.g. `/matrix/set 1 on 0 4`. Every request produces a single text response: `OK`,
//! the decoded readback, or `ERR <reason>`.
use core::fmt::Write;

use adg2128::{Connections, SwitchState, MAX_BATCH};
use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c};
use heapless::{String, Vec};

use crate::{
    bank::{Device, MatrixBank, Operation, Reply, Selector},
    Error,
};

/// The longest request line that can be buffered.
pub const INPUT_CAPACITY: usize = 512;

/// The capacity of a single response.
pub const RESPONSE_CAPACITY: usize = 1024;

pub type Response = String<RESPONSE_CAPACITY>;

const HELP: &str = "\
+--------------------+
| HATS Matrix Help   :
+--------------------+
* `/matrix/set <DEV> <on|off> <X> <Y>` - Set a single switch
* `/matrix/batch <DEV> <on|off> <X> <Y> [<X> <Y> ...]` - Set several switches simultaneously
* `/matrix/plan <DEV> [<X> <Y> ...]` - Connect exactly the listed switches
* `/matrix/read <DEV> <LINE>` - Read back the Y lines connected to X line LINE (e.g. x0)
* `/matrix/state <DEV>` - Read back every X line
* `/matrix/reset [1|2|3|both]` - Reset one or both matrices. Defaults to both.
DEV may be 1 or 2. X is 0-11 and Y is 0-7.
";

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Help,
    Set {
        device: Device,
        state: SwitchState,
        x: u8,
        y: u8,
    },
    Batch {
        device: Device,
        state: SwitchState,
        pairs: Vec<(u8, u8), MAX_BATCH>,
    },
    Plan {
        device: Device,
        pairs: Vec<(u8, u8), MAX_BATCH>,
    },
    Read {
        device: Device,
        line: u8,
    },
    State(Device),
    Reset(Selector),
}

fn parse_device(word: Option<&str>) -> Result<Device, Error> {
    let device: u8 = word
        .ok_or(Error::Malformed)?
        .parse()
        .map_err(|_| Error::InvalidDevice)?;

    Device::try_from(device)
}

fn parse_selector(word: &str) -> Result<Selector, Error> {
    if word.eq_ignore_ascii_case("both") {
        return Ok(Selector::Both);
    }

    let selector: u8 = word.parse().map_err(|_| Error::InvalidDevice)?;
    Selector::try_from(selector)
}

fn parse_state(word: Option<&str>) -> Result<SwitchState, Error> {
    match word.ok_or(Error::Malformed)? {
        word if word.eq_ignore_ascii_case("on") => Ok(SwitchState::On),
        word if word.eq_ignore_ascii_case("off") => Ok(SwitchState::Off),
        _ => Err(Error::Malformed),
    }
}

// Range checks happen in the matrix controller. Anything that isn't a small unsigned integer
// (e.g. `-1`) can never be a valid line.
fn parse_coordinate(word: Option<&str>) -> Result<u8, Error> {
    word.ok_or(Error::Malformed)?
        .parse()
        .map_err(|_| Error::InvalidCoordinate)
}

fn parse_line(word: Option<&str>) -> Result<u8, Error> {
    let word = word.ok_or(Error::Malformed)?;
    let number = word
        .strip_prefix('x')
        .or_else(|| word.strip_prefix('X'))
        .unwrap_or(word);

    parse_coordinate(Some(number))
}

fn parse_pairs<'a>(
    mut words: impl Iterator<Item = &'a str>,
) -> Result<Vec<(u8, u8), MAX_BATCH>, Error> {
    let mut pairs = Vec::new();

    while let Some(x) = words.next() {
        let y = words.next().ok_or(Error::Malformed)?;
        let pair = (parse_coordinate(Some(x))?, parse_coordinate(Some(y))?);
        pairs.push(pair).map_err(|_| Error::BatchTooLong)?;
    }

    Ok(pairs)
}

impl Request {
    /// Parse a single request line.
    pub fn parse(line: &str) -> Result<Self, Error> {
        let mut words = line.split_whitespace();
        let path = words.next().ok_or(Error::Malformed)?;

        let command = match path.strip_prefix("/matrix/") {
            Some(command) => command,
            None if path == "/help" => return Ok(Request::Help),
            None => return Err(Error::UnknownCommand),
        };

        let request = match command {
            "set" => Request::Set {
                device: parse_device(words.next())?,
                state: parse_state(words.next())?,
                x: parse_coordinate(words.next())?,
                y: parse_coordinate(words.next())?,
            },
            "batch" => {
                let device = parse_device(words.next())?;
                let state = parse_state(words.next())?;
                let pairs = parse_pairs(&mut words)?;
                if pairs.is_empty() {
                    return Err(Error::Malformed);
                }

                Request::Batch {
                    device,
                    state,
                    pairs,
                }
            }
            "plan" => Request::Plan {
                device: parse_device(words.next())?,
                pairs: parse_pairs(&mut words)?,
            },
            "read" => Request::Read {
                device: parse_device(words.next())?,
                line: parse_line(words.next())?,
            },
            "state" => Request::State(parse_device(words.next())?),
            "reset" => match words.next() {
                Some(word) => Request::Reset(parse_selector(word)?),
                None => Request::Reset(Selector::Both),
            },
            _ => return Err(Error::UnknownCommand),
        };

        // Verify that every argument was consumed. Otherwise, the request was malformed.
        if words.next().is_some() {
            Err(Error::Malformed)
        } else {
            Ok(request)
        }
    }
}

fn write_line(response: &mut Response, x: u8, connections: Connections) {
    if connections.is_empty() {
        writeln!(response, "X{} open", x).ok();
    }

    for y in connections.iter() {
        writeln!(response, "X{} & Y{}", x, y).ok();
    }
}

/// Execute a request on the matrix bank.
///
/// # Returns
/// The text response for the request. Responses that overflow are truncated.
pub fn execute<I2C, RST, DELAY>(
    bank: &mut MatrixBank<I2C, RST, DELAY>,
    request: &Request,
) -> Response
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    let mut response = Response::new();

    let result = match request {
        Request::Help => {
            response.push_str(HELP).ok();
            return response;
        }
        Request::Set {
            device,
            state,
            x,
            y,
        } => bank.apply_to(
            *device,
            Operation::Set {
                state: *state,
                x: *x,
                y: *y,
            },
        ),
        Request::Batch {
            device,
            state,
            pairs,
        } => bank.apply_to(
            *device,
            Operation::SetMany {
                state: *state,
                pairs,
            },
        ),
        Request::Plan { device, pairs } => bank.apply_to(*device, Operation::Plan(pairs)),
        Request::Read { device, line } => bank.apply_to(*device, Operation::Read(*line)),
        Request::State(device) => bank.apply_to(*device, Operation::ReadAll),
        Request::Reset(selector) => bank.reset(*selector).map(|_| Reply::Done),
    };

    match result {
        Ok(Reply::Done) => {
            writeln!(&mut response, "OK").ok();
        }
        Ok(Reply::Line(x, connections)) => write_line(&mut response, x, connections),
        Ok(Reply::Lines(lines)) => {
            for (x, connections) in lines.iter().enumerate() {
                write!(&mut response, "X{}:", x).ok();
                for y in connections.iter() {
                    write!(&mut response, " {}", y).ok();
                }
                writeln!(&mut response).ok();
            }
        }
        Err(error) => {
            writeln!(&mut response, "ERR {}", error).ok();
        }
    }

    response
}

/// Parse and execute a single request line.
pub fn process_line<I2C, RST, DELAY>(
    bank: &mut MatrixBank<I2C, RST, DELAY>,
    line: &str,
) -> Response
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    log::debug!("Request: {}", line.trim());

    match Request::parse(line) {
        Ok(request) => execute(bank, &request),
        Err(error) => {
            log::warn!("Rejected request `{}`: {}", line.trim(), error);
            let mut response = Response::new();
            writeln!(&mut response, "ERR {}", error).ok();
            response
        }
    }
}

/// A terminal for processing requests arriving as a byte stream.
pub struct Terminal {
    input_buffer: Vec<u8, INPUT_CAPACITY>,
    // Set after an overflow until the end of the oversized line.
    discarding: bool,
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal {
    pub fn new() -> Self {
        Self {
            input_buffer: Vec::new(),
            discarding: false,
        }
    }

    /// Process received data.
    ///
    /// # Note
    /// A line that overflows the input buffer is rejected as a whole. Nothing up to its
    /// terminating newline is executed.
    ///
    /// # Args
    /// * `bank` - The matrix bank requests are executed on.
    /// * `data` - The received bytes.
    /// * `respond` - Called with the response to every complete line, in order.
    pub fn receive<I2C, RST, DELAY>(
        &mut self,
        bank: &mut MatrixBank<I2C, RST, DELAY>,
        data: &[u8],
        mut respond: impl FnMut(&str),
    ) where
        I2C: I2c,
        RST: OutputPin,
        DELAY: DelayNs,
    {
        for &byte in data {
            if self.discarding {
                self.discarding = byte != b'\n';
                continue;
            }

            if byte != b'\n' {
                if self.input_buffer.push(byte).is_err() {
                    log::warn!("Terminal input overflow, discarding line");
                    self.input_buffer.clear();
                    self.discarding = true;
                    respond("[!] Buffer overflow\n");
                }
                continue;
            }

            match core::str::from_utf8(&self.input_buffer) {
                // Ignore empty lines.
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => respond(&process_line(bank, line)),
                Err(_) => {
                    let mut response = Response::new();
                    writeln!(&mut response, "ERR {}", Error::Malformed).ok();
                    respond(&response);
                }
            }

            self.input_buffer.clear();
        }
    }
}
