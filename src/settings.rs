//! HATS matrix settings
//!
//! # Description
//! Switch state is volatile and never stored. The settings only describe how the matrices are
//! wired to the single-board computer, so they can be reapplied after every power cycle.
use serde::{Deserialize, Serialize};

use crate::Error;

/// The shortest reset pulse accepted, in milliseconds.
pub const MIN_RESET_PULSE_MS: u32 = adg2128::RESET_PULSE_MS;

fn default_reset_pulse_ms() -> u32 {
    adg2128::RESET_PULSE_MS
}

/// The wiring of a single ADG2128 matrix.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct MatrixSettings {
    /// The 7-bit I2C address of the device.
    pub address: u8,

    /// The GPIO line connected to the active-low RESET input of the device.
    pub reset_line: u8,
}

/// Settings for the matrix bank.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct HatsSettings {
    pub matrix: [MatrixSettings; 2],

    /// The time the reset lines are held low, in milliseconds.
    #[serde(default = "default_reset_pulse_ms")]
    pub reset_pulse_ms: u32,
}

impl Default for HatsSettings {
    fn default() -> Self {
        Self {
            matrix: [
                MatrixSettings {
                    address: 0x70,
                    reset_line: 22,
                },
                MatrixSettings {
                    address: 0x71,
                    reset_line: 23,
                },
            ],
            reset_pulse_ms: default_reset_pulse_ms(),
        }
    }
}

impl HatsSettings {
    /// Load settings from a JSON document.
    ///
    /// # Args
    /// * `data` - The serialized settings.
    ///
    /// # Returns
    /// The validated settings.
    pub fn from_json(data: &[u8]) -> Result<Self, Error> {
        let (settings, _): (Self, usize) = serde_json_core::from_slice(data).map_err(|e| {
            log::warn!("Failed to parse settings: {:?}", e);
            Error::Settings("Malformed settings")
        })?;

        settings.validate().map_err(Error::Settings)?;

        Ok(settings)
    }

    /// Check that the settings describe two distinct, addressable matrices.
    pub fn validate(&self) -> Result<(), &'static str> {
        let [one, two] = &self.matrix;

        if one.address > 0x7F || two.address > 0x7F {
            return Err("Address is not a 7-bit I2C address");
        }

        if one.address == two.address {
            return Err("Matrices share an I2C address");
        }

        if one.reset_line == two.reset_line {
            return Err("Matrices share a reset line");
        }

        if self.reset_pulse_ms < MIN_RESET_PULSE_MS {
            return Err("Reset pulse too short");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(HatsSettings::default().validate(), Ok(()));
    }

    #[test]
    fn load_from_json() {
        let settings = HatsSettings::from_json(
            br#"{"matrix":[{"address":114,"reset_line":5},{"address":115,"reset_line":6}],"reset_pulse_ms":150}"#,
        )
        .unwrap();

        assert_eq!(settings.matrix[0].address, 0x72);
        assert_eq!(settings.matrix[1].reset_line, 6);
        assert_eq!(settings.reset_pulse_ms, 150);
    }

    #[test]
    fn pulse_width_defaults() {
        let settings = HatsSettings::from_json(
            br#"{"matrix":[{"address":112,"reset_line":22},{"address":113,"reset_line":23}]}"#,
        )
        .unwrap();

        assert_eq!(settings, HatsSettings::default());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let shared_address = br#"{"matrix":[{"address":112,"reset_line":1},{"address":112,"reset_line":2}]}"#;
        assert_eq!(
            HatsSettings::from_json(shared_address),
            Err(Error::Settings("Matrices share an I2C address"))
        );

        let wide_address = br#"{"matrix":[{"address":128,"reset_line":1},{"address":112,"reset_line":2}]}"#;
        assert!(HatsSettings::from_json(wide_address).is_err());

        let short_pulse = br#"{"matrix":[{"address":112,"reset_line":1},{"address":113,"reset_line":2}],"reset_pulse_ms":10}"#;
        assert_eq!(
            HatsSettings::from_json(short_pulse),
            Err(Error::Settings("Reset pulse too short"))
        );

        assert_eq!(
            HatsSettings::from_json(b"{\"matrix\":"),
            Err(Error::Settings("Malformed settings"))
        );
    }
}
