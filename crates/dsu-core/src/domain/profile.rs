//! Orientation profiles: how physical sensor axes map onto DSU motion axes.
//!
//! A profile binds each of the three accelerometer axes and each of the three
//! gyroscope axes with a six-character string such as `"x+z-y+"`.  Character
//! pairs are read left to right; pair *i* names the physical axis (and its
//! sign) that drives virtual axis *i* of that sensor.  So `"x+z-y+"` for the
//! accelerometer means:
//!
//! | virtual axis | source            |
//! |--------------|-------------------|
//! | accel X (0)  | physical X        |
//! | accel Y (1)  | physical Z, negated |
//! | accel Z (2)  | physical Y        |
//!
//! Physical axes follow the evdev numbering: accelerometer on `ABS_X..ABS_Z`
//! (0–2), gyroscope on `ABS_RX..ABS_RZ` (3–5).  Virtual axes follow the same
//! order in the controller-data payload.

use thiserror::Error;
use tracing::warn;

/// Number of motion axes (3 accelerometer + 3 gyroscope).
pub const AXIS_COUNT: usize = 6;

/// First axis index of the gyroscope group, both physical and virtual.
pub const FIRST_GYRO_AXIS: usize = 3;

/// Which sensor a binding string describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorGroup {
    Accelerometer,
    Gyroscope,
}

impl SensorGroup {
    fn first_axis(self) -> usize {
        match self {
            SensorGroup::Accelerometer => 0,
            SensorGroup::Gyroscope => FIRST_GYRO_AXIS,
        }
    }
}

impl std::fmt::Display for SensorGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorGroup::Accelerometer => f.write_str("accel"),
            SensorGroup::Gyroscope => f.write_str("gyro"),
        }
    }
}

/// Errors produced while parsing a profile.
#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("{group} binding must be 6 characters long, got {len}")]
    WrongLength { group: SensorGroup, len: usize },

    #[error("{group} binding: incorrect axis letter '{letter}' (expected x, y or z)")]
    InvalidAxisLetter { group: SensorGroup, letter: char },

    #[error("{group} binding: incorrect sign '{sign}' (expected + or -)")]
    InvalidSign { group: SensorGroup, sign: char },

    #[error("{group} binding: physical axis '{letter}' assigned to two virtual axes")]
    AxisClaimedTwice { group: SensorGroup, letter: char },

    #[error("gyro sensitivity must be a finite number, got {0}")]
    InvalidSensitivity(f64),
}

/// Physical → virtual axis mapping with per-axis inversion and gyro gain.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationProfile {
    /// Indexed by physical axis; holds the virtual axis it drives.
    mapping: [Option<u8>; AXIS_COUNT],
    /// Indexed by physical axis.
    invert: [bool; AXIS_COUNT],
    gyro_sensitivity: f32,
}

impl Default for OrientationProfile {
    fn default() -> Self {
        Self {
            mapping: [None; AXIS_COUNT],
            invert: [false; AXIS_COUNT],
            gyro_sensitivity: 1.0,
        }
    }
}

impl OrientationProfile {
    /// Builds a profile from optional accelerometer and gyroscope bindings.
    ///
    /// A missing binding leaves that sensor unmapped and logs a warning; the
    /// device still works, it just reports zeros on those axes.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] for malformed bindings, a physical axis used
    /// twice, or a non-finite sensitivity.
    pub fn parse(
        accel: Option<&str>,
        gyro: Option<&str>,
        gyro_sensitivity: f64,
    ) -> Result<Self, ProfileError> {
        if !gyro_sensitivity.is_finite() {
            return Err(ProfileError::InvalidSensitivity(gyro_sensitivity));
        }

        let mut profile = Self {
            gyro_sensitivity: gyro_sensitivity as f32,
            ..Self::default()
        };

        match accel {
            Some(binding) => profile.bind(SensorGroup::Accelerometer, binding)?,
            None => warn!("missing accelerometer binding; the device will not report acceleration"),
        }
        match gyro {
            Some(binding) => profile.bind(SensorGroup::Gyroscope, binding)?,
            None => warn!("missing gyroscope binding; fine if the device has no gyroscope"),
        }
        Ok(profile)
    }

    /// The profile that passes every axis through unchanged.
    pub fn passthrough() -> Self {
        let mut profile = Self::default();
        for axis in 0..AXIS_COUNT {
            profile.mapping[axis] = Some(axis as u8);
        }
        profile
    }

    /// Applies one six-character binding to this profile.
    ///
    /// # Errors
    ///
    /// See [`ProfileError`].
    pub fn bind(&mut self, group: SensorGroup, binding: &str) -> Result<(), ProfileError> {
        let chars: Vec<char> = binding.chars().collect();
        if chars.len() != 6 {
            return Err(ProfileError::WrongLength {
                group,
                len: chars.len(),
            });
        }

        let first = group.first_axis();
        for (i, pair) in chars.chunks_exact(2).enumerate() {
            let (letter, sign) = (pair[0], pair[1]);
            let offset = match letter.to_ascii_lowercase() {
                'x' => 0,
                'y' => 1,
                'z' => 2,
                _ => return Err(ProfileError::InvalidAxisLetter { group, letter }),
            };
            let inverted = match sign {
                '+' => false,
                '-' => true,
                _ => return Err(ProfileError::InvalidSign { group, sign }),
            };

            let physical = first + offset;
            if self.mapping[physical].is_some() {
                return Err(ProfileError::AxisClaimedTwice { group, letter });
            }
            self.mapping[physical] = Some((first + i) as u8);
            self.invert[physical] = inverted;
        }
        Ok(())
    }

    /// Looks up the virtual axis driven by `physical` and whether it is
    /// inverted.  `None` for unmapped or out-of-range axes.
    pub fn virtual_axis(&self, physical: usize) -> Option<(usize, bool)> {
        let target = (*self.mapping.get(physical)?)?;
        Some((target as usize, self.invert[physical]))
    }

    pub fn gyro_sensitivity(&self) -> f32 {
        self.gyro_sensitivity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity_bindings() {
        // Arrange / Act
        let profile = OrientationProfile::parse(Some("x+y+z+"), Some("x+y+z+"), 1.0).unwrap();

        // Assert
        for axis in 0..AXIS_COUNT {
            assert_eq!(profile.virtual_axis(axis), Some((axis, false)));
        }
        assert_eq!(profile, OrientationProfile::passthrough());
    }

    #[test]
    fn test_parse_remaps_and_inverts() {
        let profile = OrientationProfile::parse(Some("x+z-y+"), Some("Y-X+Z-"), 2.5).unwrap();

        // Accelerometer: virtual 1 comes from physical Z, inverted
        assert_eq!(profile.virtual_axis(0), Some((0, false)));
        assert_eq!(profile.virtual_axis(2), Some((1, true)));
        assert_eq!(profile.virtual_axis(1), Some((2, false)));
        // Gyroscope: virtual 3 from physical RY (4), inverted
        assert_eq!(profile.virtual_axis(4), Some((3, true)));
        assert_eq!(profile.virtual_axis(3), Some((4, false)));
        assert_eq!(profile.virtual_axis(5), Some((5, true)));
        assert_eq!(profile.gyro_sensitivity(), 2.5);
    }

    #[test]
    fn test_parse_without_gyro_leaves_gyro_unmapped() {
        let profile = OrientationProfile::parse(Some("x+y+z+"), None, 1.0).unwrap();

        assert_eq!(profile.virtual_axis(3), None);
        assert_eq!(profile.virtual_axis(5), None);
    }

    #[test]
    fn test_parse_rejects_physical_axis_claimed_twice() {
        let result = OrientationProfile::parse(Some("x+x-z+"), None, 1.0);

        assert_eq!(
            result,
            Err(ProfileError::AxisClaimedTwice {
                group: SensorGroup::Accelerometer,
                letter: 'x'
            })
        );
    }

    #[test]
    fn test_parse_rejects_bad_letter() {
        let result = OrientationProfile::parse(None, Some("x+w+z+"), 1.0);
        assert_eq!(
            result,
            Err(ProfileError::InvalidAxisLetter {
                group: SensorGroup::Gyroscope,
                letter: 'w'
            })
        );
    }

    #[test]
    fn test_parse_rejects_bad_sign() {
        let result = OrientationProfile::parse(Some("x+y*z+"), None, 1.0);
        assert!(matches!(result, Err(ProfileError::InvalidSign { sign: '*', .. })));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let result = OrientationProfile::parse(Some("x+y+"), None, 1.0);
        assert!(matches!(result, Err(ProfileError::WrongLength { len: 4, .. })));
    }

    #[test]
    fn test_parse_rejects_non_finite_sensitivity() {
        let result = OrientationProfile::parse(Some("x+y+z+"), None, f64::NAN);
        assert!(matches!(result, Err(ProfileError::InvalidSensitivity(_))));
    }

    #[test]
    fn test_virtual_axis_out_of_range_is_none() {
        assert_eq!(OrientationProfile::passthrough().virtual_axis(6), None);
    }
}
