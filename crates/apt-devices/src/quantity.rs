// SPDX-License-Identifier: GPL-3.0-or-later

/// A physical quantity passed across a device controller's public boundary.
///
/// Full dimensional unit conversion is an external collaborator's job, not
/// this crate's; this enum is just wide enough to let a controller reject a
/// value of the wrong dimensionality (e.g. a length where an angle is
/// expected) the same way the richer unit library it stands in for would.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Quantity {
    Degrees(f64),
    Meters(f64),
}

impl Quantity {
    /// Returns the angle in degrees, or `None` if this quantity is not an
    /// angle at all.
    pub fn as_degrees(self) -> Option<f64> {
        match self {
            Quantity::Degrees(deg) => Some(deg),
            Quantity::Meters(_) => None,
        }
    }
}
