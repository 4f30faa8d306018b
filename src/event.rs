// src/event.rs

use std::fmt;

use crate::address::{Address, CurveType, Name};

/// Number of f64 fields an event occupies on the wire.
pub const EVENT_SIZE: usize = 4;

/// A single scheduled change.
///
/// Wire layout is four contiguous f64 fields:
/// `time`, `address`, `value1`, `value2`.
///
/// `value2` is a secondary value (velocity, denominator) or a duration
/// (target time constant, curve span) depending on the curve type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Time in seconds (or beats, for sequences not yet scheduled)
    pub time: f64,
    pub address: Address,
    pub value1: f64,
    pub value2: f64,
}

impl Event {
    #[inline]
    pub fn new(time: f64, address: Address, value1: f64, value2: f64) -> Self {
        Self {
            time,
            address,
            value1,
            value2,
        }
    }

    /// Event addressed to the receiving object.
    #[inline]
    pub fn local(time: f64, name: Name, curve: CurveType, value1: f64, value2: f64) -> Self {
        Self::new(time, Address::local(name, curve), value1, value2)
    }

    #[inline]
    pub fn name(&self) -> Name {
        self.address.name()
    }

    #[inline]
    pub fn curve(&self) -> CurveType {
        self.address.curve()
    }

    /// Copy of this event with a different time.
    #[inline]
    pub fn at(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    /// Copy of this event with a different address.
    #[inline]
    pub fn readdressed(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    pub fn to_wire(&self) -> [f64; EVENT_SIZE] {
        [self.time, self.address.to_f64(), self.value1, self.value2]
    }

    pub fn from_wire(data: [f64; EVENT_SIZE]) -> Result<Self, crate::address::AddressError> {
        Ok(Self::new(data[0], Address::from_f64(data[1])?, data[2], data[3]))
    }
}

/// Renders the human-readable grammar understood by [`crate::parse::parse_event`].
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let curve = self.curve();
        write!(f, "{} {}", self.time, self.address.with_curve(CurveType::Set))?;

        match curve {
            CurveType::Hold | CurveType::Cancel => write!(f, " 0 {}", curve),
            CurveType::Set => {
                write!(f, " {}", self.value1)?;
                if self.value2 != 0.0 {
                    write!(f, " {}", self.value2)?;
                }
                Ok(())
            }
            CurveType::Linear | CurveType::Exponential => write!(f, " {} {}", self.value1, curve),
            CurveType::Target | CurveType::Curve => {
                write!(f, " {} {} {}", self.value1, curve, self.value2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip() {
        let address = Address::encode(&[3], Name::GAIN, CurveType::Target).unwrap();
        let event = Event::new(8.012, address, 0.5, 3.0);
        assert_eq!(Event::from_wire(event.to_wire()).unwrap(), event);
    }

    #[test]
    fn test_display() {
        let event = Event::local(8.012, Name::GAIN, CurveType::Target, 0.5, 3.0);
        assert_eq!(event.to_string(), "8.012 gain 0.5 target 3");

        let event = Event::local(1.0, Name::START, CurveType::Set, 69.0, 1.0);
        assert_eq!(event.to_string(), "1 start 69 1");

        let event = Event::local(0.0, Name::GAIN, CurveType::Set, 0.0, 0.0);
        assert_eq!(event.to_string(), "0 gain 0");
    }
}
