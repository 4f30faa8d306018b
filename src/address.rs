// src/address.rs
//
// Bit-packed event addresses.
//
// An address packs a curve type, a parameter name and a route of up to
// MAX_DEPTH hops into a single integer:
//
//   bits [0:3)    curve type
//   bits [3:12)   name
//   bits [12:22)  route segment (last hop)
//   bits [22:32)  route segment
//   ...
//
// The most significant non-zero segment is the first hop. A route of 0 means
// the event is addressed to the object receiving it. All addresses fit in
// 52 bits so they survive a trip through an f64 wire slot unchanged.

use std::fmt;

use thiserror::Error;

pub const CURVE_BITS: u32 = 3;
pub const NAME_BITS: u32 = 9;
pub const ROUTE_BITS: u32 = 10;

pub const CURVE_MASK: u64 = (1 << CURVE_BITS) - 1;
pub const NAME_MASK: u64 = (1 << NAME_BITS) - 1;
pub const ROUTE_MASK: u64 = (1 << ROUTE_BITS) - 1;
pub const NAME_CURVE_MASK: u64 = (1 << (NAME_BITS + CURVE_BITS)) - 1;

/// Maximum number of route hops an address can carry.
pub const MAX_DEPTH: usize = 4;

/// Largest value a single route segment can hold.
pub const MAX_SEGMENT: u16 = ROUTE_MASK as u16;

/// Largest value a name can hold.
pub const MAX_NAME: u16 = NAME_MASK as u16;

const ROUTE_SHIFT: u32 = NAME_BITS + CURVE_BITS;
const ADDRESS_BITS: u32 = ROUTE_SHIFT + ROUTE_BITS * MAX_DEPTH as u32;

/// Error raised when an address cannot be represented.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AddressError {
    #[error("route depth {depth} exceeds the maximum of {max}", max = MAX_DEPTH)]
    TooDeep { depth: usize },

    #[error("route segment {segment} at hop {hop} is outside 1..={max}", max = MAX_SEGMENT)]
    InvalidSegment { hop: usize, segment: u16 },

    #[error("name {0} does not fit in {bits} bits", bits = NAME_BITS)]
    NameOverflow(u16),

    #[error("curve code {0} is not a known curve type")]
    UnknownCurve(u8),

    #[error("raw address {0:#x} is not a valid packed address")]
    Malformed(u64),

    #[error("address value {0} is not a non-negative integer")]
    NotAnInteger(f64),
}

//
// ===============================
// MARK: Curve type
// ===============================
//

/// Interpolation rule of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CurveType {
    /// Step to the value at the event time.
    Set = 0,
    /// Linear ramp ending at the event time.
    Linear = 1,
    /// Exponential ramp ending at the event time.
    Exponential = 2,
    /// Exponential approach starting at the event time, duration is a time constant.
    Target = 3,
    /// Arbitrary shape spanning the event duration.
    Curve = 4,
    /// Freeze at the current value and drop everything scheduled after.
    Hold = 5,
    /// Drop everything scheduled at or after the event time.
    Cancel = 6,
}

impl CurveType {
    pub const ALL: [CurveType; 7] = [
        CurveType::Set,
        CurveType::Linear,
        CurveType::Exponential,
        CurveType::Target,
        CurveType::Curve,
        CurveType::Hold,
        CurveType::Cancel,
    ];

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, AddressError> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(AddressError::UnknownCurve(code))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CurveType::Set => "set",
            CurveType::Linear => "linear",
            CurveType::Exponential => "exponential",
            CurveType::Target => "target",
            CurveType::Curve => "curve",
            CurveType::Hold => "hold",
            CurveType::Cancel => "cancel",
        }
    }

    /// Parse a curve name. `step` is accepted as an alias of `set`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "set" | "step" => Some(CurveType::Set),
            "linear" => Some(CurveType::Linear),
            "exponential" => Some(CurveType::Exponential),
            "target" => Some(CurveType::Target),
            "curve" => Some(CurveType::Curve),
            "hold" => Some(CurveType::Hold),
            "cancel" => Some(CurveType::Cancel),
            _ => None,
        }
    }

    /// Ramps are interpolated towards their own event time.
    #[inline]
    pub fn is_ramp(self) -> bool {
        matches!(self, CurveType::Linear | CurveType::Exponential)
    }
}

impl fmt::Display for CurveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ===============================
// MARK: Name
// ===============================
//

/// Semantic identifier of a parameter or command, 9 bits wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u16);

impl Name {
    pub const MUTE: Name = Name(3);
    pub const GAIN: Name = Name(6);
    pub const ANGLE: Name = Name(9);
    pub const DISTANCE: Name = Name(12);
    pub const AZIMUTH: Name = Name(13);
    pub const MIX: Name = Name(14);
    pub const PHASE: Name = Name(15);
    pub const FREQUENCY: Name = Name(16);
    pub const Q: Name = Name(17);
    pub const DEPTH: Name = Name(18);
    pub const CUTOFF: Name = Name(19);
    pub const TYPE: Name = Name(20);
    pub const DELAY: Name = Name(21);
    pub const FEEDBACK: Name = Name(22);
    pub const STOP: Name = Name(128);
    pub const START: Name = Name(129);
    pub const RECORD: Name = Name(130);
    pub const PITCH: Name = Name(131);
    pub const RATE: Name = Name(132);
    pub const METER: Name = Name(133);
    pub const KEY: Name = Name(134);
    pub const TOUCH: Name = Name(135);
    pub const NOTE: Name = Name(136);

    const TABLE: [(Name, &'static str); 23] = [
        (Name::MUTE, "mute"),
        (Name::GAIN, "gain"),
        (Name::ANGLE, "angle"),
        (Name::DISTANCE, "distance"),
        (Name::AZIMUTH, "azimuth"),
        (Name::MIX, "mix"),
        (Name::PHASE, "phase"),
        (Name::FREQUENCY, "frequency"),
        (Name::Q, "q"),
        (Name::DEPTH, "depth"),
        (Name::CUTOFF, "cutoff"),
        (Name::TYPE, "type"),
        (Name::DELAY, "delay"),
        (Name::FEEDBACK, "feedback"),
        (Name::STOP, "stop"),
        (Name::START, "start"),
        (Name::RECORD, "record"),
        (Name::PITCH, "pitch"),
        (Name::RATE, "rate"),
        (Name::METER, "meter"),
        (Name::KEY, "key"),
        (Name::TOUCH, "touch"),
        (Name::NOTE, "note"),
    ];

    pub fn new(number: u16) -> Result<Self, AddressError> {
        if number > MAX_NAME {
            return Err(AddressError::NameOverflow(number));
        }
        Ok(Name(number))
    }

    #[inline]
    pub fn number(self) -> u16 {
        self.0
    }

    /// The well-known string for this name, if it has one.
    pub fn as_str(self) -> Option<&'static str> {
        Self::TABLE
            .iter()
            .find(|(name, _)| *name == self)
            .map(|(_, s)| *s)
    }

    /// Parse a well-known name or a plain number.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase();
        if let Some((name, _)) = Self::TABLE.iter().find(|(_, n)| *n == lower) {
            return Some(*name);
        }
        s.parse::<u16>().ok().and_then(|n| Name::new(n).ok())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.write_str(s),
            None => write!(f, "{}", self.0),
        }
    }
}

//
// ===============================
// MARK: Route
// ===============================
//

/// Decoded route, first hop first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Route {
    segments: [u16; MAX_DEPTH],
    len: usize,
}

impl Route {
    pub fn new(segments: &[u16]) -> Result<Self, AddressError> {
        if segments.len() > MAX_DEPTH {
            return Err(AddressError::TooDeep {
                depth: segments.len(),
            });
        }

        let mut route = Route::default();
        for (hop, &segment) in segments.iter().enumerate() {
            if segment == 0 || segment > MAX_SEGMENT {
                return Err(AddressError::InvalidSegment { hop, segment });
            }
            route.segments[hop] = segment;
        }
        route.len = segments.len();
        Ok(route)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u16] {
        &self.segments[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn first(&self) -> Option<u16> {
        self.as_slice().first().copied()
    }
}

//
// ===============================
// MARK: Address
// ===============================
//

/// Packed `(route, name, curve)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(u64);

impl Address {
    /// An address targeting the receiving object.
    #[inline]
    pub const fn local(name: Name, curve: CurveType) -> Self {
        Address(((name.0 as u64) << CURVE_BITS) | curve as u64)
    }

    pub fn encode(route: &[u16], name: Name, curve: CurveType) -> Result<Self, AddressError> {
        let route = Route::new(route)?;
        let bits = route
            .as_slice()
            .iter()
            .fold(0u64, |bits, &segment| (bits << ROUTE_BITS) | segment as u64);
        Ok(Address(
            (bits << ROUTE_SHIFT) | Address::local(name, curve).0,
        ))
    }

    pub fn decode(self) -> (Route, Name, CurveType) {
        (self.route(), self.name(), self.curve())
    }

    /// Validate a raw packed integer.
    pub fn from_raw(raw: u64) -> Result<Self, AddressError> {
        if raw >> ADDRESS_BITS != 0 {
            return Err(AddressError::Malformed(raw));
        }

        CurveType::from_code((raw & CURVE_MASK) as u8)?;

        // A zero segment below the first hop would be lost on decode
        let mut bits = raw >> ROUTE_SHIFT;
        while bits != 0 {
            if bits & ROUTE_MASK == 0 {
                return Err(AddressError::Malformed(raw));
            }
            bits >>= ROUTE_BITS;
        }

        Ok(Address(raw))
    }

    /// Validate an address read from an f64 wire slot.
    pub fn from_f64(value: f64) -> Result<Self, AddressError> {
        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value >= (1u64 << ADDRESS_BITS) as f64 {
            return Err(AddressError::NotAnInteger(value));
        }
        Address::from_raw(value as u64)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64
    }

    #[inline]
    pub fn curve(self) -> CurveType {
        // Construction guarantees a valid code
        CurveType::ALL[(self.0 & CURVE_MASK) as usize % CurveType::ALL.len()]
    }

    #[inline]
    pub fn name(self) -> Name {
        Name(((self.0 >> CURVE_BITS) & NAME_MASK) as u16)
    }

    /// Route bits without name or curve.
    #[inline]
    pub fn route_bits(self) -> u64 {
        self.0 >> ROUTE_SHIFT
    }

    #[inline]
    pub fn is_local(self) -> bool {
        self.route_bits() == 0
    }

    /// Number of hops in the route.
    pub fn depth(self) -> usize {
        let bits = self.route_bits();
        let used = u64::BITS - bits.leading_zeros();
        used.div_ceil(ROUTE_BITS) as usize
    }

    pub fn route(self) -> Route {
        let mut route = Route::default();
        let depth = self.depth();
        let mut bits = self.route_bits();
        for hop in (0..depth).rev() {
            route.segments[hop] = (bits & ROUTE_MASK) as u16;
            bits >>= ROUTE_BITS;
        }
        route.len = depth;
        route
    }

    /// Split off the first hop, returning it and the re-addressed remainder.
    ///
    /// Name and curve bits are preserved. Returns `None` for local addresses.
    pub fn next_hop(self) -> Option<(u16, Address)> {
        let depth = self.depth();
        if depth == 0 {
            return None;
        }

        let shift = (depth as u32 - 1) * ROUTE_BITS;
        let bits = self.route_bits();
        let hop = ((bits >> shift) & ROUTE_MASK) as u16;
        let rest = bits & ((1u64 << shift) - 1);
        Some((hop, Address((rest << ROUTE_SHIFT) | (self.0 & NAME_CURVE_MASK))))
    }

    #[inline]
    pub fn with_curve(self, curve: CurveType) -> Self {
        Address((self.0 & !CURVE_MASK) | curve as u64)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in self.route().as_slice() {
            write!(f, "{}.", segment)?;
        }
        write!(f, "{}", self.name())?;
        match self.curve() {
            CurveType::Set => Ok(()),
            curve => write!(f, ".{}", curve),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let routes: [&[u16]; 5] = [&[], &[2], &[1, 2], &[1023, 1, 7], &[4, 3, 2, 1]];
        for route in routes {
            for curve in CurveType::ALL {
                for name in [Name::GAIN, Name::START, Name::new(511).unwrap()] {
                    let address = Address::encode(route, name, curve).unwrap();
                    let (r, n, c) = address.decode();
                    assert_eq!(r.as_slice(), route);
                    assert_eq!(n, name);
                    assert_eq!(c, curve);
                    assert_eq!(Address::from_raw(address.raw()).unwrap(), address);
                }
            }
        }
    }

    #[test]
    fn test_bit_layout() {
        let address = Address::encode(&[1, 2], Name::GAIN, CurveType::Linear).unwrap();
        let expected = (1u64 << 22) | (2u64 << 12) | (6u64 << 3) | 1;
        assert_eq!(address.raw(), expected);
    }

    #[test]
    fn test_rejects_overflow() {
        assert_eq!(
            Address::encode(&[1, 2, 3, 4, 5], Name::GAIN, CurveType::Set),
            Err(AddressError::TooDeep { depth: 5 })
        );
        assert_eq!(
            Address::encode(&[1024], Name::GAIN, CurveType::Set),
            Err(AddressError::InvalidSegment { hop: 0, segment: 1024 })
        );
        assert_eq!(
            Address::encode(&[3, 0], Name::GAIN, CurveType::Set),
            Err(AddressError::InvalidSegment { hop: 1, segment: 0 })
        );
        assert_eq!(Name::new(512), Err(AddressError::NameOverflow(512)));
        assert_eq!(Address::from_raw(7), Err(AddressError::UnknownCurve(7)));
        assert!(Address::from_raw(1 << 60).is_err());
        assert!(Address::from_raw(1 << 22).is_err());
    }

    #[test]
    fn test_next_hop_strips_leading_segment() {
        let address = Address::encode(&[1, 2], Name::FREQUENCY, CurveType::Target).unwrap();

        let (hop, rest) = address.next_hop().unwrap();
        assert_eq!(hop, 1);
        assert_eq!(rest.route().as_slice(), &[2]);
        assert_eq!(rest.name(), Name::FREQUENCY);
        assert_eq!(rest.curve(), CurveType::Target);

        let (hop, rest) = rest.next_hop().unwrap();
        assert_eq!(hop, 2);
        assert!(rest.is_local());
        assert_eq!(rest, Address::local(Name::FREQUENCY, CurveType::Target));
        assert!(rest.next_hop().is_none());
    }

    #[test]
    fn test_f64_wire_round_trip() {
        let address = Address::encode(&[1023, 1023, 1023, 1023], Name::new(511).unwrap(), CurveType::Cancel).unwrap();
        assert_eq!(Address::from_f64(address.to_f64()).unwrap(), address);
        assert!(Address::from_f64(1.5).is_err());
        assert!(Address::from_f64(-8.0).is_err());
    }

    #[test]
    fn test_display() {
        let address = Address::encode(&[2, 1], Name::GAIN, CurveType::Linear).unwrap();
        assert_eq!(address.to_string(), "2.1.gain.linear");
        assert_eq!(Address::local(Name::START, CurveType::Set).to_string(), "start");
        assert_eq!(Address::local(Name::new(300).unwrap(), CurveType::Set).to_string(), "300");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(Name::parse("gain"), Some(Name::GAIN));
        assert_eq!(Name::parse("Q"), Some(Name::Q));
        assert_eq!(Name::parse("42"), Some(Name::new(42).unwrap()));
        assert_eq!(Name::parse("nonsense"), None);
        assert_eq!(CurveType::parse("step"), Some(CurveType::Set));
    }
}
