use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle of a resident segment.
///
/// Handle 0 is reserved: it never names a segment and is used by [`Reg`]
/// to carry plain numbers.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SegmentId(pub u16);

impl SegmentId {
    pub const NONE: SegmentId = SegmentId(0);

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// A segment-qualified address, the interpreter's register value.
///
/// Numbers are registers whose segment is [`SegmentId::NONE`]; the all-zero
/// register doubles as the null address.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Reg {
    pub segment: SegmentId,
    pub offset: u32,
}

impl Reg {
    pub const NULL: Reg = Reg {
        segment: SegmentId::NONE,
        offset: 0,
    };

    #[inline]
    pub const fn new(segment: SegmentId, offset: u32) -> Reg {
        Reg { segment, offset }
    }

    /// A plain 16-bit value as found in script data.
    #[inline]
    pub const fn number(value: u16) -> Reg {
        Reg {
            segment: SegmentId::NONE,
            offset: value as u32,
        }
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Reg::NULL
    }

    #[inline]
    pub fn is_number(self) -> bool {
        self.segment.is_none()
    }

    /// Low 16 bits of the offset, i.e. the raw word this register was built from.
    #[inline]
    pub fn raw(self) -> u16 {
        self.offset as u16
    }

    #[inline]
    pub fn with_offset(self, offset: u32) -> Reg {
        Reg { offset, ..self }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:04x}", self.segment, self.offset)
    }
}
