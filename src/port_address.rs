use crate::convert::Convertable;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::convert::TryFrom;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

/// A `PortAddress` is the 15-bit address of one DMX universe, split as
/// `net (7 bits) : subnet (4 bits) : universe (4 bits)`.
///
/// The canonical string form is `"N:S:U"` with decimal fields:
///
/// ```
/// use artnet_client::PortAddress;
/// let a: PortAddress = "1:2:3".parse().unwrap();
/// assert_eq!(a.net(), 1);
/// assert_eq!(a.subnet(), 2);
/// assert_eq!(a.universe(), 3);
/// assert_eq!(a.to_string(), "1:2:3");
/// ```
///
/// The trait `From` is implemented for `u8` and `TryFrom` for `u16` and
/// `i32`, converting from the packed value:
///
/// ```
/// use artnet_client::PortAddress;
/// use std::convert::TryInto;
/// let a: PortAddress = 1.into(); //convert from u8 never fails
/// let b: PortAddress = 2u16.try_into().unwrap(); //u16 could fail if too big
/// let c: PortAddress = 3_000.try_into().unwrap(); //i32 could fail if too big or negative
/// ```
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct PortAddress(u16);

impl PortAddress {
    /// Build an address from its three fields, range-checking each one.
    pub fn new(net: u8, subnet: u8, universe: u8) -> Result<Self> {
        if net >= 128 {
            return Err(Error::InvalidPortAddress(format!(
                "net must be from 0 to 127, got {}",
                net
            )));
        }
        if subnet >= 16 {
            return Err(Error::InvalidPortAddress(format!(
                "subnet must be from 0 to 15, got {}",
                subnet
            )));
        }
        if universe >= 16 {
            return Err(Error::InvalidPortAddress(format!(
                "universe must be from 0 to 15, got {}",
                universe
            )));
        }
        Ok(PortAddress(
            ((net as u16) << 8) | ((subnet as u16) << 4) | universe as u16,
        ))
    }

    /// Bits 14-8 of the packed value
    pub fn net(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Bits 7-4 of the packed value
    pub fn subnet(self) -> u8 {
        ((self.0 >> 4) & 0x0F) as u8
    }

    /// Bits 3-0 of the packed value, as carried in the SwIn/SwOut nibbles
    pub fn universe(self) -> u8 {
        (self.0 & 0x0F) as u8
    }

    /// The low byte of the packed value, as carried in the ArtDmx SubUni field
    pub fn sub_uni(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

// basic support for u8 literals
impl From<u8> for PortAddress {
    fn from(value: u8) -> Self {
        // cannot over/underflow
        PortAddress(value as u16)
    }
}

impl TryFrom<u16> for PortAddress {
    type Error = Error;
    fn try_from(value: u16) -> Result<Self> {
        if value <= 32_767 {
            Ok(PortAddress(value))
        } else {
            Err(Error::InvalidPortAddress(format!(
                "must be from 0 to 32767, got {}",
                value
            )))
        }
    }
}

// support un-annotated literals
impl TryFrom<i32> for PortAddress {
    type Error = Error;
    fn try_from(value: i32) -> Result<Self> {
        if (0..=32_767).contains(&value) {
            Ok(PortAddress(value as u16))
        } else {
            Err(Error::InvalidPortAddress(format!(
                "must be from 0 to 32767, got {}",
                value
            )))
        }
    }
}

impl From<PortAddress> for u16 {
    fn from(value: PortAddress) -> u16 {
        value.0
    }
}

impl fmt::Display for PortAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}:{}", self.net(), self.subnet(), self.universe())
    }
}

impl FromStr for PortAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.split(':');
        let mut next = |name: &str| -> Result<u8> {
            fields
                .next()
                .ok_or_else(|| {
                    Error::InvalidPortAddress(format!("{:?} is missing the {} field", s, name))
                })?
                .trim()
                .parse()
                .map_err(|_| {
                    Error::InvalidPortAddress(format!("{:?} has a non-decimal {} field", s, name))
                })
        };
        let net = next("net")?;
        let subnet = next("subnet")?;
        let universe = next("universe")?;
        if fields.next().is_some() {
            return Err(Error::InvalidPortAddress(format!(
                "{:?} has more than three fields",
                s
            )));
        }
        PortAddress::new(net, subnet, universe)
    }
}

impl<T> Convertable<T> for PortAddress {
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let value = cursor.read_u16::<LittleEndian>().map_err(Error::CursorEof)?;
        // bit 15 is reserved on the wire, transmitted as zero but tolerated
        Ok(PortAddress(value & 0x7FFF))
    }
    fn write_to_buffer(&self, buffer: &mut Vec<u8>, _: &T) -> Result<()> {
        buffer
            .write_u16::<LittleEndian>(self.0)
            .map_err(Error::CursorEof)
    }
    #[cfg(test)]
    fn get_test_value() -> Self {
        PortAddress(1)
    }
    #[cfg(test)]
    fn is_equal(&self, other: &Self) -> bool {
        self == other
    }
}
