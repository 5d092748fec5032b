//! IP address keys: parsing, printing and bit access.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::{Error, Result};

/// Address family of a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn version(&self) -> u8 {
        match self {
            IpFamily::V4 => 4,
            IpFamily::V6 => 6,
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            IpFamily::V4 => 4,
            IpFamily::V6 => 16,
        }
    }
}

/// A 4- or 16-byte address key, stored most significant byte first.
///
/// IPv4-mapped IPv6 addresses are normalised to their IPv4 form on parse,
/// so `::ffff:51.51.51.51` and `51.51.51.51` evaluate identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpKey {
    bytes: [u8; 16],
    family: IpFamily,
}

impl IpKey {
    pub fn from_slice(bytes: &[u8]) -> Result<IpKey> {
        let family = match bytes.len() {
            4 => IpFamily::V4,
            16 => IpFamily::V6,
            other => {
                return Err(Error::InvalidInput(format!(
                    "an IP key must be 4 or 16 bytes, not {other}"
                )));
            }
        };
        let mut key = [0u8; 16];
        key[..bytes.len()].copy_from_slice(bytes);
        Ok(IpKey { bytes: key, family })
    }

    /// Parses an IPv4 or IPv6 literal.
    pub fn parse(text: &str) -> Result<IpKey> {
        let addr: IpAddr = text
            .trim()
            .parse()
            .map_err(|_| Error::IncorrectIpAddressFormat(text.to_string()))?;
        Ok(IpKey::from(addr))
    }

    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// The significant bytes: 4 for IPv4, 16 for IPv6.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.family.byte_len()]
    }

    pub fn bit_len(&self) -> u32 {
        self.family.byte_len() as u32 * 8
    }
}

impl From<IpAddr> for IpKey {
    fn from(addr: IpAddr) -> IpKey {
        match addr {
            IpAddr::V4(v4) => IpKey::from(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpKey::from(v4),
                None => IpKey::from(v6),
            },
        }
    }
}

impl From<Ipv4Addr> for IpKey {
    fn from(addr: Ipv4Addr) -> IpKey {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&addr.octets());
        IpKey {
            bytes,
            family: IpFamily::V4,
        }
    }
}

impl From<Ipv6Addr> for IpKey {
    fn from(addr: Ipv6Addr) -> IpKey {
        IpKey {
            bytes: addr.octets(),
            family: IpFamily::V6,
        }
    }
}

impl std::fmt::Display for IpKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.family {
            IpFamily::V4 => write!(
                f,
                "{}",
                Ipv4Addr::new(self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3])
            ),
            IpFamily::V6 => write!(f, "{}", Ipv6Addr::from(self.bytes)),
        }
    }
}
