//! Peripheral addressing.

use std::fmt;

/// Bluetooth LE address type of a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressType {
    /// Public (IEEE-assigned) device address.
    #[default]
    Public,
    /// Random device address.
    Random,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Address of a peripheral to open a session with.
///
/// The address itself is an opaque MAC-like string; it is only interpreted
/// by the host stack at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralAddress {
    address: String,
    address_type: AddressType,
}

impl PeripheralAddress {
    /// Create a public address.
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_type(address, AddressType::Public)
    }

    /// Create a random address.
    pub fn random(address: impl Into<String>) -> Self {
        Self::with_type(address, AddressType::Random)
    }

    /// Create an address with an explicit address type.
    pub fn with_type(address: impl Into<String>, address_type: AddressType) -> Self {
        Self {
            address: address.into(),
            address_type,
        }
    }

    /// The device address string.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The address type.
    pub fn address_type(&self) -> AddressType {
        self.address_type
    }
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.address_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_address_type_is_public() {
        let addr = PeripheralAddress::new("4C:65:A8:D0:12:34");
        assert_eq!(addr.address_type(), AddressType::Public);
        assert_eq!(addr.address(), "4C:65:A8:D0:12:34");
    }

    #[test]
    fn test_random_address() {
        let addr = PeripheralAddress::random("C4:7C:8D:6A:00:01");
        assert_eq!(addr.address_type(), AddressType::Random);
    }

    #[test]
    fn test_address_display() {
        let addr = PeripheralAddress::new("4C:65:A8:D0:12:34");
        assert_eq!(addr.to_string(), "4C:65:A8:D0:12:34 (public)");
    }
}
