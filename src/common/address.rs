use std::{fmt, str::FromStr};

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ledger identity of an account, contract or token: `shard.realm.num`.
#[derive(Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct EntityId {
    pub shard: u32,
    pub realm: u64,
    pub num: u64,
}

impl EntityId {
    pub const fn new(shard: u32, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }

    pub const fn num(num: u64) -> Self {
        Self::new(0, 0, num)
    }

    /// The "long-zero" EVM address: 4 bytes shard, 8 bytes realm, 8 bytes num.
    pub fn to_address(&self) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0..4].copy_from_slice(&self.shard.to_be_bytes());
        bytes[4..12].copy_from_slice(&self.realm.to_be_bytes());
        bytes[12..20].copy_from_slice(&self.num.to_be_bytes());
        Address::from(bytes)
    }

    /// Decodes the long-zero layout. Any 20 bytes decode, so an address that
    /// may be an alias has to be looked up as one first.
    pub fn from_long_zero(address: &Address) -> Self {
        let bytes = address.as_slice();
        let mut shard = [0u8; 4];
        let mut realm = [0u8; 8];
        let mut num = [0u8; 8];
        shard.copy_from_slice(&bytes[0..4]);
        realm.copy_from_slice(&bytes[4..12]);
        num.copy_from_slice(&bytes[12..20]);
        Self::new(
            u32::from_be_bytes(shard),
            u64::from_be_bytes(realm),
            u64::from_be_bytes(num),
        )
    }

    /// Shard and realm zero: the address can only be long-zero.
    pub fn is_default_long_zero(address: &Address) -> bool {
        address.as_slice()[..12].iter().all(|byte| *byte == 0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid entity id: '{0}'")]
pub struct InvalidEntityId(pub String);

impl FromStr for EntityId {
    type Err = InvalidEntityId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidEntityId(s.to_string());
        let parts = s
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;
        match parts.as_slice() {
            [num] => Ok(Self::num(*num)),
            [shard, realm, num] => {
                let shard = u32::try_from(*shard).map_err(|_| invalid())?;
                Ok(Self::new(shard, *realm, *num))
            }
            _ => Err(invalid()),
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            D::Error::invalid_value(serde::de::Unexpected::Str(&s), &"entity id 'shard.realm.num'")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_zero_roundtrip() {
        let id = EntityId::num(1234);
        let address = id.to_address();
        assert_eq!(
            format!("{address:#x}"),
            "0x00000000000000000000000000000000000004d2"
        );
        assert_eq!(EntityId::from_long_zero(&address), id);
        assert!(EntityId::is_default_long_zero(&address));
    }

    #[test]
    fn test_long_zero_keeps_shard_and_realm() {
        for id in [EntityId::new(0, 1, 5), EntityId::new(1, 2, 3)] {
            let address = id.to_address();
            assert_eq!(EntityId::from_long_zero(&address), id);
            assert!(!EntityId::is_default_long_zero(&address));
        }
        assert_eq!(
            format!("{:#x}", EntityId::new(1, 2, 3).to_address()),
            "0x0000000100000000000000020000000000000003"
        );
    }

    #[test]
    fn test_alias_is_not_default_long_zero() {
        let alias: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
            .parse()
            .unwrap();
        assert!(!EntityId::is_default_long_zero(&alias));
    }

    #[test]
    fn test_parse() {
        assert_eq!("0.0.98".parse::<EntityId>().unwrap(), EntityId::num(98));
        assert_eq!("1.2.3".parse::<EntityId>().unwrap(), EntityId::new(1, 2, 3));
        assert_eq!("42".parse::<EntityId>().unwrap(), EntityId::num(42));
        assert!("0.0".parse::<EntityId>().is_err());
        assert!("0.0.x".parse::<EntityId>().is_err());
        assert!("4294967296.0.1".parse::<EntityId>().is_err());
    }
}
