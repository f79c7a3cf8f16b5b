use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    Error, Result,
    tlv::{TlvDecode, TlvEncode, TlvTag, TlvValueType, ensure_decodable, ensure_encodable},
};

/// First hardened child index
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

const MASTER_SYMBOL: &str = "m";
const SEPARATOR: char = '/';

/// One step of a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DerivationNode {
    /// Hardened child, index without the offset
    Hardened(u32),
    /// Non-hardened child
    NonHardened(u32),
}

impl DerivationNode {
    /// Node from a wire index, the hardened bit selecting the variant
    pub const fn from_index(index: u32) -> Self {
        if index >= HARDENED_OFFSET {
            Self::Hardened(index - HARDENED_OFFSET)
        } else {
            Self::NonHardened(index)
        }
    }

    /// Wire index, with the hardened offset applied
    pub const fn index(&self) -> u32 {
        match self {
            Self::Hardened(index) => *index | HARDENED_OFFSET,
            Self::NonHardened(index) => *index,
        }
    }

    /// Whether the node is hardened
    pub const fn is_hardened(&self) -> bool {
        matches!(self, Self::Hardened(_))
    }
}

impl fmt::Display for DerivationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardened(index) => write!(f, "{index}'"),
            Self::NonHardened(index) => write!(f, "{index}"),
        }
    }
}

impl FromStr for DerivationNode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (digits, hardened) = match trimmed.strip_suffix(['\'', 'h', 'H']) {
            Some(digits) => (digits.trim_end(), true),
            None => (trimmed, false),
        };
        let index: u32 = digits
            .parse()
            .map_err(|_| Error::WrongDerivationPath(format!("invalid node {s:?}")))?;
        if index >= HARDENED_OFFSET {
            return Err(Error::WrongDerivationPath(format!("index out of range {index}")));
        }
        Ok(if hardened {
            Self::Hardened(index)
        } else {
            Self::NonHardened(index)
        })
    }
}

/// Ordered list of derivation nodes, rendered as `m/44'/0'/0'/1/0`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DerivationPath {
    nodes: Vec<DerivationNode>,
}

impl DerivationPath {
    /// Path from nodes
    pub const fn new(nodes: Vec<DerivationNode>) -> Self {
        Self { nodes }
    }

    /// Nodes of the path
    pub fn nodes(&self) -> &[DerivationNode] {
        &self.nodes
    }

    /// Copy of this path with `node` appended
    pub fn extended(&self, node: DerivationNode) -> Self {
        let mut nodes = self.nodes.clone();
        nodes.push(node);
        Self { nodes }
    }

    /// Wire form, four big-endian bytes per node
    pub fn to_bytes(&self) -> Vec<u8> {
        self.nodes
            .iter()
            .flat_map(|node| node.index().to_be_bytes())
            .collect()
    }

    /// Parse the wire form
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() % 4 != 0 {
            return Err(Error::WrongDerivationPath(format!(
                "{} bytes is not a whole number of nodes",
                data.len()
            )));
        }
        let nodes = data
            .chunks_exact(4)
            .map(|chunk| DerivationNode::from_index(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
            .collect();
        Ok(Self { nodes })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASTER_SYMBOL)?;
        for node in &self.nodes {
            write!(f, "{SEPARATOR}{node}")?;
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(SEPARATOR);
        let root = parts.next().unwrap_or_default().trim();
        if !root.eq_ignore_ascii_case(MASTER_SYMBOL) {
            return Err(Error::WrongDerivationPath(format!("{s:?} does not start at m")));
        }

        let nodes = parts.map(str::parse).collect::<Result<Vec<_>>>()?;
        if nodes.is_empty() {
            return Err(Error::WrongDerivationPath(format!("{s:?} has no nodes")));
        }
        Ok(Self { nodes })
    }
}

impl From<Vec<DerivationNode>> for DerivationPath {
    fn from(nodes: Vec<DerivationNode>) -> Self {
        Self::new(nodes)
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

impl TlvEncode for DerivationPath {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::DerivationPath])?;
        Ok(self.to_bytes())
    }
}

impl TlvDecode for DerivationPath {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        ensure_decodable(tag, &[TlvValueType::DerivationPath])?;
        Self::from_bytes(value)
    }
}

/// Change chain of a BIP44 path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bip44Chain {
    /// Receiving addresses
    #[default]
    External = 0,
    /// Change addresses
    Internal = 1,
}

/// `m/44'/coin'/account'/change/index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bip44 {
    /// SLIP-44 coin type
    pub coin_type: u32,
    /// Account
    pub account: u32,
    /// Change chain
    pub change: Bip44Chain,
    /// Address index
    pub address_index: u32,
}

impl Bip44 {
    const PURPOSE: u32 = 44;

    /// Builder for the given coin, account 0, external chain, index 0
    pub const fn new(coin_type: u32) -> Self {
        Self {
            coin_type,
            account: 0,
            change: Bip44Chain::External,
            address_index: 0,
        }
    }

    /// Full path
    pub fn path(&self) -> DerivationPath {
        DerivationPath::new(vec![
            DerivationNode::Hardened(Self::PURPOSE),
            DerivationNode::Hardened(self.coin_type),
            DerivationNode::Hardened(self.account),
            DerivationNode::NonHardened(self.change as u32),
            DerivationNode::NonHardened(self.address_index),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_forms() {
        let expected = DerivationPath::new(vec![
            DerivationNode::Hardened(44),
            DerivationNode::Hardened(0),
            DerivationNode::Hardened(0),
            DerivationNode::NonHardened(1),
            DerivationNode::NonHardened(0),
        ]);

        for text in ["m / 44' / 0' / 0' / 1 / 0", "m/44'/0'/0'/1/0", "M/44'/0'/0'/1/0", "m/44h/0H/0'/1/0"] {
            assert_eq!(text.parse::<DerivationPath>().unwrap(), expected, "{text}");
        }
        assert_eq!(expected.to_string(), "m/44'/0'/0'/1/0");
    }

    #[test]
    fn test_reject_malformed_paths() {
        for text in ["44'/m'/0'/1/0", "m /", "m|44'|0'|0'|1|0", "m", "m/2147483648"] {
            assert!(
                matches!(text.parse::<DerivationPath>(), Err(Error::WrongDerivationPath(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn test_wire_form() {
        let path: DerivationPath = "m/0/1".parse().unwrap();
        assert_eq!(hex::encode(path.encode(TlvTag::WalletHDPath).unwrap()), "0000000000000001");

        let hardened: DerivationPath = "m/0'/1'/2".parse().unwrap();
        assert_eq!(hex::encode(hardened.to_bytes()), "800000008000000100000002");

        let decoded = DerivationPath::decode(
            TlvTag::WalletHDPath,
            &hex::decode("800000008000000100000002").unwrap(),
        )
        .unwrap();
        assert_eq!(decoded.to_string(), "m/0'/1'/2");

        assert!(DerivationPath::from_bytes(&hex::decode("000000000000000100").unwrap()).is_err());
    }

    #[test]
    fn test_bip44_and_extension() {
        assert_eq!(Bip44::new(0).path().to_string(), "m/44'/0'/0'/0/0");

        let path: DerivationPath = "m/44'/0'/0'/1".parse().unwrap();
        assert_eq!(
            path.extended(DerivationNode::NonHardened(0)).to_string(),
            "m/44'/0'/0'/1/0"
        );
    }

    #[test]
    fn test_json_is_text() {
        let path: DerivationPath = "m/44'/60'/0'/0/0".parse().unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"m/44'/60'/0'/0/0\"");
        assert_eq!(serde_json::from_str::<DerivationPath>(&json).unwrap(), path);
    }
}
