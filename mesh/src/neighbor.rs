use derive_more::{Display, From};

/// An opaque, network-unique identifier for a gossip neighbor.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From)]
pub struct NeighborId(String);

impl NeighborId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NeighborId {
    fn from(s: &str) -> Self {
        NeighborId(s.to_string())
    }
}
