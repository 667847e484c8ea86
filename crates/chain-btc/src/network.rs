use bitcoin::consensus::Params;
use bitcoin::Network;

/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl BtcNetwork {
    /// Convert to the `bitcoin` crate's `Network` type.
    pub fn to_bitcoin_network(self) -> Network {
        match self {
            BtcNetwork::Mainnet => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
            BtcNetwork::Signet => Network::Signet,
            BtcNetwork::Regtest => Network::Regtest,
        }
    }

    /// Consensus parameters for this network (proof-of-work limit etc.).
    pub fn params(self) -> Params {
        Params::new(self.to_bitcoin_network())
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
            BtcNetwork::Signet => write!(f, "signet"),
            BtcNetwork::Regtest => write!(f, "regtest"),
        }
    }
}
