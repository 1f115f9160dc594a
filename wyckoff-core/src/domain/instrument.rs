use serde::{Deserialize, Serialize};

/// Broad instrument class. Decides which threshold table the classifier uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Futures,
    Crypto,
    Forex,
    Cfd,
}

/// What the `volume` column of a bar actually measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    /// Exchange-reported traded volume.
    Real,
    /// Tick-count proxy (OTC forex, CFDs). Volume gates are looser.
    TickProxy,
}

impl AssetClass {
    pub fn volume_kind(self) -> VolumeKind {
        match self {
            AssetClass::Equity | AssetClass::Futures | AssetClass::Crypto => VolumeKind::Real,
            AssetClass::Forex | AssetClass::Cfd => VolumeKind::TickProxy,
        }
    }
}

impl Default for AssetClass {
    fn default() -> Self {
        AssetClass::Equity
    }
}
