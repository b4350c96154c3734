//! Injected page API
//!
//! What a dApp sees: one provider per chain family, each a thin proxy that
//! turns method calls into bridge requests. Nothing here holds key
//! material or touches storage.

pub mod cosmos;
pub mod dogecoin;
pub mod ethereum;

pub use cosmos::{CosmosProvider, OfflineSigner};
pub use dogecoin::DogecoinProvider;
pub use ethereum::EthereumProvider;

use std::sync::Arc;

use crate::bridge::PageBridge;

/// The three providers sharing one bridge
#[derive(Debug, Clone)]
pub struct Providers {
    pub cosmos: CosmosProvider,
    pub ethereum: EthereumProvider,
    pub dogecoin: DogecoinProvider,
}

impl Providers {
    pub fn new(bridge: Arc<PageBridge>) -> Self {
        Self {
            cosmos: CosmosProvider::new(bridge.clone()),
            ethereum: EthereumProvider::new(bridge.clone()),
            dogecoin: DogecoinProvider::new(bridge),
        }
    }
}
