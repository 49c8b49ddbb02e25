use crate::{AptosClient, ChainAdapter, ChainClientError, MovementClient, Result, SuiClient};
use config_manager::ChainsConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracker_core::Chain;

/// Closed mapping from chain identifier to its adapter. The chain set is
/// known at build time; adding a chain means adding a variant and a
/// constructor arm here.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn from_config(chains: &ChainsConfig, page_limit: u32) -> Result<Self> {
        let mut adapters: HashMap<Chain, Arc<dyn ChainAdapter>> = HashMap::new();
        adapters.insert(
            Chain::Aptos,
            Arc::new(AptosClient::new(&chains.aptos, page_limit)?),
        );
        adapters.insert(
            Chain::Sui,
            Arc::new(SuiClient::new(&chains.sui, page_limit)?),
        );
        adapters.insert(
            Chain::Movement,
            Arc::new(MovementClient::new(&chains.movement, page_limit)?),
        );
        Ok(Self { adapters })
    }

    /// Build a registry from explicit adapter instances. Used to inject
    /// alternative implementations in tests.
    pub fn with_adapters(adapters: HashMap<Chain, Arc<dyn ChainAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn resolve(&self, chain: Chain) -> Result<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or_else(|| ChainClientError::UnsupportedChain(chain.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_manager::SystemConfig;

    #[test]
    fn registry_resolves_all_supported_chains() {
        let config = SystemConfig::default();
        let registry = AdapterRegistry::from_config(&config.chains, 100).unwrap();

        for chain in Chain::ALL {
            let adapter = registry.resolve(chain).unwrap();
            assert_eq!(adapter.chain(), chain);
        }
    }

    #[test]
    fn missing_adapter_fails_loudly() {
        let registry = AdapterRegistry::with_adapters(HashMap::new());
        let Err(err) = registry.resolve(Chain::Sui) else {
            panic!("resolving an unregistered chain must fail");
        };
        assert!(err.to_string().contains("Unsupported blockchain"));
    }
}
