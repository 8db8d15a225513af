//! Contract classifier (C4, §4.4).
//!
//! Probes a freshly-seen address through ERC-165, then falls back to a
//! chain of duck-typed calls any compliant ERC-20/721/1155 contract would
//! answer. Every probe failure is treated as "this contract doesn't support
//! that interface", never as a fatal error — §4.4 is explicit that probe
//! failures must not block the fallback chain. Results are memoized per
//! address for the life of the process.

use dashmap::DashMap;
use serde_json::json;
use studio_indexer_types::{Addr, ContractType};
use tokio_util::sync::CancellationToken;

use crate::rpc::SharedRpcPool;

alloy_sol_types::sol! {
    function supportsInterface(bytes4 interfaceId) external view returns (bool);
    function name() external view returns (string);
    function symbol() external view returns (string);
    function decimals() external view returns (uint8);
    function totalSupply() external view returns (uint256);
    function tokenURI(uint256 tokenId) external view returns (string);
    function uri(uint256 id) external view returns (string);
}

/// `supportsInterface(bytes4)` selector for ERC-165 itself.
const ERC165_INTERFACE_ID: [u8; 4] = [0x01, 0xff, 0xc9, 0xa7];
/// `supportsInterface(bytes4)` selector for ERC-721.
const ERC721_INTERFACE_ID: [u8; 4] = [0x80, 0xac, 0x58, 0xcd];
/// `supportsInterface(bytes4)` selector for ERC-1155.
const ERC1155_INTERFACE_ID: [u8; 4] = [0xd9, 0xb6, 0x7a, 0x26];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// `eth_getCode` returned `0x` — an externally owned account, not a
    /// contract at all.
    NotAContract,
    Classified(ContractType),
}

pub struct ContractClassifier {
    pool: SharedRpcPool,
    memo: DashMap<Addr, Classification>,
}

impl ContractClassifier {
    pub fn new(pool: SharedRpcPool) -> Self {
        ContractClassifier {
            pool,
            memo: DashMap::new(),
        }
    }

    pub async fn classify(&self, address: Addr, cancel: &CancellationToken) -> Classification {
        if let Some(cached) = self.memo.get(&address) {
            return *cached;
        }
        // Only a completed probe chain is memoized (§4.4: "memoized per
        // address for the lifetime of the process" describes a genuine
        // classification outcome). A transport hiccup on `eth_getCode`
        // itself is not a classification at all, so it's never inserted —
        // the next transfer involving this address re-probes from scratch.
        match self.classify_uncached(address, cancel).await {
            Ok(result) => {
                self.memo.insert(address, result);
                result
            }
            Err(()) => {
                tracing::warn!(%address, "eth_getCode failed, leaving address unclassified for retry");
                Classification::Classified(ContractType::Unknown)
            }
        }
    }

    async fn classify_uncached(&self, address: Addr, cancel: &CancellationToken) -> Result<Classification, ()> {
        let code = self
            .pool
            .call::<_, String>("eth_getCode", json!([address.to_string(), "latest"]), cancel)
            .await
            .map_err(|_| ())?;
        if code == "0x" || code.is_empty() {
            return Ok(Classification::NotAContract);
        }

        if self.probe_interface(address, ERC165_INTERFACE_ID, cancel).await {
            if self.probe_interface(address, ERC721_INTERFACE_ID, cancel).await {
                return Ok(Classification::Classified(ContractType::Erc721));
            }
            if self.probe_interface(address, ERC1155_INTERFACE_ID, cancel).await {
                return Ok(Classification::Classified(ContractType::Erc1155));
            }
        }

        if self.probe_erc20(address, cancel).await {
            return Ok(Classification::Classified(ContractType::Erc20));
        }
        if self.probe_erc721_fallback(address, cancel).await {
            return Ok(Classification::Classified(ContractType::Erc721));
        }
        if self.probe_erc1155_fallback(address, cancel).await {
            return Ok(Classification::Classified(ContractType::Erc1155));
        }

        Ok(Classification::Classified(ContractType::Unknown))
    }

    async fn probe_interface(&self, address: Addr, interface_id: [u8; 4], cancel: &CancellationToken) -> bool {
        let call = supportsInterfaceCall {
            interfaceId: interface_id.into(),
        };
        match self.eth_call(address, call.abi_encode(), cancel).await {
            // A compliant `supportsInterface` return is a single ABI-encoded
            // bool: one 32-byte word whose low byte is 0 or 1.
            Some(returndata) => returndata.last().is_some_and(|b| *b != 0) && returndata.len() == 32,
            None => false,
        }
    }

    /// §4.4 non-165 ERC-20 fallback: `{name, symbol, decimals, totalSupply}`
    /// must all answer.
    async fn probe_erc20(&self, address: Addr, cancel: &CancellationToken) -> bool {
        let name = self.eth_call(address, nameCall {}.abi_encode(), cancel).await;
        let symbol = self.eth_call(address, symbolCall {}.abi_encode(), cancel).await;
        let decimals = self.eth_call(address, decimalsCall {}.abi_encode(), cancel).await;
        let total_supply = self.eth_call(address, totalSupplyCall {}.abi_encode(), cancel).await;
        name.is_some() && symbol.is_some() && decimals.is_some() && total_supply.is_some()
    }

    /// §4.4 non-165 ERC-721 fallback: `{name, symbol, tokenURI(0)}`.
    async fn probe_erc721_fallback(&self, address: Addr, cancel: &CancellationToken) -> bool {
        let name = self.eth_call(address, nameCall {}.abi_encode(), cancel).await;
        let symbol = self.eth_call(address, symbolCall {}.abi_encode(), cancel).await;
        let token_uri = self
            .eth_call(
                address,
                tokenURICall {
                    tokenId: alloy_primitives::U256::ZERO,
                }
                .abi_encode(),
                cancel,
            )
            .await;
        name.is_some() && symbol.is_some() && token_uri.is_some()
    }

    /// §4.4 non-165 ERC-1155 fallback: `uri(0)`.
    async fn probe_erc1155_fallback(&self, address: Addr, cancel: &CancellationToken) -> bool {
        self.eth_call(
            address,
            uriCall {
                id: alloy_primitives::U256::ZERO,
            }
            .abi_encode(),
            cancel,
        )
        .await
        .is_some()
    }

    /// Issues `eth_call` against `address` with ABI-encoded `calldata`.
    /// Returns `None` on any RPC error or a reverted/empty result — a probe
    /// that doesn't answer is evidence the contract doesn't support that
    /// interface, never a fatal condition.
    async fn eth_call(&self, address: Addr, calldata: Vec<u8>, cancel: &CancellationToken) -> Option<Vec<u8>> {
        let params = json!([
            {
                "to": address.to_string(),
                "data": format!("0x{}", hex::encode(calldata)),
            },
            "latest"
        ]);
        let hex_result: String = self.pool.call("eth_call", params, cancel).await.ok()?;
        let trimmed = hex_result.strip_prefix("0x").unwrap_or(&hex_result);
        if trimmed.is_empty() {
            return None;
        }
        hex::decode(trimmed).ok()
    }

    pub fn memoized_count(&self) -> usize {
        self.memo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcPool;

    #[test]
    fn fresh_classifier_has_no_memoized_addresses() {
        let pool = std::sync::Arc::new(RpcPool::new(vec![url::Url::parse("http://localhost:8545").unwrap()]).unwrap());
        let classifier = ContractClassifier::new(pool);
        assert_eq!(classifier.memoized_count(), 0);
    }
}
