//! Payment attribution: resolve group-less payments via wallet ownership.
//!
//! Payment trackers often know a wallet but not who controls it. A
//! wallet → group table (from blockchain clustering or manual analysis)
//! resolves those payments. Anything still unresolved stays unattributed
//! and is excluded from group aggregation.

use crate::{
    error::AciResult,
    evidence::PaymentEvent,
    types::{normalize_group_id, GroupId},
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletAttribution {
    wallets: BTreeMap<String, GroupId>,
}

/// Result of an attribution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributed {
    pub payments:     Vec<PaymentEvent>,
    /// Payments that gained a group through the wallet table.
    pub resolved:     usize,
    pub unattributed: usize,
}

impl WalletAttribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON object mapping wallet id → group name.
    pub fn load(path: &str) -> AciResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let raw: BTreeMap<String, String> = serde_json::from_str(&content)?;
        let mut table = Self::new();
        for (wallet, group) in raw {
            table.insert(&wallet, &group);
        }
        Ok(table)
    }

    pub fn insert(&mut self, wallet_id: &str, group: &str) {
        let group_id = normalize_group_id(group);
        if group_id.is_empty() {
            log::warn!("ignoring wallet {wallet_id} with empty group name");
            return;
        }
        self.wallets.insert(wallet_id.trim().to_string(), group_id);
    }

    pub fn group_for(&self, wallet_id: &str) -> Option<&GroupId> {
        self.wallets.get(wallet_id.trim())
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Produce attributed copies of `payments`. A group already present on
    /// the payment is kept; the wallet table only fills gaps.
    pub fn attribute(&self, payments: &[PaymentEvent]) -> Attributed {
        let mut resolved = 0;
        let mut unattributed = 0;
        let payments = payments
            .iter()
            .map(|p| {
                let mut out = p.clone();
                if out.group_id.is_none() {
                    out.group_id = self.group_for(&p.wallet_id).cloned();
                    if out.group_id.is_some() {
                        resolved += 1;
                    } else {
                        unattributed += 1;
                    }
                }
                out
            })
            .collect();

        log::debug!("attribution: {resolved} resolved, {unattributed} unattributed");
        Attributed { payments, resolved, unattributed }
    }
}
