//! Balance-skew computation and rebalancing proposals

use crate::{
    config::RebalancingConfig,
    venues::VenueRegistry,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A recommended transfer to pull an asset's venue balances back toward
/// 50/50
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancingProposal {
    /// Asset to move
    pub asset: String,
    /// Venue holding the excess
    pub from_venue: String,
    /// Venue short of the asset
    pub to_venue: String,
    /// Signed skew between the two venues, normalized by their total
    pub skew: f64,
    /// Recommended transfer amount in asset units
    pub amount: f64,
    /// Estimated transfer fee in asset units
    pub estimated_fee: f64,
    /// Fee as a percentage of the transfer amount
    pub fee_pct: f64,
    /// True when the fee percentage is under the configured ceiling
    pub viable: bool,
}

/// Computes rebalancing proposals from per-venue balances
pub struct RebalancePlanner {
    config: RebalancingConfig,
}

impl RebalancePlanner {
    /// Create a planner from the rebalancing configuration
    pub fn new(config: RebalancingConfig) -> Self {
        Self { config }
    }

    /// Propose a transfer for one asset given its per-venue balances.
    /// Returns `None` when balances are within the skew threshold or too
    /// small to normalize.
    pub fn propose(&self, asset: &str, balances: &[(String, f64)]) -> Option<RebalancingProposal> {
        if balances.len() < 2 {
            return None;
        }

        let (richest, poorest) = balances.iter().skip(1).fold(
            (&balances[0], &balances[0]),
            |(max, min), entry| {
                (
                    if entry.1 > max.1 { entry } else { max },
                    if entry.1 < min.1 { entry } else { min },
                )
            },
        );

        let total = richest.1 + poorest.1;
        if total <= 0.0 {
            return None;
        }

        let skew = (richest.1 - poorest.1) / total;
        if skew.abs() < self.config.skew_threshold {
            return None;
        }

        // Move half the excess so both venues land on the midpoint
        let amount = (richest.1 - poorest.1) / 2.0;
        let estimated_fee = self.config.transfer_fees.get(asset).copied().unwrap_or(0.0);
        let fee_pct = if amount > 0.0 {
            estimated_fee / amount * 100.0
        } else {
            0.0
        };

        Some(RebalancingProposal {
            asset: asset.to_string(),
            from_venue: richest.0.clone(),
            to_venue: poorest.0.clone(),
            skew,
            amount,
            estimated_fee,
            fee_pct,
            viable: fee_pct <= self.config.fee_ceiling_pct,
        })
    }

    /// Read live balances from every venue and propose transfers for the
    /// given assets. A venue that fails the balance read is skipped for
    /// that asset.
    pub async fn plan(&self, registry: &VenueRegistry, assets: &[String]) -> Vec<RebalancingProposal> {
        let mut proposals = Vec::new();
        for asset in assets {
            let mut balances = Vec::new();
            for (name, venue) in registry.iter() {
                match venue.balance(asset).await {
                    Ok(balance) => balances.push((name.clone(), balance)),
                    Err(e) => warn!(venue = %name, asset = %asset, error = %e, "balance read failed"),
                }
            }
            if let Some(proposal) = self.propose(asset, &balances) {
                proposals.push(proposal);
            }
        }
        proposals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn planner(skew_threshold: f64, fee: f64, ceiling_pct: f64) -> RebalancePlanner {
        let mut transfer_fees = HashMap::new();
        transfer_fees.insert("S".to_string(), fee);
        RebalancePlanner::new(RebalancingConfig {
            skew_threshold,
            transfer_fees,
            fee_ceiling_pct: ceiling_pct,
            refresh_interval_secs: 300,
        })
    }

    #[test]
    fn test_balanced_holdings_need_no_transfer() {
        let planner = planner(0.2, 0.1, 3.0);
        let balances = vec![("alpha".to_string(), 10.0), ("beta".to_string(), 9.0)];
        assert!(planner.propose("S", &balances).is_none());
    }

    #[test]
    fn test_skewed_holdings_propose_midpoint_transfer() {
        let planner = planner(0.2, 0.1, 3.0);
        let balances = vec![("alpha".to_string(), 8.0), ("beta".to_string(), 2.0)];

        let proposal = planner.propose("S", &balances).unwrap();
        assert_eq!(proposal.from_venue, "alpha");
        assert_eq!(proposal.to_venue, "beta");
        assert!((proposal.skew - 0.6).abs() < 1e-12);
        assert!((proposal.amount - 3.0).abs() < 1e-12);
        // 0.1 / 3.0 = 3.33% > 3.0% ceiling
        assert!(!proposal.viable);
    }

    #[test]
    fn test_viability_under_ceiling() {
        let planner = planner(0.2, 0.01, 3.0);
        let balances = vec![("alpha".to_string(), 8.0), ("beta".to_string(), 2.0)];
        let proposal = planner.propose("S", &balances).unwrap();
        assert!(proposal.viable);
        assert!((proposal.fee_pct - 0.01 / 3.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_asset_fee_defaults_to_zero() {
        let planner = planner(0.2, 0.1, 3.0);
        let balances = vec![("alpha".to_string(), 8.0), ("beta".to_string(), 2.0)];
        let proposal = planner.propose("T", &balances).unwrap();
        assert_eq!(proposal.estimated_fee, 0.0);
        assert!(proposal.viable);
    }

    #[test]
    fn test_empty_balances() {
        let planner = planner(0.2, 0.1, 3.0);
        assert!(planner.propose("S", &[]).is_none());
        assert!(planner
            .propose("S", &[("alpha".to_string(), 1.0)])
            .is_none());
        assert!(planner
            .propose("S", &[("alpha".to_string(), 0.0), ("beta".to_string(), 0.0)])
            .is_none());
    }
}
