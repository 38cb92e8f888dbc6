//! Fee and tax calculation.
//!
//! Both parties to a job pay the same service fee: a tiered mobilization fee plus a percentage of the job amount.
//! The payer's share (plus tax) is added on top of the hold; the payee's share is withheld from what they receive.
//! The platform keeps both shares and the tax as the application fee.
//!
//! Everything here is pure and deterministic, so that fees can be recomputed exactly when a capture amount differs from
//! the authorized amount.
use std::collections::HashMap;

use epg_common::MinorUnits;
use serde::Serialize;

pub const DEFAULT_PERCENTAGE_BPS: u32 = 1_250;
pub const DEFAULT_PAYOUT_FEE_BPS: u32 = 1_250;
pub const DEFAULT_MINIMUM_PAYOUT: i64 = 1_000;

/// One band of the mobilization fee table: amounts strictly below `below` pay `fee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MobilizationBand {
    pub below: MinorUnits,
    pub fee: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Sorted by `below`, ascending
    bands: Vec<MobilizationBand>,
    /// Applies to amounts at or above the last band
    top_band_fee: MinorUnits,
    percentage_bps: u32,
    payout_fee_bps: u32,
    minimum_payout: MinorUnits,
    default_tax_bps: u32,
    tax_bps: HashMap<String, u32>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            bands: vec![MobilizationBand { below: MinorUnits::from(5_000), fee: MinorUnits::from(250) }],
            top_band_fee: MinorUnits::from(450),
            percentage_bps: DEFAULT_PERCENTAGE_BPS,
            payout_fee_bps: DEFAULT_PAYOUT_FEE_BPS,
            minimum_payout: MinorUnits::from(DEFAULT_MINIMUM_PAYOUT),
            default_tax_bps: 0,
            tax_bps: HashMap::new(),
        }
    }
}

/// The complete fee split for a job amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub amount: MinorUnits,
    pub mobilization_fee: MinorUnits,
    pub percentage_fee: MinorUnits,
    pub tax: MinorUnits,
    /// Paid by the payer on top of the job amount
    pub deployer_fee: MinorUnits,
    /// Withheld from the payee
    pub deployee_fee: MinorUnits,
    pub application_fee: MinorUnits,
}

impl FeeBreakdown {
    /// What is placed on hold (or charged): the job amount plus the payer's fee and the tax.
    pub fn hold_amount(&self) -> MinorUnits {
        self.amount + self.deployer_fee + self.tax
    }

    /// What the payee keeps once the platform has taken its fees.
    pub fn deployee_revenue(&self) -> MinorUnits {
        self.amount - self.deployee_fee
    }
}

impl FeeSchedule {
    pub fn new(bands: Vec<MobilizationBand>, top_band_fee: MinorUnits, percentage_bps: u32) -> Self {
        let mut bands = bands;
        bands.sort_by_key(|b| b.below);
        Self { bands, top_band_fee, percentage_bps, ..Default::default() }
    }

    pub fn with_tax_rates(mut self, default_bps: u32, rates: HashMap<String, u32>) -> Self {
        self.default_tax_bps = default_bps;
        self.tax_bps = rates.into_iter().map(|(k, v)| (k.to_ascii_uppercase(), v)).collect();
        self
    }

    pub fn with_payout_fee(mut self, payout_fee_bps: u32, minimum_payout: MinorUnits) -> Self {
        self.payout_fee_bps = payout_fee_bps;
        self.minimum_payout = minimum_payout;
        self
    }

    pub fn minimum_payout(&self) -> MinorUnits {
        self.minimum_payout
    }

    pub fn mobilization_fee(&self, amount: MinorUnits) -> MinorUnits {
        self.bands.iter().find(|band| amount < band.below).map(|band| band.fee).unwrap_or(self.top_band_fee)
    }

    pub fn percentage_fee(&self, amount: MinorUnits) -> MinorUnits {
        amount.ceil_basis_points(self.percentage_bps)
    }

    /// Tax on `amount` for the given jurisdiction (matched case-insensitively). Unknown or missing jurisdictions use the
    /// default rate.
    pub fn tax_for(&self, amount: MinorUnits, jurisdiction: Option<&str>) -> MinorUnits {
        let bps = jurisdiction
            .and_then(|j| self.tax_bps.get(&j.to_ascii_uppercase()).copied())
            .unwrap_or(self.default_tax_bps);
        amount.ceil_basis_points(bps)
    }

    pub fn payout_fee(&self, amount: MinorUnits) -> MinorUnits {
        amount.ceil_basis_points(self.payout_fee_bps)
    }

    pub fn calculate(&self, amount: MinorUnits, jurisdiction: Option<&str>) -> FeeBreakdown {
        let mobilization_fee = self.mobilization_fee(amount);
        let percentage_fee = self.percentage_fee(amount);
        let tax = self.tax_for(amount, jurisdiction);
        let deployer_fee = mobilization_fee + percentage_fee;
        let deployee_fee = mobilization_fee + percentage_fee;
        FeeBreakdown {
            amount,
            mobilization_fee,
            percentage_fee,
            tax,
            deployer_fee,
            deployee_fee,
            application_fee: deployer_fee + deployee_fee + tax,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn m(v: i64) -> MinorUnits {
        MinorUnits::from(v)
    }

    #[test]
    fn hundred_dollar_job() {
        let fees = FeeSchedule::default().calculate(m(10_000), None);
        assert_eq!(fees.mobilization_fee, m(450));
        assert_eq!(fees.percentage_fee, m(1_250));
        assert_eq!(fees.deployer_fee, m(1_700));
        assert_eq!(fees.deployee_fee, m(1_700));
        assert_eq!(fees.tax, m(0));
        assert_eq!(fees.application_fee, m(3_400));
        assert_eq!(fees.hold_amount(), m(11_700));
        assert_eq!(fees.deployee_revenue(), m(8_300));
    }

    #[test]
    fn mobilization_bands() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.mobilization_fee(m(4_999)), m(250));
        assert_eq!(fees.mobilization_fee(m(5_000)), m(450));
        let tiered = FeeSchedule::new(
            vec![MobilizationBand { below: m(10_000), fee: m(300) }, MobilizationBand { below: m(1_000), fee: m(100) }],
            m(900),
            1_000,
        );
        assert_eq!(tiered.mobilization_fee(m(999)), m(100));
        assert_eq!(tiered.mobilization_fee(m(1_000)), m(300));
        assert_eq!(tiered.mobilization_fee(m(50_000)), m(900));
    }

    #[test]
    fn percentage_fee_rounds_up() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.percentage_fee(m(1_001)), m(126));
        assert_eq!(fees.payout_fee(m(2_000)), m(250));
    }

    #[test]
    fn fee_identities_hold_for_many_amounts() {
        let schedule = FeeSchedule::default().with_tax_rates(0, HashMap::from([("ca".to_string(), 725)]));
        for amount in [1, 99, 4_999, 5_000, 5_001, 12_345, 1_000_000] {
            for jurisdiction in [None, Some("CA"), Some("ny")] {
                let f = schedule.calculate(m(amount), jurisdiction);
                assert_eq!(f.application_fee, f.deployer_fee + f.deployee_fee + f.tax);
                assert_eq!(f.deployee_revenue(), f.amount - f.deployee_fee);
                assert_eq!(f.hold_amount() - f.application_fee, f.deployee_revenue());
            }
        }
    }

    #[test]
    fn tax_by_jurisdiction() {
        let schedule = FeeSchedule::default().with_tax_rates(100, HashMap::from([("TX".to_string(), 625)]));
        assert_eq!(schedule.tax_for(m(10_000), Some("tx")), m(625));
        assert_eq!(schedule.tax_for(m(10_000), Some("WA")), m(100));
        assert_eq!(schedule.tax_for(m(10_000), None), m(100));
    }
}
