//! Equity holdings loaded from a JSON file.
//!
//! Prices are whatever the file carries; no quotes are fetched. Investment,
//! present value, gain/loss and portfolio weight are derived from the
//! purchase price, quantity and current market price of each holding.

use crate::error::PortfolioError;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub particulars: String,
    pub purchase_price: f64,
    pub quantity: f64,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub sector: String,
    /// Current market price. Without one the holding is valued at cost.
    #[serde(default)]
    pub cmp: Option<f64>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub latest_earnings: Option<f64>,
}

impl Holding {
    pub fn investment(&self) -> f64 {
        self.purchase_price * self.quantity
    }

    pub fn market_price(&self) -> f64 {
        self.cmp.unwrap_or(self.purchase_price)
    }

    pub fn present_value(&self) -> f64 {
        self.market_price() * self.quantity
    }

    pub fn gain_loss(&self) -> f64 {
        self.present_value() - self.investment()
    }

    pub fn sector(&self) -> &str {
        match self.sector.trim() {
            "" => UNCATEGORIZED,
            s => s,
        }
    }

    fn validate(&self) -> Result<(), PortfolioError> {
        let invalid = |reason: &str| PortfolioError::InvalidHolding {
            name: self.particulars.clone(),
            reason: reason.to_string(),
        };
        if self.particulars.trim().is_empty() {
            return Err(invalid("name is required"));
        }
        if !self.purchase_price.is_finite() || self.purchase_price < 0.0 {
            return Err(invalid("purchase price must be a non-negative number"));
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(invalid("quantity must be a non-negative number"));
        }
        if self.cmp.is_some_and(|p| !p.is_finite() || p < 0.0) {
            return Err(invalid("market price must be a non-negative number"));
        }
        Ok(())
    }
}

/// Per-sector totals, in the order sectors first appear.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorSummary {
    pub sector: String,
    pub total_investment: f64,
    pub total_present_value: f64,
    pub total_gain_loss: f64,
    pub stock_count: usize,
}

impl SectorSummary {
    pub fn return_percentage(&self) -> f64 {
        percent_of(self.total_gain_loss, self.total_investment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioTotals {
    pub total_investment: f64,
    pub total_present_value: f64,
    pub total_gain_loss: f64,
    pub total_gain_loss_percentage: f64,
}

// accepts either a bare list or `{"holdings": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum HoldingsFile {
    List(Vec<Holding>),
    Wrapped { holdings: Vec<Holding> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Portfolio {
    pub holdings: Vec<Holding>,
}

impl Portfolio {
    pub fn from_string(data: &str) -> Result<Portfolio, PortfolioError> {
        let holdings = match serde_json::from_str::<HoldingsFile>(data)? {
            HoldingsFile::List(holdings) => holdings,
            HoldingsFile::Wrapped { holdings } => holdings,
        };
        for holding in &holdings {
            holding.validate()?;
        }
        Ok(Portfolio { holdings })
    }

    pub fn from_file(path: &Path) -> Result<Portfolio, PortfolioError> {
        let data = read_to_string(path).map_err(|source| PortfolioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_string(&data)
    }

    pub fn total_investment(&self) -> f64 {
        self.holdings.iter().map(Holding::investment).sum()
    }

    pub fn total_present_value(&self) -> f64 {
        self.holdings.iter().map(Holding::present_value).sum()
    }

    /// Share of total investment held in `holding`, 0 for an empty book.
    pub fn portfolio_percentage(&self, holding: &Holding) -> f64 {
        percent_of(holding.investment(), self.total_investment())
    }

    pub fn totals(&self) -> PortfolioTotals {
        let total_investment = self.total_investment();
        let total_present_value = self.total_present_value();
        let total_gain_loss = total_present_value - total_investment;
        PortfolioTotals {
            total_investment,
            total_present_value,
            total_gain_loss,
            total_gain_loss_percentage: percent_of(total_gain_loss, total_investment),
        }
    }

    pub fn sector_summaries(&self) -> Vec<SectorSummary> {
        let mut sectors: Vec<SectorSummary> = Vec::new();
        for holding in &self.holdings {
            let name = holding.sector();
            let idx = match sectors.iter().position(|s| s.sector == name) {
                Some(idx) => idx,
                None => {
                    sectors.push(SectorSummary {
                        sector: name.to_string(),
                        total_investment: 0.0,
                        total_present_value: 0.0,
                        total_gain_loss: 0.0,
                        stock_count: 0,
                    });
                    sectors.len() - 1
                }
            };
            let summary = &mut sectors[idx];
            summary.total_investment += holding.investment();
            summary.total_present_value += holding.present_value();
            summary.total_gain_loss += holding.gain_loss();
            summary.stock_count += 1;
        }
        sectors
    }
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}
