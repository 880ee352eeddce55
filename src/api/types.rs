//! API response types for the Binance USDT-M futures REST API.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::SymbolRules;

/// Response of /fapi/v1/exchangeInfo (only the fields we use).
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSymbol {
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// Symbol filter, tagged by `filterType`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    PriceFilter { tick_size: Decimal },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: Decimal, min_qty: Decimal },
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional { notional: Decimal },
    #[serde(other)]
    Other,
}

impl ExchangeSymbol {
    /// Collapse the filter list into rules. Missing filters stay zero, which
    /// the quantizer reports as untradable.
    pub fn to_rules(&self) -> SymbolRules {
        let mut rules = SymbolRules::new(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);

        for filter in &self.filters {
            match filter {
                SymbolFilter::PriceFilter { tick_size } => rules.tick_size = *tick_size,
                SymbolFilter::LotSize { step_size, min_qty } => {
                    rules.step_size = *step_size;
                    rules.min_qty = *min_qty;
                }
                SymbolFilter::MinNotional { notional } => rules.min_notional = *notional,
                SymbolFilter::Other => {}
            }
        }

        rules
    }

    pub fn is_trading(&self) -> bool {
        self.status.is_empty() || self.status == "TRADING"
    }
}

/// Response of /fapi/v1/ticker/price.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub price: Decimal,
}

/// Response of /fapi/v1/ticker/24hr.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    #[serde(default)]
    pub quote_volume: Decimal,
}

/// Response of /fapi/v1/premiumIndex.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndex {
    #[serde(default)]
    pub last_funding_rate: Decimal,
}

/// Response of /fapi/v2/account (only the equity figure).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Wallet balance plus unrealized P&L
    pub total_margin_balance: Decimal,
}

/// One entry of /fapi/v2/positionRisk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol: String,
    pub position_amt: Decimal,
    pub entry_price: Decimal,
}

/// Response of POST /fapi/v1/order with `newOrderRespType=RESULT`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: u64,
    #[serde(default)]
    pub client_order_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_exchange_symbol_filters() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "status": "TRADING",
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "556.80", "maxPrice": "4529764", "tickSize": "0.10"},
                {"filterType": "LOT_SIZE", "stepSize": "0.001", "maxQty": "1000", "minQty": "0.001"},
                {"filterType": "MARKET_LOT_SIZE", "stepSize": "0.001", "maxQty": "120", "minQty": "0.001"},
                {"filterType": "MIN_NOTIONAL", "notional": "100"},
                {"filterType": "PERCENT_PRICE", "multiplierUp": "1.0500", "multiplierDown": "0.9500"}
            ]
        }"#;

        let symbol: ExchangeSymbol = serde_json::from_str(json).unwrap();
        let rules = symbol.to_rules();

        assert!(symbol.is_trading());
        assert_eq!(rules.step_size, dec!(0.001));
        assert_eq!(rules.min_qty, dec!(0.001));
        assert_eq!(rules.min_notional, dec!(100));
        assert_eq!(rules.tick_size, dec!(0.1));
    }

    #[test]
    fn test_missing_lot_size_leaves_zero_step() {
        let json = r#"{"symbol": "NEWUSDT", "filters": [{"filterType": "MIN_NOTIONAL", "notional": "5"}]}"#;
        let symbol: ExchangeSymbol = serde_json::from_str(json).unwrap();
        assert!(!symbol.to_rules().has_valid_step());
    }

    #[test]
    fn test_position_risk_parses_strings() {
        let json = r#"[{"symbol": "ETHUSDT", "positionAmt": "-0.250", "entryPrice": "3120.55",
            "markPrice": "3100.00", "positionSide": "BOTH"}]"#;
        let items: Vec<PositionRisk> = serde_json::from_str(json).unwrap();

        assert_eq!(items[0].position_amt, dec!(-0.25));
        assert_eq!(items[0].entry_price, dec!(3120.55));
    }
}
