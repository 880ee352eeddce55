//! Per-symbol position lifecycle: entry, pyramiding adds, exits.
//!
//! Each tick is two-phase. [`PyramidEngine::plan`] decides what to do from the
//! current price and signal; the caller places the order and only then calls
//! `commit_*`. A failed order therefore leaves the state untouched and the
//! same price-based trigger fires again on the next tick.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{Direction, ExchangePosition, OrderSide, PositionState, SignalReport, SymbolRules};

use super::exit_evaluator::{self, CloseReason, ExitDecision};
use super::{PositionSizer, ReversalPolicy, TradingConfig};

/// Owner of all tracked positions, keyed by symbol.
#[derive(Debug, Default)]
pub struct PositionManager {
    positions: HashMap<String, PositionState>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&PositionState> {
        self.positions.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut PositionState> {
        self.positions.get_mut(symbol)
    }

    /// Insert or replace the state for its symbol.
    pub fn set(&mut self, state: PositionState) {
        self.positions.insert(state.symbol.clone(), state);
    }

    pub fn remove(&mut self, symbol: &str) -> Option<PositionState> {
        self.positions.remove(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.positions.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// What the orchestrator should do for a symbol this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickAction {
    NoOp,
    Enter,
    Add,
    Close,
}

/// Planned action for one symbol on one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickDecision {
    pub action: TickAction,

    /// Position direction the action applies to
    pub direction: Option<Direction>,

    /// Quantity to trade; zero for `NoOp` (and for a dust close)
    pub quantity: Decimal,

    /// Price the decision was made at
    pub price: Decimal,

    pub close_reason: Option<CloseReason>,

    pub reason: String,
}

impl TickDecision {
    pub fn no_op(price: Decimal, reason: impl Into<String>) -> Self {
        Self {
            action: TickAction::NoOp,
            direction: None,
            quantity: Decimal::ZERO,
            price,
            close_reason: None,
            reason: reason.into(),
        }
    }

    fn enter(direction: Direction, quantity: Decimal, price: Decimal) -> Self {
        Self {
            action: TickAction::Enter,
            direction: Some(direction),
            quantity,
            price,
            close_reason: None,
            reason: format!("{} entry", direction),
        }
    }

    fn add(direction: Direction, quantity: Decimal, price: Decimal, reason: String) -> Self {
        Self {
            action: TickAction::Add,
            direction: Some(direction),
            quantity,
            price,
            close_reason: None,
            reason,
        }
    }

    fn close(direction: Direction, quantity: Decimal, price: Decimal, why: CloseReason) -> Self {
        Self {
            action: TickAction::Close,
            direction: Some(direction),
            quantity,
            price,
            close_reason: Some(why),
            reason: why.to_string(),
        }
    }

    /// Order side needed to carry out this decision.
    pub fn order_side(&self) -> Option<OrderSide> {
        let direction = self.direction?;
        match self.action {
            TickAction::Enter | TickAction::Add => Some(OrderSide::opening(direction)),
            TickAction::Close => Some(OrderSide::closing(direction)),
            TickAction::NoOp => None,
        }
    }

    /// Whether the order must be sent reduce-only.
    pub fn reduce_only(&self) -> bool {
        self.action == TickAction::Close
    }
}

/// Inputs fetched by the orchestrator before planning a tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInputs<'a> {
    pub price: Decimal,
    pub equity: Decimal,
    pub rules: &'a SymbolRules,
    pub report: &'a SignalReport,
    /// Absolute quantity currently held on the exchange
    pub held_qty: Decimal,
}

/// Result of aligning tracked state with the exchange position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    InSync,
    /// Exchange is flat; tracked state was dropped
    Dropped(Direction),
    /// Untracked exchange position is now tracked
    Adopted(Direction),
}

/// Stateful decision engine for entries, adds and exits.
#[derive(Debug)]
pub struct PyramidEngine {
    config: TradingConfig,
    sizer: PositionSizer,
    positions: PositionManager,
}

impl PyramidEngine {
    pub fn new(config: TradingConfig) -> Self {
        let sizer = PositionSizer::new(config.clone());
        Self {
            config,
            sizer,
            positions: PositionManager::new(),
        }
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&PositionState> {
        self.positions.get(symbol)
    }

    /// Align tracked state with what the exchange reports for `symbol`.
    ///
    /// A remainder too small to close under `rules` counts as flat: it is
    /// neither adopted nor kept tracked.
    pub fn reconcile(
        &mut self,
        symbol: &str,
        exchange: &ExchangePosition,
        price: Decimal,
        rules: &SymbolRules,
    ) -> Reconciliation {
        let tracked_direction = self.positions.get(symbol).map(|p| p.direction);
        let held = exchange.abs_quantity();
        let live_direction = exchange
            .direction()
            .filter(|_| self.sizer.close_qty(held, rules).tradable);

        match (tracked_direction, live_direction) {
            (None, None) => {
                if exchange.direction().is_some() {
                    debug!(symbol = %symbol, qty = %held, "Ignoring untradable exchange remainder");
                }
                Reconciliation::InSync
            }
            (Some(direction), None) => {
                self.positions.remove(symbol);
                warn!(
                    symbol = %symbol,
                    direction = %direction,
                    qty = %held,
                    "No closable exchange position, dropping tracked position"
                );
                Reconciliation::Dropped(direction)
            }
            (Some(tracked), Some(actual)) if tracked == actual => {
                if let Some(pos) = self.positions.get_mut(symbol) {
                    pos.total_qty = held;
                }
                Reconciliation::InSync
            }
            (_, Some(actual)) => {
                let entry = if exchange.entry_price > Decimal::ZERO {
                    exchange.entry_price
                } else {
                    price
                };
                let state = PositionState::open(symbol, actual, entry, held);
                info!(
                    symbol = %symbol,
                    direction = %actual,
                    entry = %entry,
                    qty = %state.total_qty,
                    "Adopting exchange position"
                );
                self.positions.set(state);
                Reconciliation::Adopted(actual)
            }
        }
    }

    /// Decide this tick's action for `symbol`. Exits are evaluated before adds.
    pub fn plan(&mut self, symbol: &str, inputs: TickInputs<'_>) -> TickDecision {
        let price = inputs.price;
        if price <= Decimal::ZERO {
            return TickDecision::no_op(price, format!("invalid price {}", price));
        }

        let config = &self.config;
        let sizer = &self.sizer;

        let Some(pos) = self.positions.get_mut(symbol) else {
            return plan_entry(sizer, symbol, &inputs);
        };

        let held = if inputs.held_qty > Decimal::ZERO {
            inputs.held_qty
        } else {
            pos.total_qty
        };

        if let ExitDecision::Close(why) =
            exit_evaluator::evaluate(pos, price, config.max_loss_pct, config.trail_giveback_pct)
        {
            let qty = sizer.close_qty(held, inputs.rules).quantity;
            return TickDecision::close(pos.direction, qty, price, why);
        }

        if inputs.report.signal.direction() == Some(pos.direction.opposite()) {
            return match config.reversal_policy {
                ReversalPolicy::Ignore => TickDecision::no_op(
                    price,
                    format!("opposing {} signal ignored", inputs.report.signal),
                ),
                ReversalPolicy::FlattenAndReopen => {
                    let qty = sizer.close_qty(held, inputs.rules).quantity;
                    TickDecision::close(pos.direction, qty, price, CloseReason::Reversal)
                }
            };
        }

        plan_add(config, sizer, pos, &inputs)
    }

    /// Record a filled entry.
    pub fn commit_entry(&mut self, symbol: &str, decision: &TickDecision) {
        let Some(direction) = decision.direction else {
            return;
        };
        if decision.action != TickAction::Enter || self.positions.contains(symbol) {
            return;
        }

        let state = PositionState::open(symbol, direction, decision.price, decision.quantity);
        info!(
            symbol = %symbol,
            direction = %direction,
            price = %decision.price,
            qty = %decision.quantity,
            "Position opened"
        );
        self.positions.set(state);
    }

    /// Record a filled pyramiding add.
    pub fn commit_add(&mut self, symbol: &str, decision: &TickDecision) {
        if decision.action != TickAction::Add {
            return;
        }
        let max_layers = self.config.pyramid_max_layers;
        let Some(pos) = self.positions.get_mut(symbol) else {
            return;
        };
        if pos.add_count >= max_layers {
            return;
        }

        pos.record_add(decision.quantity, decision.price);
        info!(
            symbol = %symbol,
            layer = pos.add_count,
            price = %decision.price,
            qty = %decision.quantity,
            total_qty = %pos.total_qty,
            "Pyramid add recorded"
        );
    }

    /// Destroy the state of a closed position.
    pub fn commit_close(&mut self, symbol: &str) -> Option<PositionState> {
        let removed = self.positions.remove(symbol);
        if let Some(ref pos) = removed {
            info!(
                symbol = %symbol,
                direction = %pos.direction,
                adds = pos.add_count,
                "Position closed"
            );
        }
        removed
    }
}

fn plan_entry(sizer: &PositionSizer, symbol: &str, inputs: &TickInputs<'_>) -> TickDecision {
    let Some(direction) = inputs.report.signal.direction() else {
        return TickDecision::no_op(inputs.price, "no signal");
    };

    let sizing = sizer.entry_qty(symbol, inputs.equity, inputs.price, inputs.rules);
    if !sizing.tradable {
        return TickDecision::no_op(inputs.price, format!("untradable: {}", sizing.reason));
    }

    TickDecision::enter(direction, sizing.quantity, inputs.price)
}

fn plan_add(
    config: &TradingConfig,
    sizer: &PositionSizer,
    pos: &PositionState,
    inputs: &TickInputs<'_>,
) -> TickDecision {
    let price = inputs.price;

    if !config.pyramid_enabled {
        return TickDecision::no_op(price, "holding");
    }
    if pos.add_count >= config.pyramid_max_layers {
        return TickDecision::no_op(price, format!("holding at max layers ({})", pos.add_count));
    }

    let favorable = pos.favorable_move_pct(price);
    let by_move = favorable >= config.pyramid_trigger_pct;
    let by_breakout = inputs.report.breakout
        && inputs.report.signal.direction() == Some(pos.direction)
        && favorable > Decimal::ZERO;

    if !by_move && !by_breakout {
        return TickDecision::no_op(price, "holding");
    }

    let sizing = sizer.add_qty(pos.base_qty, price, inputs.rules);
    if !sizing.tradable {
        return TickDecision::no_op(price, format!("add untradable: {}", sizing.reason));
    }

    let trigger = if by_move { "move" } else { "breakout" };
    debug!(
        symbol = %pos.symbol,
        favorable_pct = %favorable,
        trigger = trigger,
        layer = pos.add_count + 1,
        "Pyramid add triggered"
    );

    TickDecision::add(
        pos.direction,
        sizing.quantity,
        price,
        format!("pyramid #{} by {}", pos.add_count + 1, trigger),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;
    use rust_decimal_macros::dec;

    fn fine_rules() -> SymbolRules {
        SymbolRules::new(dec!(0.001), Decimal::ZERO, dec!(5), dec!(0.01))
    }

    fn engine(config: TradingConfig) -> PyramidEngine {
        PyramidEngine::new(config)
    }

    fn inputs<'a>(price: Decimal, rules: &'a SymbolRules, report: &'a SignalReport) -> TickInputs<'a> {
        TickInputs {
            price,
            equity: dec!(1000),
            rules,
            report,
            held_qty: Decimal::ZERO,
        }
    }

    fn open_long(engine: &mut PyramidEngine, price: Decimal, qty: Decimal) {
        let decision = TickDecision::enter(Direction::Long, qty, price);
        engine.commit_entry("BTCUSDT", &decision);
    }

    #[test]
    fn test_flat_without_signal_stays_flat() {
        let mut engine = engine(TradingConfig::default());
        let rules = fine_rules();
        let report = SignalReport::none();

        let decision = engine.plan("BTCUSDT", inputs(dec!(100), &rules, &report));
        assert_eq!(decision.action, TickAction::NoOp);
        assert!(engine.position("BTCUSDT").is_none());
    }

    #[test]
    fn test_entry_is_planned_then_committed() {
        let mut engine = engine(TradingConfig::default());
        let rules = fine_rules();
        let report = SignalReport::new(Signal::Short);

        let decision = engine.plan("BTCUSDT", inputs(dec!(100), &rules, &report));
        assert_eq!(decision.action, TickAction::Enter);
        assert_eq!(decision.direction, Some(Direction::Short));
        assert_eq!(decision.quantity, dec!(1));
        assert_eq!(decision.order_side(), Some(OrderSide::Sell));
        assert!(engine.position("BTCUSDT").is_none());

        engine.commit_entry("BTCUSDT", &decision);
        let pos = engine.position("BTCUSDT").unwrap();
        assert_eq!(pos.entry_price, dec!(100));
        assert_eq!(pos.base_qty, dec!(1));
        assert_eq!(pos.add_count, 0);
        assert_eq!(pos.last_add_price, dec!(100));
    }

    #[test]
    fn test_untradable_entry_is_no_op() {
        let mut engine = engine(TradingConfig::default());
        let rules = fine_rules();
        let report = SignalReport::new(Signal::Long);
        let mut tick = inputs(dec!(100), &rules, &report);
        tick.equity = Decimal::ZERO;

        let decision = engine.plan("BTCUSDT", tick);
        assert_eq!(decision.action, TickAction::NoOp);
        assert!(decision.reason.contains("untradable"));
    }

    #[test]
    fn test_three_adds_then_capped() {
        let config = TradingConfig {
            pyramid_add_ratio: dec!(0.5),
            pyramid_trigger_pct: dec!(0.01),
            pyramid_max_layers: 3,
            trail_giveback_pct: dec!(0.9),
            ..Default::default()
        };
        let mut engine = engine(config);
        let rules = SymbolRules::new(dec!(0.001), Decimal::ZERO, Decimal::ZERO, dec!(0.01));
        let report = SignalReport::none();
        open_long(&mut engine, dec!(100), dec!(1));

        let mut price = dec!(100);
        for layer in 1..=3u32 {
            price *= dec!(1.01);
            let decision = engine.plan("BTCUSDT", inputs(price, &rules, &report));
            assert_eq!(decision.action, TickAction::Add, "layer {}", layer);
            assert_eq!(decision.quantity, dec!(0.5));
            engine.commit_add("BTCUSDT", &decision);
            assert_eq!(engine.position("BTCUSDT").unwrap().add_count, layer);
        }

        price *= dec!(1.01);
        let decision = engine.plan("BTCUSDT", inputs(price, &rules, &report));
        assert_eq!(decision.action, TickAction::NoOp);

        let pos = engine.position("BTCUSDT").unwrap();
        assert_eq!(pos.add_count, 3);
        assert_eq!(pos.total_qty, dec!(2.5));
    }

    #[test]
    fn test_add_count_bounded_over_long_rally() {
        let config = TradingConfig {
            pyramid_trigger_pct: dec!(0.005),
            pyramid_max_layers: 2,
            ..Default::default()
        };
        let mut engine = engine(config);
        let rules = fine_rules();
        let report = SignalReport::new(Signal::Long);
        open_long(&mut engine, dec!(100), dec!(1));

        let mut price = dec!(100);
        for _ in 0..50 {
            price += dec!(1);
            let decision = engine.plan("BTCUSDT", inputs(price, &rules, &report));
            if decision.action == TickAction::Add {
                engine.commit_add("BTCUSDT", &decision);
            }
            assert!(engine.position("BTCUSDT").unwrap().add_count <= 2);
        }
        assert_eq!(engine.position("BTCUSDT").unwrap().add_count, 2);
    }

    #[test]
    fn test_failed_add_does_not_advance_and_retries() {
        let config = TradingConfig {
            pyramid_trigger_pct: dec!(0.01),
            ..Default::default()
        };
        let mut engine = engine(config);
        let rules = fine_rules();
        let report = SignalReport::none();
        open_long(&mut engine, dec!(100), dec!(1));

        let first = engine.plan("BTCUSDT", inputs(dec!(101), &rules, &report));
        assert_eq!(first.action, TickAction::Add);
        // order failed: nothing committed

        let retry = engine.plan("BTCUSDT", inputs(dec!(101), &rules, &report));
        assert_eq!(retry.action, TickAction::Add);
        assert_eq!(retry.quantity, first.quantity);
        assert_eq!(engine.position("BTCUSDT").unwrap().add_count, 0);
    }

    #[test]
    fn test_breakout_triggers_add_below_move_threshold() {
        let config = TradingConfig {
            pyramid_trigger_pct: dec!(0.05),
            ..Default::default()
        };
        let mut engine = engine(config);
        let rules = fine_rules();
        open_long(&mut engine, dec!(100), dec!(1));

        let plain = SignalReport::new(Signal::Long);
        let decision = engine.plan("BTCUSDT", inputs(dec!(100.5), &rules, &plain));
        assert_eq!(decision.action, TickAction::NoOp);

        let breakout = SignalReport::new(Signal::Long).with_breakout(true);
        let decision = engine.plan("BTCUSDT", inputs(dec!(100.5), &rules, &breakout));
        assert_eq!(decision.action, TickAction::Add);
        engine.commit_add("BTCUSDT", &decision);

        // same price again: breakout alone cannot stack another add
        let decision = engine.plan("BTCUSDT", inputs(dec!(100.5), &rules, &breakout));
        assert_eq!(decision.action, TickAction::NoOp);
    }

    #[test]
    fn test_exit_runs_before_add() {
        let config = TradingConfig {
            pyramid_trigger_pct: dec!(0.01),
            ..Default::default()
        };
        let mut engine = engine(config);
        let rules = fine_rules();
        let report = SignalReport::new(Signal::Long).with_breakout(true);
        open_long(&mut engine, dec!(100), dec!(1));

        let decision = engine.plan("BTCUSDT", inputs(dec!(150), &rules, &report));
        assert_eq!(decision.action, TickAction::Add);
        engine.commit_add("BTCUSDT", &decision);

        // peak 0.50, price 140 yields 0.40 < 0.425
        let decision = engine.plan("BTCUSDT", inputs(dec!(140), &rules, &report));
        assert_eq!(decision.action, TickAction::Close);
        assert_eq!(decision.close_reason, Some(CloseReason::TrailingStop));
        assert_eq!(decision.quantity, dec!(1.5));
        assert_eq!(decision.order_side(), Some(OrderSide::Sell));
        assert!(decision.reduce_only());

        engine.commit_close("BTCUSDT");
        assert!(engine.position("BTCUSDT").is_none());
    }

    #[test]
    fn test_stop_loss_closes_held_quantity_floored() {
        let mut engine = engine(TradingConfig::default());
        let rules = SymbolRules::new(dec!(0.01), Decimal::ZERO, dec!(5), dec!(0.01));
        let report = SignalReport::none();
        open_long(&mut engine, dec!(100), dec!(1));

        let mut tick = inputs(dec!(69), &rules, &report);
        tick.held_qty = dec!(1.0049);
        let decision = engine.plan("BTCUSDT", tick);

        assert_eq!(decision.close_reason, Some(CloseReason::StopLoss));
        assert_eq!(decision.quantity, dec!(1));
    }

    #[test]
    fn test_opposing_signal_ignored() {
        let mut engine = engine(TradingConfig::default());
        let rules = fine_rules();
        let report = SignalReport::new(Signal::Short);
        open_long(&mut engine, dec!(100), dec!(1));

        let decision = engine.plan("BTCUSDT", inputs(dec!(110), &rules, &report));
        assert_eq!(decision.action, TickAction::NoOp);
        assert!(engine.position("BTCUSDT").is_some());
    }

    #[test]
    fn test_opposing_signal_flattens_then_reopens() {
        let config = TradingConfig {
            reversal_policy: ReversalPolicy::FlattenAndReopen,
            ..Default::default()
        };
        let mut engine = engine(config);
        let rules = fine_rules();
        let report = SignalReport::new(Signal::Short);
        open_long(&mut engine, dec!(100), dec!(1));

        let decision = engine.plan("BTCUSDT", inputs(dec!(101), &rules, &report));
        assert_eq!(decision.action, TickAction::Close);
        assert_eq!(decision.close_reason, Some(CloseReason::Reversal));
        engine.commit_close("BTCUSDT");

        let decision = engine.plan("BTCUSDT", inputs(dec!(101), &rules, &report));
        assert_eq!(decision.action, TickAction::Enter);
        assert_eq!(decision.direction, Some(Direction::Short));
    }

    #[test]
    fn test_reconcile_drops_and_adopts() {
        let mut engine = engine(TradingConfig::default());
        open_long(&mut engine, dec!(100), dec!(1));

        let rules = fine_rules();
        let result = engine.reconcile("BTCUSDT", &ExchangePosition::flat(), dec!(100), &rules);
        assert_eq!(result, Reconciliation::Dropped(Direction::Long));
        assert!(engine.position("BTCUSDT").is_none());

        let short = ExchangePosition {
            quantity: dec!(-0.3),
            entry_price: dec!(2500),
        };
        let result = engine.reconcile("ETHUSDT", &short, dec!(2400), &rules);
        assert_eq!(result, Reconciliation::Adopted(Direction::Short));
        let pos = engine.position("ETHUSDT").unwrap();
        assert_eq!(pos.entry_price, dec!(2500));
        assert_eq!(pos.total_qty, dec!(0.3));

        let result = engine.reconcile("ETHUSDT", &short, dec!(2400), &rules);
        assert_eq!(result, Reconciliation::InSync);
    }

    #[test]
    fn test_reconcile_treats_dust_as_flat() {
        let mut engine = engine(TradingConfig::default());
        let rules = SymbolRules::new(dec!(0.001), dec!(0.001), dec!(5), dec!(0.01));
        let dust = ExchangePosition {
            quantity: dec!(0.0004),
            entry_price: dec!(100),
        };

        // never adopted, so no add can be sized off it
        for _ in 0..3 {
            assert_eq!(engine.reconcile("BTCUSDT", &dust, dec!(100), &rules), Reconciliation::InSync);
            assert!(engine.position("BTCUSDT").is_none());
        }

        // a tracked position whose exchange size shrank to dust is dropped
        open_long(&mut engine, dec!(100), dec!(1));
        let result = engine.reconcile("BTCUSDT", &dust, dec!(60), &rules);
        assert_eq!(result, Reconciliation::Dropped(Direction::Long));
        assert!(engine.position("BTCUSDT").is_none());

        // flat engine plans a fresh entry
        let report = SignalReport::new(Signal::Long);
        let decision = engine.plan("BTCUSDT", inputs(dec!(100), &rules, &report));
        assert_eq!(decision.action, TickAction::Enter);
    }

    #[test]
    fn test_commit_entry_does_not_overwrite() {
        let mut engine = engine(TradingConfig::default());
        open_long(&mut engine, dec!(100), dec!(1));
        open_long(&mut engine, dec!(200), dec!(5));

        assert_eq!(engine.position("BTCUSDT").unwrap().entry_price, dec!(100));
        assert_eq!(engine.positions().len(), 1);
    }
}
