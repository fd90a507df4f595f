//! The hedge cycle state machine.
//!
//! Every entry point (`start`, `handle_order_filled`, `on_price_tick`,
//! `on_timer`) runs to completion before the next one is called. Fill
//! events and price-crossing fallbacks both feed the same reducer
//! ([`CycleEngine::drive`]), so the latches on [`Position`] are the only
//! thing that decides whether a transition has already happened.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use common::{ExponentialBackoff, RetryBudget};
use execution_core::{
    new_cycle_id, parse_client_order_id, AlreadyDoneExt, ExecutionGateway, GatewayError,
    HedgePosition, OrderAmendment, OrderFilled, OrderHandle, OrderRole, OrderSpec, SymbolRules,
};
use metrics::{create_metrics, SharedMetrics};
use model::{PositionSide, PriceTick};

use crate::config::CycleConfig;
use crate::cycle::{Cycle, Phase, Position};
use crate::error::EngineError;
use crate::ladder::{split_quantity, CyclePlan};
use crate::notifier::{Notifier, TracingNotifier};

/// Called once when a cycle ends (completed or abandoned) and the engine
/// is ready to start the next one.
pub type RestartHook = Box<dyn FnOnce() + Send + Sync>;

/// Work the engine has scheduled for later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Re-run the IDLE checks (stale position, sizing, account prep).
    Begin,
    /// Retry the ENTERING phase of the current cycle.
    EntryRetry,
    /// Re-place a stop for a side left without one, or retry a breakeven
    /// move that did not go through.
    Protect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReduceCause {
    Stop,
    TakeProfit,
}

#[derive(Debug)]
enum Transition {
    /// The venue reports `remaining` open on `side` after a reduction.
    Reduced {
        side: PositionSide,
        cause: ReduceCause,
        remaining: Decimal,
    },
    /// `side` is flat.
    Closed(PositionSide),
    /// Move `side`'s stop to its own entry price.
    Breakeven(PositionSide),
}

enum StopOutcome {
    Placed,
    SideFlat,
}

/// Drives one hedge cycle at a time against an [`ExecutionGateway`].
pub struct CycleEngine<G> {
    gateway: G,
    config: CycleConfig,
    notifier: Arc<dyn Notifier>,
    metrics: SharedMetrics,
    phase: Phase,
    cycle: Option<Cycle>,
    on_need_restart: Option<RestartHook>,
    deadline: Option<(Instant, Deadline)>,
    /// Consecutive IDLE checks that found exposure on the symbol.
    stale_rechecks: u32,
    entry_budget: Option<RetryBudget<ExponentialBackoff>>,
    last_price: Option<Decimal>,
    last_reconcile: Option<Instant>,
    account_prepared: bool,
}

impl<G: ExecutionGateway> CycleEngine<G> {
    pub fn new(gateway: G, config: CycleConfig) -> Self {
        Self {
            gateway,
            config,
            notifier: Arc::new(TracingNotifier),
            metrics: create_metrics(),
            phase: Phase::Idle,
            cycle: None,
            on_need_restart: None,
            deadline: None,
            stale_rechecks: 0,
            entry_budget: None,
            last_price: None,
            last_reconcile: None,
            account_prepared: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cycle(&self) -> Option<&Cycle> {
        self.cycle.as_ref()
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// When [`on_timer`](Self::on_timer) should next be called, and why.
    pub fn next_deadline(&self) -> Option<(Instant, Deadline)> {
        self.deadline
    }

    /// Log and forward an error that ended an event's processing.
    pub fn report_error(&self, context: &str, err: &EngineError) {
        error!(context, error = %err, "Cycle engine error");
        self.notifier.error(context, &err.to_string());
    }

    /// Begin a new cycle at `entry_price`. `on_need_restart` runs once the
    /// cycle has fully closed (or was abandoned).
    pub async fn start(
        &mut self,
        entry_price: Decimal,
        on_need_restart: RestartHook,
    ) -> Result<(), EngineError> {
        if self.phase != Phase::Idle || self.on_need_restart.is_some() {
            return Err(EngineError::Busy);
        }

        self.on_need_restart = Some(on_need_restart);
        self.last_price = Some(entry_price);
        self.stale_rechecks = 0;
        self.begin().await
    }

    /// React to a fill from the private order stream.
    pub async fn handle_order_filled(&mut self, fill: &OrderFilled) -> Result<(), EngineError> {
        if fill.symbol != self.config.symbol {
            return Ok(());
        }
        self.notifier.order_filled(fill);

        if self.phase == Phase::Entering && fill.is_reduce() {
            // The entry retry reads the venue position and applies it.
            info!(order_id = fill.order_id, side = %fill.position_side, "Reduction during entry, deferred to entry retry");
            return Ok(());
        }
        if self.phase != Phase::Active || !fill.is_reduce() {
            debug!(phase = %self.phase, order_id = fill.order_id, "Fill needs no transition");
            return Ok(());
        }
        let Some(mut cycle) = self.cycle.take() else {
            return Ok(());
        };

        // Orders from an earlier cycle are swept on entry; a late fill for
        // one must not touch this cycle's latches.
        if let Some(parsed) =
            parse_client_order_id(&self.config.client_id_prefix, &fill.client_order_id)
        {
            if parsed.cycle_id != cycle.id {
                debug!(client_order_id = %fill.client_order_id, "Fill from another cycle ignored");
                self.cycle = Some(cycle);
                return Ok(());
            }
        }

        let cause = if fill.is_stop() {
            ReduceCause::Stop
        } else {
            ReduceCause::TakeProfit
        };
        let result = self
            .reconcile_reduction(&mut cycle, fill.position_side, cause)
            .await;
        self.settle(cycle).await;
        result
    }

    /// Price feed fallback: when a tick crosses a recorded stop or the next
    /// take-profit level, read the venue and feed any reduction to the
    /// reducer as if the fill had arrived.
    pub async fn on_price_tick(&mut self, tick: &PriceTick) -> Result<(), EngineError> {
        if tick.symbol != self.config.symbol {
            return Ok(());
        }
        self.last_price = Some(tick.price);

        if self.phase != Phase::Active {
            return Ok(());
        }
        let Some(cycle) = &self.cycle else {
            return Ok(());
        };

        let crossed: Vec<(PositionSide, ReduceCause)> = PositionSide::BOTH
            .into_iter()
            .filter(|side| !cycle.side(*side).closed)
            .filter_map(|side| {
                let position = cycle.side(side);
                if tick.crosses_stop(side, position.stop_price) {
                    Some((side, ReduceCause::Stop))
                } else if position
                    .next_take_profit()
                    .is_some_and(|level| tick.crosses_target(side, level))
                {
                    Some((side, ReduceCause::TakeProfit))
                } else {
                    None
                }
            })
            .collect();
        if crossed.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        if let Some(last) = self.last_reconcile {
            if now.duration_since(last) < self.config.fallback_recheck_interval {
                return Ok(());
            }
        }
        self.last_reconcile = Some(now);

        let Some(mut cycle) = self.cycle.take() else {
            return Ok(());
        };
        let result = self.reconcile_crossings(&mut cycle, crossed).await;
        self.settle(cycle).await;
        result
    }

    /// Run the work scheduled by [`next_deadline`](Self::next_deadline).
    pub async fn on_timer(&mut self) -> Result<(), EngineError> {
        let Some((_, deadline)) = self.deadline.take() else {
            return Ok(());
        };
        debug!(?deadline, "Deadline reached");

        match deadline {
            Deadline::Begin => self.begin().await,
            Deadline::EntryRetry => self.enter().await,
            Deadline::Protect => self.protect().await,
        }
    }

    // ---------------------------------------------------------------
    // IDLE -> ENTERING
    // ---------------------------------------------------------------

    async fn begin(&mut self) -> Result<(), EngineError> {
        self.deadline = None;
        let Some(reference) = self.last_price else {
            return Ok(());
        };

        let result = self.try_begin(reference).await;
        // An abandoned entry has already handed control back through the
        // restart hook.
        if result.is_err() && self.phase == Phase::Idle && self.on_need_restart.is_some() {
            self.schedule(Deadline::Begin, self.config.entry_retry_delay);
        }
        result
    }

    async fn try_begin(&mut self, reference: Decimal) -> Result<(), EngineError> {
        self.prepare_account().await?;

        let symbol = self.config.symbol.clone();
        let rules = self.gateway.symbol_rules(&symbol).await?;
        let position = self.gateway.get_position(&symbol).await?;

        if has_exposure(&position, &rules) {
            self.stale_rechecks += 1;
            warn!(
                symbol = %symbol,
                long = %position.long.quantity,
                short = %position.short.quantity,
                rechecks = self.stale_rechecks,
                "Existing position found, deferring entry"
            );
            if self.stale_rechecks == self.config.max_stale_rechecks {
                let err = EngineError::StalePosition {
                    attempts: self.stale_rechecks,
                };
                self.report_error("start", &err);
            }
            self.schedule(Deadline::Begin, self.config.stale_recheck_interval);
            return Ok(());
        }
        self.stale_rechecks = 0;

        // Resting orders from a previous run would otherwise fill against
        // the new cycle.
        self.gateway.cancel_all(&symbol).await?;

        let plan = CyclePlan::new(&self.config, reference, &rules)?;
        let long = Position::new(
            PositionSide::Long,
            plan.stop_price(PositionSide::Long, &rules)?,
            reference,
        );
        let short = Position::new(
            PositionSide::Short,
            plan.stop_price(PositionSide::Short, &rules)?,
            reference,
        );
        let mut cycle = Cycle::new(new_cycle_id(), plan, long, short);
        for side in PositionSide::BOTH {
            cycle.side_mut(side).take_profit_levels = cycle.plan.take_profit_levels(side, &rules)?;
        }

        info!(
            cycle_id = %cycle.id,
            entry_price = %reference,
            quantity = %cycle.plan.quantity,
            long_stop = %cycle.long.stop_price,
            short_stop = %cycle.short.stop_price,
            "Entering cycle"
        );

        let delay = self.config.entry_retry_delay;
        self.entry_budget = Some(RetryBudget::new(
            ExponentialBackoff::new(delay, delay * 8, 0.0),
            self.config.max_entry_attempts,
        ));
        self.cycle = Some(cycle);
        self.phase = Phase::Entering;
        self.enter().await
    }

    async fn prepare_account(&mut self) -> Result<(), EngineError> {
        if self.account_prepared {
            return Ok(());
        }

        let symbol = self.config.symbol.as_str();
        self.gateway.ensure_hedge_mode().await.or_already_done()?;
        self.gateway
            .ensure_margin_type(symbol, self.config.margin_type)
            .await
            .or_already_done()?;
        self.gateway
            .set_leverage(symbol, self.config.leverage)
            .await
            .or_already_done()?;

        self.account_prepared = true;
        info!(symbol, leverage = self.config.leverage, "Account prepared");
        Ok(())
    }

    // ---------------------------------------------------------------
    // ENTERING -> ACTIVE
    // ---------------------------------------------------------------

    async fn enter(&mut self) -> Result<(), EngineError> {
        self.deadline = None;
        let Some(mut cycle) = self.cycle.take() else {
            return Ok(());
        };

        match self.try_enter(&mut cycle).await {
            Ok(()) => {
                self.phase = Phase::Active;
                self.entry_budget = None;
                self.metrics.inc_cycles_started();
                info!(
                    cycle_id = %cycle.id,
                    long_entry = %cycle.long.entry_price,
                    short_entry = %cycle.short.entry_price,
                    quantity = %cycle.long.opened_quantity,
                    "Cycle active"
                );
                self.notifier
                    .cycle_started(&cycle.id, cycle.plan.entry_price, cycle.long.opened_quantity);

                // Take-profits that filled while the entry was still being
                // retried are applied now that the cycle is live.
                let realized: VecDeque<Transition> = PositionSide::BOTH
                    .into_iter()
                    .filter_map(|side| {
                        let position = cycle.side(side);
                        (position.remaining_quantity < position.opened_quantity).then_some(
                            Transition::Reduced {
                                side,
                                cause: ReduceCause::TakeProfit,
                                remaining: position.remaining_quantity,
                            },
                        )
                    })
                    .collect();
                let result = if realized.is_empty() {
                    Ok(())
                } else {
                    info!(cycle_id = %cycle.id, "Applying reductions seen during entry");
                    self.drive(&mut cycle, realized).await
                };
                self.settle(cycle).await;
                result
            }
            Err(err) => {
                let retry = match &err {
                    EngineError::EntryLost { .. } | EngineError::SizingRejected(_) => None,
                    _ => self.entry_budget.as_mut().and_then(|budget| budget.next()),
                };
                match retry {
                    Some(delay) => {
                        warn!(
                            cycle_id = %cycle.id,
                            error = %err,
                            retry_in_ms = delay.as_millis() as u64,
                            "Entry incomplete, retrying"
                        );
                        self.cycle = Some(cycle);
                        self.schedule(Deadline::EntryRetry, delay);
                    }
                    None => self.abort_entry(cycle).await,
                }
                Err(err)
            }
        }
    }

    async fn try_enter(&self, cycle: &mut Cycle) -> Result<(), EngineError> {
        let symbol = self.config.symbol.as_str();
        let prefix = self.config.client_id_prefix.as_str();
        let rules = self.gateway.symbol_rules(symbol).await?;

        // Reconcile before submitting anything: a side may already be open
        // from an earlier attempt.
        let position = self.gateway.get_position(symbol).await?;
        let mut to_open = Vec::new();
        for side in PositionSide::BOTH {
            let open = !rules.is_dust(position.side(side).quantity);
            let state = cycle.side(side);
            let entered = state.entry_order.is_some() || state.opened_quantity > Decimal::ZERO;
            match (open, entered) {
                (true, _) => {}
                (false, true) => return Err(EngineError::EntryLost { side }),
                (false, false) => to_open.push(side),
            }
        }

        let entries = to_open.iter().map(|&side| {
            let spec = OrderSpec::market_open(symbol, side, cycle.plan.quantity)
                .with_client_order_id(cycle.order_id(prefix, side, OrderRole::Entry, 0));
            async move { (side, self.gateway.place_order(&spec).await) }
        });
        let results = join_all(entries).await;

        let mut failures = Vec::new();
        for (side, result) in results {
            match result {
                Ok(handle) => cycle.side_mut(side).entry_order = Some(handle),
                Err(e) => failures.push(format!("{} entry: {}", side, e)),
            }
        }
        if !failures.is_empty() {
            return Err(EngineError::partial("entry", failures));
        }

        let position = if to_open.is_empty() {
            position
        } else {
            self.gateway.get_position(symbol).await?
        };
        let grid_count = cycle.plan.grid_count;
        for side in PositionSide::BOTH {
            let snapshot = position.side(side);
            let open = snapshot.open_quantity();
            if rules.is_dust(open) {
                failures.push(format!("{} position not open after entry", side));
                continue;
            }

            let state = cycle.side_mut(side);
            if state.opened_quantity > Decimal::ZERO {
                // The grid is sized once, on the first confirmed read. Anything
                // gone since then was realized by its take-profits.
                state.remaining_quantity = open.min(state.opened_quantity);
                continue;
            }
            let quantities = split_quantity(open, grid_count, &rules)?;
            if snapshot.entry_price > Decimal::ZERO {
                state.entry_price = snapshot.entry_price;
            }
            state.opened_quantity = open;
            state.remaining_quantity = open;
            state.take_profit_quantities = quantities;
        }
        if !failures.is_empty() {
            return Err(EngineError::partial("entry", failures));
        }

        self.arm(cycle).await?;

        for side in PositionSide::BOTH {
            let state = cycle.side(side);
            if state.stop_order.is_none() || state.stop_quantity != state.remaining_quantity {
                return Err(EngineError::UnprotectedSide { side });
            }
        }
        Ok(())
    }

    /// Place both stops and both take-profit grids, skipping whatever is
    /// already resting for this cycle.
    async fn arm(&self, cycle: &mut Cycle) -> Result<(), EngineError> {
        let symbol = self.config.symbol.as_str();
        let prefix = self.config.client_id_prefix.as_str();
        let open_orders = self.gateway.get_open_orders(symbol).await?;

        let mut take_profits = Vec::new();
        for side in PositionSide::BOTH {
            let resting: Vec<u32> = open_orders
                .iter()
                .filter(|o| o.status.is_active())
                .filter_map(|o| parse_client_order_id(prefix, &o.handle.client_order_id))
                .filter(|p| p.cycle_id == cycle.id && p.side == side && p.role == OrderRole::TakeProfit)
                .map(|p| p.seq)
                .collect();

            let position = cycle.side(side);
            let realized = position.filled_take_profits();
            for (i, (price, quantity)) in position
                .take_profit_levels
                .iter()
                .zip(&position.take_profit_quantities)
                .enumerate()
            {
                let seq = i as u32;
                if i < realized || resting.contains(&seq) {
                    continue;
                }
                let spec = OrderSpec::take_profit_limit(symbol, side, *price, *quantity)
                    .with_client_order_id(cycle.order_id(prefix, side, OrderRole::TakeProfit, seq));
                take_profits.push((side, spec));
            }
        }

        let stops = PositionSide::BOTH.map(|side| {
            let position = cycle.side(side);
            let id = cycle.order_id(prefix, side, OrderRole::Stop, position.stop_seq);
            let (stop_price, quantity) = (position.stop_price, position.remaining_quantity);
            async move {
                (side, quantity, self.place_stop(side, stop_price, quantity, id).await)
            }
        });
        let tps = take_profits.iter().map(|(side, spec)| async move {
            (*side, self.gateway.place_order(spec).await)
        });
        let (stop_results, tp_results) = tokio::join!(join_all(stops), join_all(tps));

        let mut failures = Vec::new();
        for (side, quantity, result) in stop_results {
            match result {
                Ok(handle) => {
                    let position = cycle.side_mut(side);
                    position.stop_order = Some(handle);
                    position.stop_quantity = quantity;
                    position.stop_seq += 1;
                }
                Err(e) => {
                    error!(cycle_id = %cycle.id, side = %side, error = %e, "Stop placement failed, side is unprotected");
                    cycle.side_mut(side).stop_order = None;
                    failures.push(format!("{} stop: {}", side, e));
                }
            }
        }
        for (side, result) in tp_results {
            if let Err(e) = result {
                warn!(cycle_id = %cycle.id, side = %side, error = %e, "Take-profit placement failed");
                failures.push(format!("{} take-profit: {}", side, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::partial("protection", failures))
        }
    }

    /// Flatten whatever the failed entry left open and return to IDLE.
    async fn abort_entry(&mut self, cycle: Cycle) {
        let symbol = self.config.symbol.clone();
        let prefix = self.config.client_id_prefix.as_str();
        let gateway = &self.gateway;
        error!(cycle_id = %cycle.id, "Entry abandoned, flattening");

        if let Err(e) = gateway.cancel_all(&symbol).await {
            warn!(error = %e, "Cancel-all failed during entry abort");
        }

        match gateway.get_position(&symbol).await {
            Ok(position) => {
                let closes = PositionSide::BOTH
                    .into_iter()
                    .filter(|side| !position.side(*side).quantity.is_zero())
                    .map(|side| {
                        let spec = OrderSpec::market_close(
                            &symbol,
                            side,
                            position.side(side).open_quantity(),
                        )
                        .with_client_order_id(cycle.order_id(prefix, side, OrderRole::Flatten, 0));
                        async move { (side, gateway.place_order(&spec).await) }
                    });
                for (side, result) in join_all(closes).await {
                    if let Err(e) = result {
                        error!(side = %side, error = %e, "Failed to flatten side");
                        self.notifier
                            .error("abort", &format!("{} side left open: {}", side, e));
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Position read failed during entry abort");
                self.notifier.error("abort", &e.to_string());
            }
        }

        self.finish();
    }

    // ---------------------------------------------------------------
    // ACTIVE
    // ---------------------------------------------------------------

    async fn reconcile_reduction(
        &self,
        cycle: &mut Cycle,
        side: PositionSide,
        cause: ReduceCause,
    ) -> Result<(), EngineError> {
        if cycle.side(side).closed {
            debug!(side = %side, "Fill for closed side ignored");
            return Ok(());
        }

        let position = self.gateway.get_position(&self.config.symbol).await?;
        let remaining = position.side(side).open_quantity();
        self.drive(
            cycle,
            VecDeque::from([Transition::Reduced {
                side,
                cause,
                remaining,
            }]),
        )
        .await
    }

    async fn reconcile_crossings(
        &self,
        cycle: &mut Cycle,
        crossed: Vec<(PositionSide, ReduceCause)>,
    ) -> Result<(), EngineError> {
        let position = self.gateway.get_position(&self.config.symbol).await?;
        let queue: VecDeque<Transition> = crossed
            .into_iter()
            .filter_map(|(side, cause)| {
                let remaining = position.side(side).open_quantity();
                (remaining < cycle.side(side).remaining_quantity).then_some(
                    Transition::Reduced {
                        side,
                        cause,
                        remaining,
                    },
                )
            })
            .collect();

        if queue.is_empty() {
            return Ok(());
        }
        info!(cycle_id = %cycle.id, "Reduction detected from price feed");
        self.drive(cycle, queue).await
    }

    /// Apply transitions until none remain. Every step is guarded by the
    /// position latches, so replaying a transition is a no-op.
    async fn drive(
        &self,
        cycle: &mut Cycle,
        mut queue: VecDeque<Transition>,
    ) -> Result<(), EngineError> {
        let rules = self.gateway.symbol_rules(&self.config.symbol).await?;
        let cycle_id = cycle.id.clone();
        let mut first_error = None;

        while let Some(transition) = queue.pop_front() {
            debug!(cycle_id = %cycle_id, ?transition, "Applying transition");
            let (side, step) = match transition {
                Transition::Reduced {
                    side,
                    cause,
                    remaining,
                } => {
                    let position = cycle.side_mut(side);
                    if position.closed {
                        continue;
                    }
                    position.remaining_quantity = remaining;
                    if rules.is_dust(remaining) {
                        queue.push_back(Transition::Closed(side));
                        continue;
                    }

                    if cause == ReduceCause::TakeProfit && !position.first_take_profit_filled {
                        position.first_take_profit_filled = true;
                        info!(cycle_id = %cycle_id, side = %side, "First take-profit filled");
                        queue.push_back(Transition::Breakeven(side.opposite()));
                    }

                    if position.stop_order.is_some() && position.stop_quantity == remaining {
                        continue;
                    }
                    (side, self.replace_stop(cycle, side, &rules).await)
                }
                Transition::Closed(side) => {
                    let position = cycle.side_mut(side);
                    if position.closed {
                        continue;
                    }
                    position.closed = true;
                    position.remaining_quantity = Decimal::ZERO;
                    position.stop_order = None;
                    info!(cycle_id = %cycle_id, side = %side, "Side closed");

                    self.cancel_side_orders(side).await;
                    queue.push_back(Transition::Breakeven(side.opposite()));
                    continue;
                }
                Transition::Breakeven(side) => {
                    let position = cycle.side_mut(side);
                    if position.closed || position.at_breakeven {
                        continue;
                    }
                    let previous = position.stop_price;
                    let price = rules.round_price(position.entry_price)?;
                    position.stop_price = price;

                    let step = self.replace_stop(cycle, side, &rules).await;
                    let position = cycle.side_mut(side);
                    match &step {
                        Ok(StopOutcome::Placed) => {
                            position.at_breakeven = true;
                            info!(cycle_id = %cycle_id, side = %side, price = %price, "Stop moved to breakeven");
                            self.notifier.breakeven_moved(side, price);
                        }
                        Ok(StopOutcome::SideFlat) => position.at_breakeven = true,
                        // Latch stays clear so the protect timer retries the move.
                        Err(_) => position.stop_price = previous,
                    }
                    (side, step)
                }
            };

            match step {
                Ok(StopOutcome::Placed) => {}
                Ok(StopOutcome::SideFlat) => queue.push_back(Transition::Closed(side)),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Re-place `side`'s stop at its current `stop_price` for the venue's
    /// remaining quantity.
    async fn replace_stop(
        &self,
        cycle: &mut Cycle,
        side: PositionSide,
        rules: &SymbolRules,
    ) -> Result<StopOutcome, EngineError> {
        let symbol = self.config.symbol.as_str();
        let prefix = self.config.client_id_prefix.as_str();
        let seq = cycle.side(side).stop_seq;
        let stop_id = cycle.order_id(prefix, side, OrderRole::Stop, seq);
        let flatten_id = cycle.order_id(prefix, side, OrderRole::Flatten, seq);
        let cycle_id = cycle.id.clone();

        let snapshot = self.gateway.get_position(symbol).await?;
        let remaining = snapshot.side(side).open_quantity();
        let position = cycle.side_mut(side);
        position.remaining_quantity = remaining;
        if rules.is_dust(remaining) {
            return Ok(StopOutcome::SideFlat);
        }
        let stop_price = position.stop_price;

        let placed = match position.stop_order.clone() {
            Some(handle) => {
                let amendment = OrderAmendment::stop_price(stop_price)
                    .with_quantity(remaining)
                    .with_replacement_id(stop_id.clone());
                match self.gateway.modify_order(symbol, &handle, &amendment).await {
                    Err(GatewayError::StaleOrder { order_id }) => {
                        warn!(cycle_id = %cycle_id, side = %side, order_id, "Stop no longer resting, reconciling");
                        position.stop_order = None;
                        let snapshot = self.gateway.get_position(symbol).await?;
                        let remaining = snapshot.side(side).open_quantity();
                        position.remaining_quantity = remaining;
                        if rules.is_dust(remaining) {
                            return Ok(StopOutcome::SideFlat);
                        }
                        self.place_stop(side, stop_price, remaining, stop_id).await
                    }
                    other => other,
                }
            }
            None => self.place_stop(side, stop_price, remaining, stop_id).await,
        };

        match placed {
            Ok(handle) => {
                debug!(cycle_id = %cycle_id, side = %side, order_id = handle.order_id, "Stop resting");
                position.stop_order = Some(handle);
                position.stop_quantity = position.remaining_quantity;
                position.stop_seq += 1;
                Ok(StopOutcome::Placed)
            }
            Err(GatewayError::WouldTriggerImmediately { message }) => {
                warn!(
                    cycle_id = %cycle_id,
                    side = %side,
                    stop_price = %stop_price,
                    venue_message = %message,
                    "Stop already crossed, closing side at market"
                );
                position.stop_order = None;
                position.stop_seq += 1;
                let spec = OrderSpec::market_close(symbol, side, position.remaining_quantity)
                    .with_client_order_id(flatten_id);
                self.gateway.place_order(&spec).await?;

                let snapshot = self.gateway.get_position(symbol).await?;
                position.remaining_quantity = snapshot.side(side).open_quantity();
                if rules.is_dust(position.remaining_quantity) {
                    Ok(StopOutcome::SideFlat)
                } else {
                    Err(EngineError::UnprotectedSide { side })
                }
            }
            Err(e) => {
                position.stop_order = None;
                error!(cycle_id = %cycle_id, side = %side, error = %e, "Stop replacement failed, side is unprotected");
                self.notifier
                    .error("stop", &format!("{} side unprotected: {}", side, e));
                Err(EngineError::UnprotectedSide { side })
            }
        }
    }

    /// Place a stop unless an equivalent one already rests. A different
    /// resting stop on the side is cancelled first so at most one is live.
    async fn place_stop(
        &self,
        side: PositionSide,
        stop_price: Decimal,
        quantity: Decimal,
        client_order_id: String,
    ) -> Result<OrderHandle, GatewayError> {
        let symbol = self.config.symbol.as_str();
        let stops = self.gateway.get_open_stop_orders(symbol).await?;

        if let Some(order) = stops.side(side) {
            if order.stop_price == stop_price && order.remaining_quantity() == quantity {
                debug!(side = %side, order_id = order.handle.order_id, "Adopting resting stop");
                return Ok(order.handle.clone());
            }
            match self.gateway.cancel_order(symbol, &order.handle).await {
                Ok(()) | Err(GatewayError::StaleOrder { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let spec = OrderSpec::stop_market(symbol, side, stop_price, quantity)
            .with_client_order_id(client_order_id);
        self.gateway.place_order(&spec).await
    }

    /// Cancel everything still resting for a flat side.
    async fn cancel_side_orders(&self, side: PositionSide) {
        let symbol = self.config.symbol.as_str();
        let orders = match self.gateway.get_open_orders(symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(side = %side, error = %e, "Could not list orders of closed side");
                return;
            }
        };

        let cancels = orders
            .iter()
            .filter(|o| o.position_side == side && o.status.is_active())
            .map(|o| self.gateway.cancel_order(symbol, &o.handle));
        for result in join_all(cancels).await {
            match result {
                Ok(()) | Err(GatewayError::StaleOrder { .. }) => {}
                Err(e) => warn!(side = %side, error = %e, "Residual order cancel failed"),
            }
        }
    }

    async fn protect(&mut self) -> Result<(), EngineError> {
        if self.phase != Phase::Active {
            return Ok(());
        }
        let Some(mut cycle) = self.cycle.take() else {
            return Ok(());
        };
        let result = self.try_protect(&mut cycle).await;
        self.settle(cycle).await;
        result
    }

    async fn try_protect(&self, cycle: &mut Cycle) -> Result<(), EngineError> {
        let rules = self.gateway.symbol_rules(&self.config.symbol).await?;
        let mut queue = VecDeque::new();

        for side in PositionSide::BOTH {
            if cycle.needs_breakeven(side) {
                queue.push_back(Transition::Breakeven(side));
                continue;
            }
            if !cycle.side(side).is_unprotected(&rules) {
                continue;
            }
            match self.replace_stop(cycle, side, &rules).await? {
                StopOutcome::Placed => info!(cycle_id = %cycle.id, side = %side, "Side protected again"),
                StopOutcome::SideFlat => queue.push_back(Transition::Closed(side)),
            }
        }
        self.drive(cycle, queue).await
    }

    /// Put the cycle back, or close it out when both sides are flat. A side
    /// left without a stop, or with a breakeven move still owed, gets a
    /// protect deadline.
    async fn settle(&mut self, cycle: Cycle) {
        if cycle.is_complete() {
            self.close_cycle(cycle).await;
            return;
        }

        let pending = PositionSide::BOTH.into_iter().any(|side| {
            let position = cycle.side(side);
            (!position.closed && position.stop_order.is_none()) || cycle.needs_breakeven(side)
        });
        if pending && self.deadline.is_none() {
            self.schedule(Deadline::Protect, self.config.fallback_recheck_interval);
        }
        self.cycle = Some(cycle);
    }

    // ---------------------------------------------------------------
    // CLOSING -> IDLE
    // ---------------------------------------------------------------

    async fn close_cycle(&mut self, cycle: Cycle) {
        self.phase = Phase::Closing;
        info!(cycle_id = %cycle.id, "Both sides flat, closing cycle");

        if let Err(e) = self.gateway.cancel_all(&self.config.symbol).await {
            warn!(cycle_id = %cycle.id, error = %e, "Cancel-all failed while closing cycle");
        }

        self.metrics.inc_cycles_completed();
        self.notifier.cycle_completed(&cycle.id);
        self.finish();
    }

    fn finish(&mut self) {
        self.phase = Phase::Idle;
        self.cycle = None;
        self.deadline = None;
        self.entry_budget = None;
        self.last_reconcile = None;
        if let Some(hook) = self.on_need_restart.take() {
            hook();
        }
    }

    fn schedule(&mut self, deadline: Deadline, delay: Duration) {
        debug!(?deadline, delay_ms = delay.as_millis() as u64, "Scheduling");
        self.deadline = Some((Instant::now() + delay, deadline));
    }
}

fn has_exposure(position: &HedgePosition, rules: &SymbolRules) -> bool {
    PositionSide::BOTH
        .into_iter()
        .any(|side| !rules.is_dust(position.side(side).quantity))
}
