//! Periodic rate refresh and price cascade.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use pricesync_common::{ExchangeRate, OrderId, VariantId};
use pricesync_fx::{FxResult, RateService};
use pricesync_store::{
    CascadeReport, CascadeStage, OrderPriceCascade, OrderStore, VariantPriceCascade, VariantStore,
};

use crate::error::{SchedulerError, SchedulerResult};
use crate::metrics::{Metrics, SharedMetrics};
use crate::state::{SchedulerState, TickMachine, TickState};

/// What started a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTrigger {
    /// Fired by the interval timer.
    Scheduled,
    /// Operator asked for a refresh.
    Manual,
    /// Operator asked for a cascade at the current rate.
    ForcedCascade,
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub trigger: TickTrigger,
    /// `Done` or `Error`.
    pub state: TickState,
    /// Rate after the refresh, `None` if the refresh failed.
    pub rate: Option<ExchangeRate>,
    /// Whether the refresh wrote a new base value.
    pub changed: bool,
    pub variants: Option<CascadeReport<VariantId>>,
    pub orders: Option<CascadeReport<OrderId>>,
    /// Cascades that failed as a whole.
    pub failed_stages: Vec<CascadeStage>,
    /// Refresh error, if any.
    pub error: Option<String>,
}

impl TickOutcome {
    fn new(trigger: TickTrigger) -> Self {
        Self {
            trigger,
            state: TickState::Idle,
            rate: None,
            changed: false,
            variants: None,
            orders: None,
            failed_stages: Vec::new(),
            error: None,
        }
    }

    /// Check if any cascade ran.
    pub fn cascaded(&self) -> bool {
        self.variants.is_some() || self.orders.is_some() || !self.failed_stages.is_empty()
    }
}

/// Refreshes the dollar rate on a fixed interval and, when it changes,
/// reprices variants and re-priceable orders.
///
/// Scheduled ticks never overlap with one another or with manual triggers.
pub struct CascadeScheduler {
    refresh_interval: Duration,
    shutdown_grace: Duration,
    rate_service: Arc<RateService>,
    variant_cascade: VariantPriceCascade,
    order_cascade: OrderPriceCascade,
    state: RwLock<SchedulerState>,
    /// Held for the duration of a tick.
    tick_guard: tokio::sync::Mutex<()>,
    metrics: SharedMetrics,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: Mutex<Option<mpsc::Receiver<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CascadeScheduler {
    pub fn new(
        refresh_interval: Duration,
        rate_service: Arc<RateService>,
        variant_store: Arc<dyn VariantStore>,
        order_store: Arc<dyn OrderStore>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Self {
            refresh_interval,
            shutdown_grace: pricesync_common::constants::shutdown_grace_period(),
            rate_service,
            variant_cascade: VariantPriceCascade::new(variant_store),
            order_cascade: OrderPriceCascade::new(order_store),
            state: RwLock::new(SchedulerState::Starting),
            tick_guard: tokio::sync::Mutex::new(()),
            metrics: Arc::new(Metrics::new()),
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
            handle: Mutex::new(None),
        }
    }

    /// Override how long `stop` waits for an in-flight tick.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Spawn the timer loop. The first tick fires immediately.
    #[instrument(skip(self))]
    pub fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        if self.refresh_interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let shutdown_rx = self
            .shutdown_rx
            .lock()
            .take()
            .ok_or(SchedulerError::AlreadyStarted)?;

        *self.state.write() = SchedulerState::Running;

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            scheduler.run_loop(shutdown_rx).await;
        });
        *self.handle.lock() = Some(handle);

        info!(interval_secs = self.refresh_interval.as_secs(), "Scheduler started");
        Ok(())
    }

    /// Signal the loop to stop and wait for it. An in-flight tick runs to
    /// completion.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> SchedulerResult<()> {
        info!("Stopping scheduler");
        *self.state.write() = SchedulerState::ShuttingDown;

        // Only a running loop consumes the signal.
        let handle = self.handle.lock().take();
        let result = match handle {
            Some(handle) => {
                let _ = self.shutdown_tx.try_send(());
                match tokio::time::timeout(self.shutdown_grace, handle).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(SchedulerError::LoopPanicked(e.to_string())),
                    Err(_) => Err(SchedulerError::ShutdownTimeout(self.shutdown_grace)),
                }
            }
            None => Ok(()),
        };

        *self.state.write() = SchedulerState::Stopped;
        info!("Scheduler stopped");
        result
    }

    /// Run a refresh now, waiting for any tick in progress.
    pub async fn refresh_now(&self) -> TickOutcome {
        let _guard = self.tick_guard.lock().await;
        self.execute_tick(TickTrigger::Manual).await
    }

    /// Cascade the current effective rate whether or not it changed.
    ///
    /// Recovery path for a crash between the rate write and the cascades,
    /// and for applying a markup change to prices.
    #[instrument(skip(self))]
    pub async fn force_cascade(&self) -> FxResult<TickOutcome> {
        let _guard = self.tick_guard.lock().await;
        self.metrics.tick_started();

        let mut tick = TickMachine::new();
        let mut outcome = TickOutcome::new(TickTrigger::ForcedCascade);

        let rate = match self.rate_service.get_current_rate().await {
            Ok(rate) => rate,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "No rate to cascade");
                self.metrics.tick_failed(e.is_source_error());
                return Err(e);
            }
        };
        info!(effective_value = %rate.effective_value, "Forcing price cascade");

        advance(&mut tick, TickState::Cascading);
        self.cascade(rate.effective_value, &mut outcome).await;
        advance(&mut tick, TickState::Done);

        outcome.rate = Some(rate);
        outcome.state = tick.state();
        Ok(outcome)
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    pub fn rate_service(&self) -> &Arc<RateService> {
        &self.rate_service
    }

    // --- Private methods ---

    async fn run_loop(&self, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(self.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    match self.tick_guard.try_lock() {
                        Ok(_guard) => {
                            self.execute_tick(TickTrigger::Scheduled).await;
                        }
                        Err(_) => {
                            self.metrics.tick_skipped();
                            warn!("Previous tick still running, skipping");
                        }
                    }
                }
            }
        }

        info!("Scheduler loop exited");
    }

    /// One pass of the tick state machine. Never fails; errors are logged
    /// and reported in the outcome.
    #[instrument(skip(self))]
    async fn execute_tick(&self, trigger: TickTrigger) -> TickOutcome {
        self.metrics.tick_started();

        let mut tick = TickMachine::new();
        let mut outcome = TickOutcome::new(trigger);

        advance(&mut tick, TickState::Fetching);

        match self.rate_service.refresh_rate().await {
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Rate refresh failed, keeping previous rate");
                self.metrics.tick_failed(e.is_source_error());
                outcome.error = Some(e.to_string());
                advance(&mut tick, TickState::Error);
            }
            Ok(refresh) if !refresh.changed => {
                info!(base_value = %refresh.rate.base_value, "Rate unchanged, no cascade");
                outcome.rate = Some(refresh.rate);
                advance(&mut tick, TickState::Done);
            }
            Ok(refresh) => {
                self.metrics.rate_changed();
                outcome.changed = true;

                advance(&mut tick, TickState::Cascading);
                self.cascade(refresh.rate.effective_value, &mut outcome).await;
                outcome.rate = Some(refresh.rate);
                advance(&mut tick, TickState::Done);
            }
        }

        outcome.state = tick.state();
        outcome
    }

    /// Variants then orders. A failing stage does not stop the other.
    async fn cascade(&self, effective_value: Decimal, outcome: &mut TickOutcome) {
        match self
            .variant_cascade
            .recompute_all_variant_prices(effective_value)
            .await
        {
            Ok(report) => {
                self.metrics
                    .variants_cascaded(report.updated, report.failed.len());
                outcome.variants = Some(report);
            }
            Err(e) => {
                error!(stage = %e.stage(), error = %e, "Cascade failed");
                self.metrics.cascade_failed();
                outcome.failed_stages.push(e.stage());
            }
        }

        match self
            .order_cascade
            .recompute_eligible_order_totals(effective_value)
            .await
        {
            Ok(report) => {
                self.metrics
                    .orders_cascaded(report.updated, report.failed.len());
                outcome.orders = Some(report);
            }
            Err(e) => {
                error!(stage = %e.stage(), error = %e, "Cascade failed");
                self.metrics.cascade_failed();
                outcome.failed_stages.push(e.stage());
            }
        }
    }
}

fn advance(tick: &mut TickMachine, next: TickState) {
    if let Err(e) = tick.transition_to(next) {
        warn!(error = %e, "Unexpected tick transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pricesync_common::{
        Order, OrderStatus, ProductId, ProductVariant, ProviderName,
    };
    use pricesync_fx::{MarkupPatch, MockRateProvider};
    use pricesync_store::{
        BulkWriteResult, MemoryStore, StoreError, StoreResult, VariantPriceUpdate,
    };
    use rust_decimal_macros::dec;

    fn setup(rate: Decimal) -> (Arc<MockRateProvider>, Arc<MemoryStore>, Arc<CascadeScheduler>) {
        let provider = Arc::new(MockRateProvider::new(ProviderName::DolarApi, rate));
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(RateService::new(provider.clone(), store.clone()));
        let scheduler = Arc::new(CascadeScheduler::new(
            Duration::from_millis(20),
            service,
            store.clone(),
            store.clone(),
        ));
        (provider, store, scheduler)
    }

    #[tokio::test]
    async fn test_changed_rate_cascades() {
        let (_, store, scheduler) = setup(dec!(1100));
        let variant = ProductVariant::new(ProductId::new(), "SHIRT", dec!(50));
        let order = Order::new(OrderStatus::Pending, dec!(20), dec!(0));
        store.insert_variant(variant.clone());
        store.insert_order(order.clone());

        let outcome = scheduler.refresh_now().await;

        assert_eq!(outcome.state, TickState::Done);
        assert!(outcome.changed);
        assert_eq!(outcome.variants.as_ref().unwrap().updated, 1);
        assert_eq!(store.variant(&variant.id).unwrap().price_ars, dec!(55000));
        assert_eq!(store.order(&order.id).unwrap().total_amount_ars, dec!(22000));
    }

    #[tokio::test]
    async fn test_unchanged_rate_skips_cascade() {
        let (_, store, scheduler) = setup(dec!(1000));
        scheduler.refresh_now().await;

        let mut variant = ProductVariant::new(ProductId::new(), "MUG", dec!(10));
        variant.price_ars = dec!(1);
        store.insert_variant(variant.clone());

        let outcome = scheduler.refresh_now().await;

        assert!(!outcome.changed);
        assert!(!outcome.cascaded());
        assert_eq!(store.variant(&variant.id).unwrap().price_ars, dec!(1));
    }

    #[tokio::test]
    async fn test_source_failure_ends_in_error_state() {
        let (provider, _, scheduler) = setup(dec!(1000));
        provider.fail();

        let outcome = scheduler.refresh_now().await;

        assert_eq!(outcome.state, TickState::Error);
        assert!(outcome.error.is_some());
        assert!(!outcome.cascaded());
        assert_eq!(scheduler.metrics().snapshot().source_failures, 1);
    }

    #[tokio::test]
    async fn test_force_cascade_applies_markup() {
        let (_, store, scheduler) = setup(dec!(1000));
        scheduler.refresh_now().await;
        let variant = ProductVariant::new(ProductId::new(), "CAP", dec!(50));
        store.insert_variant(variant.clone());

        scheduler
            .rate_service()
            .update_markup_config(MarkupPatch::new(dec!(10), true))
            .await
            .unwrap();
        let outcome = scheduler.force_cascade().await.unwrap();

        assert_eq!(outcome.trigger, TickTrigger::ForcedCascade);
        assert!(!outcome.changed);
        assert_eq!(store.variant(&variant.id).unwrap().price_ars, dec!(55000));
    }

    /// Variant store that is always down.
    struct BrokenVariants;

    #[async_trait]
    impl VariantStore for BrokenVariants {
        async fn list_variants(&self) -> StoreResult<Vec<ProductVariant>> {
            Err(StoreError::NotFound("product_variants".to_string()))
        }

        async fn apply_variant_prices(
            &self,
            _updates: &[VariantPriceUpdate],
        ) -> StoreResult<BulkWriteResult<VariantId>> {
            Ok(BulkWriteResult::empty())
        }
    }

    #[tokio::test]
    async fn test_failed_variant_stage_still_reprices_orders() {
        let provider = Arc::new(MockRateProvider::new(ProviderName::Bluelytics, dec!(1000)));
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(RateService::new(provider, store.clone()));
        let scheduler = CascadeScheduler::new(
            Duration::from_secs(60),
            service,
            Arc::new(BrokenVariants),
            store.clone(),
        );
        let order = Order::new(OrderStatus::AwaitingPayment, dec!(3), dec!(0));
        store.insert_order(order.clone());

        let outcome = scheduler.refresh_now().await;

        assert_eq!(outcome.state, TickState::Done);
        assert_eq!(outcome.failed_stages, vec![CascadeStage::Variants]);
        assert_eq!(store.order(&order.id).unwrap().total_amount_ars, dec!(3000));
        assert_eq!(scheduler.metrics().snapshot().cascades_failed, 1);
    }

    #[tokio::test]
    async fn test_start_stop() {
        let (provider, _, scheduler) = setup(dec!(1000));
        assert_eq!(scheduler.state(), SchedulerState::Starting);

        scheduler.start().unwrap();
        assert!(scheduler.state().is_running());
        assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyStarted)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await.unwrap();

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(provider.calls() >= 1);
    }

    #[tokio::test]
    async fn test_scheduled_tick_skipped_while_busy() {
        let (provider, _, scheduler) = setup(dec!(1000));

        let guard = scheduler.tick_guard.lock().await;
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(scheduler.metrics().snapshot().ticks_skipped >= 1);
        assert_eq!(provider.calls(), 0);

        drop(guard);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let provider = Arc::new(MockRateProvider::new(ProviderName::DolarApi, dec!(1000)));
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(RateService::new(provider.clone(), store.clone()));
        let scheduler = Arc::new(CascadeScheduler::new(
            Duration::ZERO,
            service,
            store.clone(),
            store,
        ));

        assert!(matches!(scheduler.start(), Err(SchedulerError::ZeroInterval)));
        assert_eq!(scheduler.state(), SchedulerState::Starting);
        scheduler.stop().await.unwrap();
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_force_cascade_counts_as_failed_tick() {
        let (provider, _, scheduler) = setup(dec!(1000));
        provider.fail();

        assert!(scheduler.force_cascade().await.is_err());

        let metrics = scheduler.metrics().snapshot();
        assert_eq!(metrics.ticks_total, 1);
        assert_eq!(metrics.ticks_failed, 1);
        assert_eq!(metrics.source_failures, 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_does_not_stall_loop() {
        let (provider, _, scheduler) = setup(dec!(1000));

        scheduler.stop().await.unwrap();
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(scheduler.state().is_running());
        assert!(provider.calls() >= 2);

        scheduler.stop().await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }
}
