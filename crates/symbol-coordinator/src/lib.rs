//! Symbol Addition Coordinator (C8, spec §4.8): validates a request, fans it
//! out into a pre-materialized task grid, and drives it to a terminal
//! Execution status.
//!
//! Grounded on `trading-agent::StrategyManager::generate_signals` for the
//! semaphore-bounded `tokio::spawn`-per-item dispatch pattern, generalized
//! from "one task per opportunity" to "one task per selected strategy."

use analysis_core::{AnalysisError, CustomPeriod, DataProvider, ErrorKind, Timeframe};
use analysis_orchestrator::{task_error_result, AnalysisResult, Orchestrator, StrategyRef};
use analysis_store::{AnalysisStore, NewTask, TaskResults};
use execution_log_store::{
    Execution, ExecutionLogStore, ExecutionMode, ExecutionStatus, ExecutionType, NewExecutionRequest,
};
use notification_service::Notifier;
use progress_store::ProgressStore;
use std::sync::Arc;
use strategy_catalog::{StrategyCatalog, StrategyConfiguration};
use tokio::sync::Semaphore;

/// A request to add a symbol for analysis (§4.8).
#[derive(Debug, Clone)]
pub struct AddSymbolRequest {
    pub symbol: String,
    pub execution_mode: ExecutionMode,
    pub selected_strategy_ids: Vec<i64>,
    pub filter_params: Option<serde_json::Value>,
    pub custom_period: Option<CustomPeriod>,
    pub is_backtest: bool,
}

pub struct SymbolCoordinator {
    data_provider: Arc<dyn DataProvider>,
    progress_store: Arc<ProgressStore>,
    execution_log: ExecutionLogStore,
    analysis_store: AnalysisStore,
    strategy_catalog: StrategyCatalog,
    notifier: Arc<Notifier>,
    /// Worker pool semaphore (§5), owned by `pipeline-worker`'s `main` and
    /// shared across every coordinator/request so the process-wide
    /// concurrency cap `P` holds across symbols, not just within one.
    worker_pool: Arc<Semaphore>,
}

impl SymbolCoordinator {
    pub fn new(
        data_provider: Arc<dyn DataProvider>,
        progress_store: Arc<ProgressStore>,
        execution_log: ExecutionLogStore,
        analysis_store: AnalysisStore,
        strategy_catalog: StrategyCatalog,
        notifier: Arc<Notifier>,
        worker_pool: Arc<Semaphore>,
    ) -> Self {
        Self { data_provider, progress_store, execution_log, analysis_store, strategy_catalog, notifier, worker_pool }
    }

    /// Run the full fan-out algorithm (§4.8 steps 1-9), returning the new
    /// `execution_id` once all tasks have been pre-materialized and
    /// dispatched. Tasks continue to run after this call returns; completion
    /// is observable via the Progress Store and the Execution row.
    pub async fn add_symbol(&self, request: AddSymbolRequest) -> Result<String, AnalysisError> {
        validate_symbol(&request.symbol)?;
        self.reject_duplicate_running(&request.symbol, request.execution_mode).await?;

        let strategies = self.resolve_strategy_set(&request).await?;

        let execution_id = self
            .execution_log
            .create_execution(NewExecutionRequest {
                symbol: request.symbol.clone(),
                execution_type: ExecutionType::SymbolAddition,
                selected_strategy_ids: strategies.iter().map(|s| s.id).collect(),
                execution_mode: request.execution_mode,
                estimated_patterns: strategies.len() as i64,
            })
            .await?;

        let mut task_ids = Vec::with_capacity(strategies.len());
        for strategy in &strategies {
            let task_id = self
                .analysis_store
                .insert_pending_task(NewTask {
                    execution_id: execution_id.clone(),
                    symbol: request.symbol.clone(),
                    timeframe: strategy.timeframe.clone(),
                    config: strategy.base_strategy.clone(),
                    strategy_config_id: Some(strategy.id),
                    strategy_name: Some(strategy.name.clone()),
                })
                .await?;
            task_ids.push(task_id);
        }

        self.execution_log.mark_running(&execution_id).await?;

        if let Some(params) = &request.filter_params {
            publish_filter_params(params);
        }

        self.dispatch(&execution_id, &request, &strategies, &task_ids).await;

        let counts = self.analysis_store.count_by_status(&execution_id).await?;
        if counts.completed > 0 {
            self.execution_log.mark_success(&execution_id).await?;
        } else {
            self.execution_log
                .mark_failed(&execution_id, "no task for this execution completed successfully")
                .await?;
        }

        Ok(execution_id)
    }

    async fn reject_duplicate_running(
        &self,
        symbol: &str,
        mode: ExecutionMode,
    ) -> Result<(), AnalysisError> {
        let existing = self.execution_log.list_for_symbol(symbol).await?;
        let duplicate = existing
            .iter()
            .any(|e: &Execution| e.status == ExecutionStatus::Running && e.execution_mode == mode);
        if duplicate {
            return Err(AnalysisError::ExecutionInProgress(format!(
                "{symbol} already has a running execution in {mode:?} mode"
            )));
        }
        Ok(())
    }

    async fn resolve_strategy_set(
        &self,
        request: &AddSymbolRequest,
    ) -> Result<Vec<StrategyConfiguration>, AnalysisError> {
        match request.execution_mode {
            ExecutionMode::Default => self.strategy_catalog.get_defaults().await,
            ExecutionMode::Selective => {
                let active: Vec<i64> = self
                    .strategy_catalog
                    .list_active()
                    .await?
                    .into_iter()
                    .map(|c| c.id)
                    .collect();
                let requested: Vec<i64> = request
                    .selected_strategy_ids
                    .iter()
                    .copied()
                    .filter(|id| active.contains(id))
                    .collect();
                self.strategy_catalog.get_by_ids(&requested).await
            }
            ExecutionMode::Custom => self.strategy_catalog.get_by_ids(&request.selected_strategy_ids).await,
        }
    }

    /// Dispatch one spawned task per pre-materialized row, bounded by the
    /// worker pool semaphore (§5). Each task's terminal `AnalysisResult`
    /// updates its Analysis Store row, triggers a notification, and — only
    /// on an unexpected task error — mass-fails the remaining pending rows
    /// for this (execution, symbol).
    async fn dispatch(
        &self,
        execution_id: &str,
        request: &AddSymbolRequest,
        strategies: &[StrategyConfiguration],
        task_ids: &[i64],
    ) {
        let mut handles = Vec::with_capacity(strategies.len());

        for (strategy, &task_id) in strategies.iter().zip(task_ids) {
            let permit = self.worker_pool.clone();
            let orchestrator = Orchestrator::new(self.data_provider.clone(), self.progress_store.clone());
            let analysis_store = self.analysis_store.clone();
            let notifier = self.notifier.clone();
            let execution_id = execution_id.to_string();
            let symbol = request.symbol.clone();
            let timeframe = Timeframe::parse(&strategy.timeframe).unwrap_or(Timeframe::Hour1);
            let strategy_ref = StrategyRef {
                name: strategy.name.clone(),
                risk_tolerance: strategy
                    .parameters
                    .get("risk_tolerance")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.5),
            };
            let is_backtest = request.is_backtest;
            let custom_period = request.custom_period.clone();
            let exec_id_for_task = format!("{execution_id}:{task_id}");

            let strategy_name = strategy.name.clone();

            handles.push((
                task_id,
                strategy_name,
                timeframe,
                tokio::spawn(async move {
                    let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                    analysis_store
                        .mark_task_running(task_id)
                        .await
                        .unwrap_or_else(|e| tracing::warn!("mark_task_running failed for task {}: {}", task_id, e));

                    let result = orchestrator
                        .analyze(&symbol, timeframe, &strategy_ref, &exec_id_for_task, is_backtest, None, custom_period)
                        .await;

                    notifier.notify(result.clone());
                    (task_id, result)
                }),
            ));
        }

        for (task_id, strategy_name, timeframe, handle) in handles {
            match handle.await {
                Ok((task_id, result)) => {
                    self.record_task_terminal(execution_id, &request.symbol, task_id, result).await;
                }
                Err(e) => {
                    tracing::warn!("dispatched task {} panicked for execution {}: {}", task_id, execution_id, e);
                    let crash_result = task_error_result(
                        &request.symbol,
                        timeframe,
                        &strategy_name,
                        execution_id,
                        ErrorKind::Other,
                        "worker crashed",
                    );
                    self.record_task_terminal(execution_id, &request.symbol, task_id, crash_result).await;
                }
            }
        }
    }

    async fn record_task_terminal(
        &self,
        execution_id: &str,
        symbol: &str,
        task_id: i64,
        result: AnalysisResult,
    ) {
        if let Some(details) = &result.error_details {
            if let Err(e) = self.analysis_store.mark_task_failed(task_id, &details.message).await {
                tracing::warn!("mark_task_failed failed for task {}: {}", task_id, e);
            }
            match self
                .analysis_store
                .mark_task_failed_by_execution(execution_id, symbol, &details.message)
                .await
            {
                Ok(affected) if affected > 0 => {
                    tracing::warn!(
                        "task {} failed with an unexpected error; mass-failed {} remaining pending task(s) for {}/{}",
                        task_id,
                        affected,
                        execution_id,
                        symbol
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("mass-fail by execution failed for {}/{}: {}", execution_id, symbol, e),
            }
            return;
        }

        if result.early_exit {
            let code = result.exit_reason.map(|r| r.code()).unwrap_or("early_exit");
            if let Err(e) = self.analysis_store.mark_task_failed(task_id, code).await {
                tracing::warn!("mark_task_failed failed for task {}: {}", task_id, e);
            }
            return;
        }

        let task_results = TaskResults {
            total_trades: Some(1),
            avg_leverage: result.recommendation.as_ref().and_then(|r| r.get("recommended_leverage")).and_then(|v| v.as_f64()),
            ..TaskResults::default()
        };

        if let Err(e) = self.analysis_store.mark_task_completed(task_id, task_results).await {
            tracing::warn!("mark_task_completed failed for task {}: {}", task_id, e);
        }
    }
}

fn validate_symbol(symbol: &str) -> Result<(), AnalysisError> {
    let valid = !symbol.is_empty()
        && symbol.len() <= 20
        && symbol.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(AnalysisError::InvalidData(format!("invalid symbol shape: {symbol:?}")))
    }
}

/// Publish per-request parameters to the ambient channel read by filters at
/// construction (§4.11). The coordinator is the only writer; it runs before
/// the batch is dispatched, matching the "set once per batch" contract.
fn publish_filter_params(params: &serde_json::Value) {
    match serde_json::to_string(params) {
        Ok(json) => std::env::set_var("FILTER_PARAMS", json),
        Err(e) => tracing::warn!("failed to serialize filter_params for the ambient channel: {}", e),
    }
}
