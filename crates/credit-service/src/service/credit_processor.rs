//! 信贷申请处理器
//!
//! 有界任务队列 + 固定数量的 worker，串起客户/银行查询、资格评估、持久化、
//! 事件发布和缓存写入。
//!
//! ## 处理流程
//!
//! 1. 查询客户 -> 2. 查询银行 -> 3. 决策引擎评估 -> 4. 以 PENDING 写入
//!    -> 5. 评估通过则转为 APPROVED（失败只记录日志）
//!    -> 6. 发布 CreditCreated（以及 CreditApproved）
//!    -> 7. 写入缓存 -> 8. 返回结果
//!
//! 事件发布和缓存写入失败只记录日志与指标，不影响返回结果，也不重试。
//! 调用方在任务入队后放弃等待时，任务仍会执行完毕，结果被丢弃。

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

use credit_shared::cache::{CacheKey, CacheStore, JsonCache, get_typed, set_typed};
use credit_shared::config::ProcessorConfig;
use credit_shared::events::{DomainEvent, EventPublisher};
use credit_shared::models::{CreateCreditInput, Credit, CreditStatus, Pagination, UpdateCreditInput};
use credit_shared::observability::metrics::{MetricsSink, names};
use decision_engine::{DecisionEngine, EligibilityInput, EligibilityResult};

use crate::context::RequestContext;
use crate::error::{CreditError, Result};
use crate::events;
use crate::repository::{BankRepository, ClientRepository, CreditRepository};

/// 处理器依赖的外部端口
pub struct CreditProcessorDeps {
    pub clients: Arc<dyn ClientRepository>,
    pub banks: Arc<dyn BankRepository>,
    pub credits: Arc<dyn CreditRepository>,
    pub engine: Arc<dyn DecisionEngine>,
    /// 未配置缓存时所有读取直接走存储
    pub cache: Option<Arc<dyn CacheStore>>,
    pub publisher: Arc<dyn EventPublisher>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// 队列中的任务
struct CreditJob {
    input: CreateCreditInput,
    enqueued_at: Instant,
    reply: oneshot::Sender<Result<Credit>>,
}

/// worker 与同步路径共享的业务核心
struct ProcessorCore {
    clients: Arc<dyn ClientRepository>,
    banks: Arc<dyn BankRepository>,
    credits: Arc<dyn CreditRepository>,
    engine: Arc<dyn DecisionEngine>,
    cache: Option<Arc<dyn CacheStore>>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<dyn MetricsSink>,
    cache_ttl_seconds: u64,
    default_page_size: i64,
}

impl ProcessorCore {
    /// 执行一次完整处理并记录耗时与失败指标
    async fn process(&self, ctx: &RequestContext, input: &CreateCreditInput) -> Result<Credit> {
        let started = Instant::now();
        let result = self.create_credit(ctx, input).await;
        self.metrics
            .record_duration(names::PROCESSING_DURATION, started.elapsed());

        if let Err(e) = &result {
            self.metrics.increment(names::PROCESSING_FAILURES);
            warn!(
                client_id = %input.client_id,
                bank_id = %input.bank_id,
                code = e.code(),
                error = %e,
                "信贷申请处理失败"
            );
        }
        result
    }

    async fn create_credit(&self, ctx: &RequestContext, input: &CreateCreditInput) -> Result<Credit> {
        let client = self
            .clients
            .get_by_id(ctx, &input.client_id)
            .await?
            .ok_or_else(|| CreditError::ClientNotFound(input.client_id.clone()))?;

        let bank = self
            .banks
            .get_by_id(ctx, &input.bank_id)
            .await?
            .ok_or_else(|| CreditError::BankNotFound(input.bank_id.clone()))?;

        let eligibility = EligibilityInput::new(Some(client), Some(bank), input);
        let decision = self.engine.evaluate(Some(&eligibility))?;
        debug!(
            approved = decision.approved,
            rule = %decision.rule_name,
            score = decision.score,
            "资格评估完成"
        );

        let mut credit = self.credits.create(ctx, input).await?;
        self.metrics.increment(names::CREDITS_CREATED);

        let mut approved = false;
        if decision.approved {
            match self
                .credits
                .update_status(ctx, &credit.id, CreditStatus::Approved)
                .await
            {
                Ok(Some(updated)) => {
                    credit = updated;
                    approved = true;
                    self.metrics.increment(names::CREDITS_APPROVED);
                }
                Ok(None) => {
                    warn!(credit_id = %credit.id, "审批时信贷申请已不存在，保持 PENDING");
                }
                Err(e) => {
                    warn!(credit_id = %credit.id, error = %e, "审批状态更新失败，保持 PENDING");
                }
            }
        }

        self.publish(&credit.id, events::credit_created(&credit)).await;
        if approved {
            self.publish(&credit.id, events::credit_approved(&credit)).await;
        }

        self.write_cache(&credit).await;

        info!(
            credit_id = %credit.id,
            status = %credit.status,
            rule = %decision.rule_name,
            "信贷申请处理完成"
        );
        Ok(credit)
    }

    async fn publish(
        &self,
        credit_id: &str,
        event: credit_shared::error::Result<DomainEvent>,
    ) {
        let outcome = match event {
            Ok(event) => {
                let event_type = event.event_type;
                self.publisher
                    .publish(event)
                    .await
                    .map_err(|e| (event_type.to_string(), e))
            }
            Err(e) => Err(("encode".to_string(), e)),
        };

        if let Err((event_type, e)) = outcome {
            self.metrics.increment(names::EVENT_PUBLISH_FAILURES);
            warn!(credit_id, event_type = %event_type, error = %e, "领域事件发布失败");
        }
    }

    fn json_cache(&self) -> Option<&dyn JsonCache> {
        self.cache.as_deref().and_then(|cache| cache.as_json())
    }

    async fn write_cache(&self, credit: &Credit) {
        let Some(cache) = self.json_cache() else {
            return;
        };
        let key = CacheKey::credit(&credit.id);
        if let Err(e) = set_typed(cache, &key, credit, self.cache_ttl_seconds).await {
            self.metrics.increment(names::CACHE_ERRORS);
            warn!(credit_id = %credit.id, error = %e, "信贷缓存写入失败");
        }
    }

    async fn invalidate(&self, credit_id: &str) {
        let Some(cache) = self.cache.as_deref() else {
            return;
        };
        if let Err(e) = cache.delete(&CacheKey::credit(credit_id)).await {
            self.metrics.increment(names::CACHE_ERRORS);
            warn!(credit_id, error = %e, "信贷缓存失效失败");
        }
    }

    fn page(&self, limit: i64, offset: i64) -> Pagination {
        Pagination::with_default(limit, offset, self.default_page_size)
    }
}

/// 信贷申请处理器
///
/// 必须在 tokio 运行时内创建。`shutdown` 之后提交的任务返回 `ProcessorStopped`；
/// drop 时只发出停止信号，不等待 worker 退出。
pub struct CreditProcessor {
    core: Arc<ProcessorCore>,
    jobs: mpsc::Sender<CreditJob>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl CreditProcessor {
    pub fn new(deps: CreditProcessorDeps, config: &ProcessorConfig) -> Self {
        let core = Arc::new(ProcessorCore {
            clients: deps.clients,
            banks: deps.banks,
            credits: deps.credits,
            engine: deps.engine,
            cache: deps.cache,
            publisher: deps.publisher,
            metrics: deps.metrics,
            cache_ttl_seconds: config.cache_ttl_seconds,
            default_page_size: config.default_page_size,
        });

        let (jobs, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let (shutdown_tx, _) = watch::channel(false);

        let worker_count = config.workers.max(1);
        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(Self::worker_loop(
                    id,
                    core.clone(),
                    rx.clone(),
                    shutdown_tx.subscribe(),
                ))
            })
            .collect();

        info!(
            workers = worker_count,
            queue_capacity = config.queue_capacity.max(1),
            "信贷处理器已启动"
        );

        Self {
            core,
            jobs,
            shutdown_tx,
            workers: Mutex::new(workers),
        }
    }

    async fn worker_loop(
        worker_id: usize,
        core: Arc<ProcessorCore>,
        jobs: Arc<Mutex<mpsc::Receiver<CreditJob>>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!(worker_id, "worker 已启动");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let job = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                job = async { jobs.lock().await.recv().await } => job,
            };

            // 所有发送端都已关闭
            let Some(job) = job else {
                break;
            };

            core.metrics
                .record_duration(names::QUEUE_WAIT, job.enqueued_at.elapsed());

            let result = core.process(&RequestContext::detached(), &job.input).await;
            if job.reply.send(result).is_err() {
                debug!(worker_id, "调用方已放弃等待，处理结果丢弃");
            }
        }

        debug!(worker_id, "worker 已退出");
    }

    /// 处理器是否仍在接收任务
    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// 提交新申请到任务队列并等待处理结果
    ///
    /// 入队和等待结果两个阶段都会响应调用方的取消与超时。
    #[instrument(skip(self, ctx, input), fields(client_id = %input.client_id, bank_id = %input.bank_id))]
    pub async fn submit(&self, ctx: &RequestContext, input: CreateCreditInput) -> Result<Credit> {
        input.validate()?;
        ctx.check()?;
        if !self.is_running() {
            return Err(CreditError::ProcessorStopped);
        }

        let (reply, result) = oneshot::channel();
        let job = CreditJob {
            input,
            enqueued_at: Instant::now(),
            reply,
        };

        tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            sent = self.jobs.send(job) => {
                sent.map_err(|_| CreditError::ProcessorStopped)?;
            }
        }
        self.core.metrics.increment(names::JOBS_ENQUEUED);

        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            outcome = result => match outcome {
                Ok(result) => result,
                // 任务随队列一起被丢弃
                Err(_) => Err(CreditError::ProcessorStopped),
            },
        }
    }

    /// 在调用方任务上直接处理，不经过队列
    #[instrument(skip(self, ctx, input), fields(client_id = %input.client_id, bank_id = %input.bank_id))]
    pub async fn submit_sync(&self, ctx: &RequestContext, input: CreateCreditInput) -> Result<Credit> {
        input.validate()?;
        self.core.process(ctx, &input).await
    }

    /// 按 ID 查询，优先读缓存
    ///
    /// 缓存未命中、读取失败或内容损坏时回源存储，回源结果不回填缓存。
    #[instrument(skip(self, ctx))]
    pub async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Credit>> {
        ctx.check()?;

        if let Some(cache) = self.core.json_cache() {
            match get_typed::<Credit>(cache, &CacheKey::credit(id)).await {
                Ok(Some(credit)) if !credit.id.is_empty() => {
                    self.core.metrics.increment(names::CACHE_HITS);
                    return Ok(Some(credit));
                }
                Ok(_) => self.core.metrics.increment(names::CACHE_MISSES),
                Err(e) => {
                    self.core.metrics.increment(names::CACHE_ERRORS);
                    warn!(credit_id = id, error = %e, "信贷缓存读取失败，回源存储");
                }
            }
        }

        self.core.credits.get_by_id(ctx, id).await
    }

    /// 外部状态变更
    ///
    /// 申请不存在时返回 `None`，不发布事件也不访问缓存。
    #[instrument(skip(self, ctx))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: CreditStatus,
    ) -> Result<Option<Credit>> {
        let Some(credit) = self.core.credits.update_status(ctx, id, status).await? else {
            return Ok(None);
        };

        match status {
            CreditStatus::Approved => self.core.metrics.increment(names::CREDITS_APPROVED),
            CreditStatus::Rejected => self.core.metrics.increment(names::CREDITS_REJECTED),
            CreditStatus::Pending => {}
        }

        if let Some(event) = events::status_changed(&credit, status) {
            self.core.publish(&credit.id, event).await;
        }
        self.core.invalidate(&credit.id).await;

        info!(credit_id = %credit.id, status = %status, "信贷申请状态已更新");
        Ok(Some(credit))
    }

    /// 修改还款条件与状态，缓存条目失效
    #[instrument(skip(self, ctx, input))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateCreditInput,
    ) -> Result<Option<Credit>> {
        input.validate()?;

        let updated = self.core.credits.update(ctx, id, input).await?;
        if let Some(credit) = &updated {
            self.core.invalidate(&credit.id).await;
        }
        Ok(updated)
    }

    /// 软删除
    #[instrument(skip(self, ctx))]
    pub async fn deactivate(&self, ctx: &RequestContext, id: &str) -> Result<Option<Credit>> {
        self.set_active(ctx, id, false).await
    }

    /// 恢复已软删除的申请
    #[instrument(skip(self, ctx))]
    pub async fn reactivate(&self, ctx: &RequestContext, id: &str) -> Result<Option<Credit>> {
        self.set_active(ctx, id, true).await
    }

    async fn set_active(&self, ctx: &RequestContext, id: &str, active: bool) -> Result<Option<Credit>> {
        let updated = self.core.credits.set_active(ctx, id, active).await?;
        if let Some(credit) = &updated {
            self.core.invalidate(&credit.id).await;
        }
        Ok(updated)
    }

    pub async fn list(&self, ctx: &RequestContext, limit: i64, offset: i64) -> Result<Vec<Credit>> {
        self.core.credits.list(ctx, self.core.page(limit, offset)).await
    }

    pub async fn list_by_client_id(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Credit>> {
        self.core
            .credits
            .list_by_client_id(ctx, client_id, self.core.page(limit, offset))
            .await
    }

    /// 并发查询客户与银行后评估资格，不落库
    ///
    /// 查询错误优先返回；客户与银行都不存在时返回 `ClientNotFound`。
    #[instrument(skip(self, ctx, input), fields(client_id = %input.client_id, bank_id = %input.bank_id))]
    pub async fn validate_eligibility_concurrent(
        &self,
        ctx: &RequestContext,
        input: &CreateCreditInput,
    ) -> Result<EligibilityResult> {
        input.validate()?;

        let (client, bank) = tokio::join!(
            self.core.clients.get_by_id(ctx, &input.client_id),
            self.core.banks.get_by_id(ctx, &input.bank_id),
        );
        let (client, bank) = (client?, bank?);

        let client = client.ok_or_else(|| CreditError::ClientNotFound(input.client_id.clone()))?;
        let bank = bank.ok_or_else(|| CreditError::BankNotFound(input.bank_id.clone()))?;

        let eligibility = EligibilityInput::new(Some(client), Some(bank), input);
        Ok(self.core.engine.evaluate(Some(&eligibility))?)
    }

    /// 停止所有 worker 并等待其退出
    ///
    /// 队列中尚未被取走的任务不再处理，其提交方收到 `ProcessorStopped`。
    /// 可重复调用，并发调用时后到者等待先到者完成。
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let mut workers = self.workers.lock().await;
        if workers.is_empty() {
            return;
        }
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "worker 异常退出");
            }
        }
        info!("信贷处理器已停止");
    }
}

impl Drop for CreditProcessor {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
