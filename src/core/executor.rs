use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};
use tracing::Instrument;

use crate::{
    core::plan::{Plan, WafAction},
    ports::waf_api::{ApiResponse, WafApi, WafApiResult},
};

/// Outcome of one submitted request
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub action: WafAction,
    pub result: WafApiResult<ApiResponse>,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Every outcome of a run, in plan order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<RequestOutcome>,
    /// Tasks that died before reporting (panicked or cancelled)
    pub lost: usize,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded() + self.lost
    }

    pub fn failures(&self) -> impl Iterator<Item = &RequestOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Submits every action of a plan concurrently and waits for all of them
pub struct Executor {
    api: Arc<dyn WafApi>,
    limit: Option<Arc<Semaphore>>,
}

impl Executor {
    /// `concurrency == 0` starts one task per request at once; a positive value
    /// bounds the number of requests in flight.
    pub fn new(api: Arc<dyn WafApi>, concurrency: usize) -> Self {
        let limit = (concurrency > 0).then(|| Arc::new(Semaphore::new(concurrency)));
        Self { api, limit }
    }

    pub async fn execute(&self, plan: &Plan) -> RunReport {
        let mut tasks = JoinSet::new();

        tracing::info!("Submitting {} request(s)", plan.len());

        for (index, action) in plan.actions().iter().cloned().enumerate() {
            let api = self.api.clone();
            let limit = self.limit.clone();
            let span = tracing::info_span!(
                "waf_request",
                action = action.name(),
                waf.target = %action.target(),
                http.status_code = tracing::field::Empty,
            );

            tasks.spawn(
                async move {
                    let _permit = match limit {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };

                    let result = api.submit(&action).await;
                    match &result {
                        Ok(_) => tracing::info!("{action} succeeded"),
                        Err(e) => tracing::error!("{action} failed: {e}"),
                    }
                    (index, RequestOutcome { action, result })
                }
                .instrument(span),
            );
        }

        let mut indexed = Vec::with_capacity(plan.len());
        let mut lost = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => indexed.push(outcome),
                Err(e) => {
                    tracing::error!("Request task did not complete: {e}");
                    lost += 1;
                }
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        let report = RunReport {
            outcomes: indexed.into_iter().map(|(_, outcome)| outcome).collect(),
            lost,
        };
        tracing::info!(
            "Finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }
}
