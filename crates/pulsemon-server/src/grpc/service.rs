use crate::state::AppState;
use pulsemon_common::proto::metrics_service_server::MetricsService;
use pulsemon_common::proto::{self, CreateResponse, Empty, MetricId, MetricList};
use pulsemon_common::types::{Metric, MetricError, MetricKind};
use pulsemon_storage::error::StorageError;
use tonic::{Request, Response, Status};

pub struct MetricsServiceImpl {
    state: AppState,
}

impl MetricsServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

fn invalid(e: MetricError) -> Status {
    Status::invalid_argument(e.to_string())
}

fn storage_status(e: StorageError) -> Status {
    match e {
        StorageError::NotFound { .. } => Status::not_found(e.to_string()),
        StorageError::InvalidMetric(inner) => invalid(inner),
        other => {
            tracing::error!(error = %other, "Storage operation failed");
            Status::internal("internal storage error")
        }
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsServiceImpl {
    async fn create_metric(
        &self,
        request: Request<proto::Metric>,
    ) -> Result<Response<CreateResponse>, Status> {
        let metric = Metric::try_from(request.into_inner()).map_err(invalid)?;
        let stored = self
            .state
            .storage
            .create_record(&metric)
            .await
            .map_err(storage_status)?;

        tracing::debug!(metric = %stored.id, kind = %stored.kind, "Metric created via gRPC");
        Ok(Response::new(CreateResponse {
            message: format!("{} {} = {}", stored.kind, stored.id, stored.value_text()),
        }))
    }

    async fn create_metrics(
        &self,
        request: Request<MetricList>,
    ) -> Result<Response<CreateResponse>, Status> {
        let metrics = request
            .into_inner()
            .metrics
            .into_iter()
            .map(Metric::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        self.state
            .storage
            .store_metrics_batch(&metrics)
            .await
            .map_err(storage_status)?;

        tracing::debug!(count = metrics.len(), "Metric batch stored via gRPC");
        Ok(Response::new(CreateResponse {
            message: format!("stored {} metrics", metrics.len()),
        }))
    }

    async fn get_metric(
        &self,
        request: Request<MetricId>,
    ) -> Result<Response<proto::Metric>, Status> {
        let id = request.into_inner();
        if id.id.is_empty() {
            return Err(invalid(MetricError::MissingName));
        }
        let kind = MetricKind::try_from(id.r#type).map_err(invalid)?;
        let metric = self
            .state
            .storage
            .get_record(&id.id, kind)
            .await
            .map_err(storage_status)?;
        Ok(Response::new(proto::Metric::from(&metric)))
    }

    async fn get_metrics(&self, _request: Request<Empty>) -> Result<Response<MetricList>, Status> {
        let snapshot = self
            .state
            .storage
            .get_all_records()
            .await
            .map_err(storage_status)?;
        Ok(Response::new(MetricList {
            metrics: snapshot.to_metrics().iter().map(proto::Metric::from).collect(),
        }))
    }
}
