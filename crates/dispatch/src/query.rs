//! Query processing.

use std::time::Instant;

use async_trait::async_trait;

use crate::error::{BoxError, DispatchError, Result, record_failure};
use crate::event::short_type_name;
use crate::registry::{Contract, HandlerResolver, QueryContract};

/// A read-only request for data.
pub trait Query: Send + Sync + 'static {}

/// Answers query `Q` with a value of type `R`.
#[async_trait]
pub trait QueryHandler<Q: Query, R: Send + 'static>: Send + Sync {
    async fn handle(&self, query: &Q) -> std::result::Result<R, BoxError>;
}

/// Routes queries to the handler registered for their result type.
pub struct QueryProcessor<R> {
    resolver: R,
}

impl<R: HandlerResolver> QueryProcessor<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Runs a query and returns the handler's result unchanged.
    #[tracing::instrument(
        skip(self, query),
        fields(query_type = short_type_name::<Q>(), result_type = short_type_name::<T>())
    )]
    pub async fn process<Q: Query, T: Send + 'static>(&self, query: Q) -> Result<T> {
        let started = Instant::now();
        let result = self.execute::<Q, T>(&query).await.inspect_err(record_failure);

        metrics::counter!("dispatch_queries_total").increment(1);
        metrics::histogram!("dispatch_query_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Runs a query that may be absent.
    pub async fn process_optional<Q: Query, T: Send + 'static>(&self, query: Option<Q>) -> Result<T> {
        let query = query
            .ok_or(DispatchError::Argument("query"))
            .inspect_err(record_failure)?;
        self.process::<Q, T>(query).await
    }

    async fn execute<Q: Query, T: Send + 'static>(&self, query: &Q) -> Result<T> {
        let handler = self.resolver.resolve::<QueryContract<Q, T>>()?;
        handler
            .handle(query)
            .await
            .map_err(|source| DispatchError::Handler {
                contract: QueryContract::<Q, T>::describe(),
                source,
            })
    }
}
