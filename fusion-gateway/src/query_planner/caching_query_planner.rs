use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use fusion_planner::Operation;
use fusion_planner::OperationHash;
use fusion_planner::PlanningError;
use fusion_planner::QueryPlan;
use fusion_planner::QueryPlanner;
use lru::LruCache;
use parking_lot::Mutex;

/// A query planner wrapper that caches plans by schema and operation.
///
/// Plans are immutable once built: the same [`Arc`] is handed to every request executing the
/// same operation. Planning errors are never cached.
pub struct CachingQueryPlanner {
    delegate: QueryPlanner,
    cache: Mutex<LruCache<CachingQueryKey, Arc<QueryPlan>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CachingQueryKey {
    pub(crate) schema_hash: String,
    pub(crate) operation_hash: OperationHash,
}

impl fmt::Display for CachingQueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan:{}:{}", self.schema_hash, self.operation_hash)
    }
}

impl CachingQueryPlanner {
    pub fn new(delegate: QueryPlanner, capacity: NonZeroUsize) -> Self {
        Self {
            delegate,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.delegate
    }

    /// The plan of `operation`, built on first use.
    pub fn plan(&self, operation: &Operation) -> Result<Arc<QueryPlan>, PlanningError> {
        let key = CachingQueryKey {
            schema_hash: self.delegate.schema().hash().to_string(),
            operation_hash: operation.hash(),
        };
        if let Some(plan) = self.cache.lock().get(&key) {
            tracing::trace!(%key, "query plan cache hit");
            return Ok(plan.clone());
        }

        tracing::trace!(%key, "query plan cache miss");
        // Planning runs outside the lock; concurrent misses on one key both plan it.
        let plan = Arc::new(self.delegate.build_query_plan(operation)?);
        self.cache.lock().put(key, plan.clone());
        Ok(plan)
    }

    pub fn cached_plans(&self) -> usize {
        self.cache.lock().len()
    }
}

impl fmt::Debug for CachingQueryPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingQueryPlanner")
            .field("delegate", &self.delegate)
            .field("cached_plans", &self.cached_plans())
            .finish()
    }
}
