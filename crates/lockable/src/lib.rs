#[macro_use]
pub(crate) mod internal;

pub use crate::internal::common::{Map, Set};

pub use crate::internal::common::ids::{ResourceIdx, WorkItemId};

pub use crate::internal::common::error::LockError;

pub type Error = LockError;
pub type Result<T> = std::result::Result<T, Error>;

pub mod resources {
    pub use crate::internal::resource::{
        LockOwner, QueueTicket, Resource, ResourceProperty, ResourceState,
    };
}

pub mod index {
    pub use crate::internal::index::{LabelAlias, LabelIndex, LoadBalancingGroup};
}

pub mod expand {
    pub use crate::internal::expand::{
        EnvVars, expand_tokens, expand_variable, expanded_variables, fold_percent_syntax,
        placeholder_name,
    };
}

pub mod predicate {
    pub use crate::internal::predicate::{
        BasicEvaluator, DisabledEvaluator, ExpressionEvaluator, PredicateValue, ResourceView,
        expression_matches,
    };
}

pub mod requirement {
    pub use crate::internal::requirement::{
        EXPRESSION_MARKER, LABEL_MARKER, RequirementMode, RequirementSpec,
        RequirementSpecBuilder, ResolvedRequirement,
    };
}

pub mod config {
    pub use crate::internal::config::{
        DEFAULT_QUEUE_TIMEOUT, LabelList, PoolConfig, ResourceConfig,
    };
}

pub mod clock {
    pub use crate::internal::common::clock::{Clock, Expiry, ManualClock, SystemClock};
}

pub mod pool {
    pub use crate::internal::admission::{Admission, BlockedReason};
    pub use crate::internal::allocator::AllocationOutcome;
    pub use crate::internal::pool::ResourceOverview;
    pub use crate::internal::pool::ResourcePool;
    pub use crate::internal::pool::matched::{MatchedEntry, MatchedGroup, MatchedResources};
    pub use crate::internal::pool::store::{CatalogStore, MemoryStore, NoopStore};
}
