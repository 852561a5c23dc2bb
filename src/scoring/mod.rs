// Scoring layer: functional metrics, composite indices and the predictive model.

pub mod indices;
pub mod metrics;
pub mod model;
pub mod stats;

pub use indices::{calculate_all, CompositeIndices, IndexRecommendation};
pub use metrics::{MetricEngine, MetricsReport};
pub use model::{build_predictive_model, collect_features, ModelResult, ModelSettings};
