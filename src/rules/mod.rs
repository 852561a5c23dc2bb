// Rules layer: sheet-based recommendation engine and the flexible single-table engine.

pub mod engine;
pub mod flexible;
pub mod table;

pub use engine::{ConsolidatedRecommendations, Finding, Priority, RecommendationSet, RulesEngine};
pub use flexible::{FlexibleRulesEngine, FlexibleRulesOutcome};
pub use table::{RuleTable, SheetKind};
