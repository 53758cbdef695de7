pub mod audit;
pub mod clock;
pub mod collaborators;
pub mod controller;
pub mod eligibility;
pub mod rules;
pub mod scheduler;
mod stream;
pub mod variation;


pub use audit::{write_csv, AuditLog, CsvAuditSink, JsonLinesAuditSink, SharedAuditLog};
pub use clock::RunClock;
pub use collaborators::{AuditSink, NoopPoster, PostReceipt, Poster, RuleOracle};
pub use controller::{RunController, RunReport, RunState};
pub use eligibility::{evaluate, DispatchLedger, Verdict};
pub use rules::{classify_rules, is_megathread_title, StaticRuleOracle};
pub use scheduler::{next_slot, PacingConfig, PacingStatus, Scheduler};
pub use variation::{Rendering, Selection, VariationEngine, VariationMemory};
