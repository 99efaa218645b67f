pub mod assess;
pub mod persist;
pub mod report;
pub mod search;

pub use assess::AnalysisStage;
pub use persist::PersistStage;
pub use report::ReportStage;
pub use search::{AcademicSearchStage, MarketSearchStage, PatentSearchStage};
