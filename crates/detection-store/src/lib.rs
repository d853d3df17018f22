pub mod models;
pub mod queries;
pub mod store;

pub use models::{
    AlertType, AnalysisRewrite, Camera, CounterDrift, Detection, DetectionAlert, InsertOutcome,
    NewDetection,
};
pub use queries::{
    CameraHourStats, DailyBucket, DetectionFilter, DetectionPage, DetectionWithCamera,
    HourlyBucket, Pagination, StatsSummary,
};
pub use store::DetectionStore;
