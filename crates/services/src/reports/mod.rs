pub mod aggregate;
pub mod cache;
pub mod filter;
pub mod rows;
pub mod service;

// Public API of the reporting subsystem.
pub use aggregate::{
    ChartData, CourseSummary, DateField, OverviewStats, Period, TableData,
};
pub use cache::{MemoryCache, REPORT_CACHE_PREFIX, ReportCache};
pub use filter::{FilterParseError, ParsedFilter, RawReportFilter, ReportFilter};
pub use rows::{Demographics, Gender, ReportRow};
pub use service::{
    CertificatesReport, DashboardService, DashboardSummary, ReportRowSource, TemporalReport,
};
