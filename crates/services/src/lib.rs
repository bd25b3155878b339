#![forbid(unsafe_code)]

pub mod error;
pub mod reports;
pub mod sittings;

pub use quiz_core::Clock;

pub use error::QuizTakeError;
pub use reports::{DashboardService, DashboardSummary, RawReportFilter, ReportRow};
pub use sittings::{Actor, OrderBuilder, QuizTakeService};
