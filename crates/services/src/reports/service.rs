use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use quiz_core::Clock;
use storage::repository::StorageError;

use super::aggregate::{
    ChartData, CourseSummary, DateField, OverviewStats, Period, TableData, approvals_histogram,
    certificates_table, company_distribution, gender_distribution, overview,
    program_distribution, score_distribution, top_courses,
};
use super::cache::{ReportCache, cache_key, default_ttl};
use super::filter::{RawReportFilter, ReportFilter};
use super::rows::ReportRow;

/// Supplies the finalized sittings the dashboards aggregate over.
///
/// The web layer implements this with whatever joins produce the
/// demographic columns; tests use an in-memory vector.
#[async_trait]
pub trait ReportRowSource: Send + Sync {
    /// All completed sittings, flattened for reporting.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the rows cannot be loaded.
    async fn completed_rows(&self) -> Result<Vec<ReportRow>, StorageError>;
}

/// Everything the certificates dashboard renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub stats: OverviewStats,
    pub monthly_approvals: ChartData,
    pub program_distribution: ChartData,
    pub company_distribution: ChartData,
    pub gender_distribution: ChartData,
    pub score_distribution: ChartData,
    pub top_courses: Vec<CourseSummary>,
    /// Filter parts that were dropped during parsing.
    pub warnings: Vec<String>,
    /// Set when the underlying rows could not be loaded; charts render
    /// empty rather than the dashboard failing outright.
    pub error_message: Option<String>,
}

/// Certificate listing for exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificatesReport {
    pub table: TableData,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
}

/// Approvals-over-time payload for the temporal dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalReport {
    pub chart: ChartData,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
}

/// Computes dashboard payloads, with an advisory cache in front.
pub struct DashboardService {
    rows: Arc<dyn ReportRowSource>,
    cache: Option<Arc<dyn ReportCache>>,
    clock: Clock,
}

impl DashboardService {
    #[must_use]
    pub fn new(rows: Arc<dyn ReportRowSource>, clock: Clock) -> Self {
        Self {
            rows,
            cache: None,
            clock,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ReportCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn cached<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let value = self.cache.as_ref()?.get(key)?;
        match serde_json::from_value(value) {
            Ok(payload) => {
                tracing::debug!(key, "report cache hit");
                Some(payload)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding malformed cache entry");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, payload: &T) {
        let Some(cache) = &self.cache else { return };
        if let Ok(value) = serde_json::to_value(payload) {
            cache.set(key, value, default_ttl());
        }
    }

    /// The certificates overview dashboard for the given raw filter.
    ///
    /// Never fails: filter problems degrade to unfiltered data with
    /// warnings, and a storage failure produces an empty payload carrying
    /// `error_message`.
    pub async fn overview_dashboard(&self, raw: &RawReportFilter) -> DashboardSummary {
        let parsed = ReportFilter::from_raw(raw);
        let warnings: Vec<String> = parsed.warnings.iter().map(ToString::to_string).collect();

        // degraded filters skip the cache so the warning always surfaces
        let key = cache_key("overview", &parsed.filter.cache_params());
        if warnings.is_empty() {
            if let Some(summary) = self.cached::<DashboardSummary>(&key) {
                return summary;
            }
        }

        let rows = match self.rows.completed_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "report rows unavailable; rendering empty dashboard");
                return DashboardSummary {
                    warnings,
                    error_message: Some(e.to_string()),
                    ..DashboardSummary::default()
                };
            }
        };

        let summary = self.compute_summary(&rows, &parsed.filter, warnings);
        if summary.warnings.is_empty() {
            self.store(&key, &summary);
        }
        summary
    }

    fn compute_summary(
        &self,
        rows: &[ReportRow],
        filter: &ReportFilter,
        warnings: Vec<String>,
    ) -> DashboardSummary {
        let filtered = filter.apply(rows);
        let today = self.clock.now().date_naive();

        DashboardSummary {
            stats: overview(&filtered),
            monthly_approvals: approvals_histogram(
                &filtered,
                Period::Monthly,
                DateField::CompletedAt,
                filter.date_range(),
                today,
            ),
            program_distribution: program_distribution(&filtered),
            company_distribution: company_distribution(&filtered),
            gender_distribution: gender_distribution(&filtered),
            score_distribution: score_distribution(&filtered),
            top_courses: top_courses(&filtered),
            warnings,
            error_message: None,
        }
    }

    /// Approvals over time at the requested granularity, same degradation
    /// rules as the overview dashboard.
    pub async fn temporal_histogram(
        &self,
        raw: &RawReportFilter,
        period: Period,
    ) -> TemporalReport {
        let parsed = ReportFilter::from_raw(raw);
        let warnings: Vec<String> = parsed.warnings.iter().map(ToString::to_string).collect();

        let mut params = parsed.filter.cache_params();
        params.push(("period", period.as_str().to_owned()));
        let key = cache_key("temporal", &params);
        if warnings.is_empty() {
            if let Some(report) = self.cached::<TemporalReport>(&key) {
                return report;
            }
        }

        let rows = match self.rows.completed_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "report rows unavailable; rendering empty histogram");
                return TemporalReport {
                    warnings,
                    error_message: Some(e.to_string()),
                    ..TemporalReport::default()
                };
            }
        };

        let filtered = parsed.filter.apply(&rows);
        let report = TemporalReport {
            chart: approvals_histogram(
                &filtered,
                period,
                DateField::CompletedAt,
                parsed.filter.date_range(),
                self.clock.now().date_naive(),
            ),
            warnings,
            error_message: None,
        };
        if report.warnings.is_empty() {
            self.store(&key, &report);
        }
        report
    }

    /// Flat certificate listing for CSV/PDF export, same degradation rules
    /// as the dashboard.
    pub async fn certificates_report(&self, raw: &RawReportFilter) -> CertificatesReport {
        let parsed = ReportFilter::from_raw(raw);
        let warnings: Vec<String> = parsed.warnings.iter().map(ToString::to_string).collect();

        let key = cache_key("certificates_report", &parsed.filter.cache_params());
        if warnings.is_empty() {
            if let Some(report) = self.cached::<CertificatesReport>(&key) {
                return report;
            }
        }

        let rows = match self.rows.completed_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "report rows unavailable; rendering empty report");
                return CertificatesReport {
                    warnings,
                    error_message: Some(e.to_string()),
                    ..CertificatesReport::default()
                };
            }
        };

        let filtered = parsed.filter.apply(&rows);
        let report = CertificatesReport {
            table: certificates_table(&filtered),
            warnings,
            error_message: None,
        };
        if report.warnings.is_empty() {
            self.store(&key, &report);
        }
        report
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
