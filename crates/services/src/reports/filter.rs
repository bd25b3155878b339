use chrono::NaiveDate;
use thiserror::Error;

use quiz_core::model::CourseId;

use super::rows::ReportRow;

/// Non-fatal filter problems: the filter degrades and the dashboard
/// renders unfiltered data with a warning, never an error page.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FilterParseError {
    #[error("ignoring {field}: `{raw}` is not a valid date (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, raw: String },

    #[error("ignoring date range: {from} is after {to}")]
    ReversedRange { from: NaiveDate, to: NaiveDate },

    #[error("ignoring course filter: `{raw}` is not a course id")]
    InvalidCourse { raw: String },
}

/// Unvalidated filter input as the web layer hands it over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReportFilter {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub course: Option<String>,
    pub program: Option<String>,
}

/// Validated report filter. Dates bound the completion timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub course: Option<CourseId>,
    pub program: Option<String>,
}

/// A parsed filter plus whatever was dropped on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilter {
    pub filter: ReportFilter,
    pub warnings: Vec<FilterParseError>,
}

fn parse_date(
    field: &'static str,
    raw: Option<&str>,
    warnings: &mut Vec<FilterParseError>,
) -> Option<NaiveDate> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            warnings.push(FilterParseError::InvalidDate {
                field,
                raw: raw.to_owned(),
            });
            None
        }
    }
}

impl ReportFilter {
    /// Builds a filter from raw input, degrading instead of failing.
    ///
    /// Unparseable dates are dropped individually; a reversed range drops
    /// both bounds. Every dropped part is reported as a warning.
    #[must_use]
    pub fn from_raw(raw: &RawReportFilter) -> ParsedFilter {
        let mut warnings = Vec::new();

        let mut date_from = parse_date("date_from", raw.date_from.as_deref(), &mut warnings);
        let mut date_to = parse_date("date_to", raw.date_to.as_deref(), &mut warnings);

        if let (Some(from), Some(to)) = (date_from, date_to) {
            if from > to {
                warnings.push(FilterParseError::ReversedRange { from, to });
                date_from = None;
                date_to = None;
            }
        }

        let course = raw
            .course
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| match s.parse::<CourseId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warnings.push(FilterParseError::InvalidCourse { raw: s.to_owned() });
                    None
                }
            });

        let program = raw
            .program
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        ParsedFilter {
            filter: ReportFilter {
                date_from,
                date_to,
                course,
                program,
            },
            warnings,
        }
    }

    /// True when the row falls inside every active filter dimension.
    #[must_use]
    pub fn matches(&self, row: &ReportRow) -> bool {
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(completed) = row.completed_at else {
                return false;
            };
            let date = completed.date_naive();
            if self.date_from.is_some_and(|from| date < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| date > to) {
                return false;
            }
        }
        if self.course.is_some_and(|course| row.course_id != course) {
            return false;
        }
        if let Some(program) = &self.program {
            if row.program.as_deref() != Some(program.as_str()) {
                return false;
            }
        }
        true
    }

    /// Rows passing the filter, in their original order.
    #[must_use]
    pub fn apply<'a>(&self, rows: &'a [ReportRow]) -> Vec<&'a ReportRow> {
        rows.iter().filter(|row| self.matches(row)).collect()
    }

    /// The fully-specified date range, if one is active.
    #[must_use]
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.date_from?, self.date_to?))
    }

    /// Key/value pairs identifying this filter in cache keys.
    #[must_use]
    pub fn cache_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(from) = self.date_from {
            params.push(("date_from", from.to_string()));
        }
        if let Some(to) = self.date_to {
            params.push(("date_to", to.to_string()));
        }
        if let Some(course) = self.course {
            params.push(("course", course.to_string()));
        }
        if let Some(program) = &self.program {
            params.push(("program", program.clone()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(from: &str, to: &str) -> RawReportFilter {
        RawReportFilter {
            date_from: Some(from.to_owned()),
            date_to: Some(to.to_owned()),
            ..RawReportFilter::default()
        }
    }

    #[test]
    fn valid_range_parses_cleanly() {
        let parsed = ReportFilter::from_raw(&raw("2024-01-01", "2024-06-30"));
        assert!(parsed.warnings.is_empty());
        assert_eq!(
            parsed.filter.date_range(),
            Some((
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
            ))
        );
    }

    #[test]
    fn invalid_month_degrades_to_unfiltered_with_warning() {
        let parsed = ReportFilter::from_raw(&raw("2024-13-01", "2024-06-30"));
        assert_eq!(parsed.warnings.len(), 1);
        assert!(matches!(
            parsed.warnings[0],
            FilterParseError::InvalidDate {
                field: "date_from",
                ..
            }
        ));
        assert!(parsed.filter.date_from.is_none());
        // the valid bound survives
        assert!(parsed.filter.date_to.is_some());
    }

    #[test]
    fn reversed_range_drops_both_bounds() {
        let parsed = ReportFilter::from_raw(&raw("2024-06-30", "2024-01-01"));
        assert_eq!(parsed.warnings.len(), 1);
        assert!(matches!(
            parsed.warnings[0],
            FilterParseError::ReversedRange { .. }
        ));
        assert!(parsed.filter.date_from.is_none());
        assert!(parsed.filter.date_to.is_none());
    }

    #[test]
    fn invalid_course_id_warns_and_is_ignored() {
        let parsed = ReportFilter::from_raw(&RawReportFilter {
            course: Some("not-an-id".to_owned()),
            ..RawReportFilter::default()
        });
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.filter.course.is_none());
    }

    #[test]
    fn blank_fields_are_not_warnings() {
        let parsed = ReportFilter::from_raw(&RawReportFilter {
            date_from: Some("  ".to_owned()),
            program: Some(String::new()),
            ..RawReportFilter::default()
        });
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.filter, ReportFilter::default());
    }

    #[test]
    fn cache_params_reflect_only_active_dimensions() {
        let parsed = ReportFilter::from_raw(&RawReportFilter {
            date_from: Some("2024-01-01".to_owned()),
            program: Some("Mining".to_owned()),
            ..RawReportFilter::default()
        });
        let params = parsed.filter.cache_params();
        assert_eq!(
            params,
            vec![
                ("date_from", "2024-01-01".to_owned()),
                ("program", "Mining".to_owned())
            ]
        );
    }
}
