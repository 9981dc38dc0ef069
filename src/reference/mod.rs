/////////////////////////////////////////////////////////////////////////////////////
//
// Markov SIR model
//
// reference module
//
// reads observed cumulative case counts (one row per country per date) so
// simulated curves and growth rates can be compared with reality
//
////////////////////////////////////////////////////////////////////////////////////

use super::errors::DataError;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const DATE_FORMAT: &str = "%b %d, %Y";

/// Parses a date as written in the case file ("Mar 6, 2020").
pub fn parse_case_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct CasePoint {
    pub date: NaiveDate,
    pub day_index: i64, // days since the series' first record
    pub cumulative_cases: u64,
}

/// One country's cumulative cases in date order.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSeries {
    pub country: String,
    pub points: Vec<CasePoint>,
}

impl CaseSeries {
    pub fn origin(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    /// `days` consecutive records starting at the first record on or after
    /// `start`.
    pub fn window(&self, start: NaiveDate, days: usize) -> Vec<CasePoint> {
        self.points
            .iter()
            .skip_while(|p| p.date < start)
            .take(days)
            .copied()
            .collect()
    }

    // (day index, cumulative cases) pairs for fitting or plotting
    pub fn pairs(points: &[CasePoint]) -> Vec<(f64, f64)> {
        points
            .iter()
            .map(|p| (p.day_index as f64, p.cumulative_cases as f64))
            .collect()
    }
}

pub fn load_case_series(path: &Path, country: &str) -> Result<CaseSeries, DataError> {
    let file = std::fs::File::open(path).map_err(|e| DataError::io(path.display(), e))?;
    read_case_series(file, country)
}

/// Columns are `Entity, Code, Date, <cumulative cases>`; the count is always
/// the last column.  Rows for other countries are skipped.
pub fn read_case_series<R: Read>(reader: R, country: &str) -> Result<CaseSeries, DataError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut dated = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        if record.get(0).map(str::trim) != Some(country) {
            continue;
        }
        if record.len() < 4 {
            return Err(DataError::MalformedRecord {
                line,
                reason: format!("expected 4 columns, found {}", record.len()),
            });
        }
        let date_text = &record[2];
        let date = parse_case_date(date_text).ok_or_else(|| DataError::MalformedRecord {
            line,
            reason: format!("unreadable date '{}'", date_text),
        })?;
        let cases_text = record[record.len() - 1].trim();
        let cumulative_cases: u64 = cases_text.parse().map_err(|_| DataError::MalformedRecord {
            line,
            reason: format!("unreadable case count '{}'", cases_text),
        })?;
        dated.push((date, cumulative_cases));
    }

    dated.sort_by_key(|(date, _)| *date);
    let origin = match dated.first() {
        Some((date, _)) => *date,
        None => return Err(DataError::NoRecords(country.to_string())),
    };
    let points: Vec<CasePoint> = dated
        .into_iter()
        .map(|(date, cumulative_cases)| CasePoint {
            date,
            day_index: (date - origin).num_days(),
            cumulative_cases,
        })
        .collect();

    debug!("{} case records for {}", points.len(), country);
    Ok(CaseSeries {
        country: country.to_string(),
        points,
    })
}
