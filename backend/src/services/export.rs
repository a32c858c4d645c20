//! CSV export of list data

use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Row type of a CSV export, with its column names in field order
pub trait CsvRow: Serialize {
    const HEADERS: &'static [&'static str];
}

/// Serialize rows as CSV. The header line is written even when there are no rows.
pub fn export_to_csv<T: CsvRow>(data: &[T]) -> AppResult<String> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(vec![]);
    wtr.write_record(T::HEADERS)
        .map_err(|e| AppError::Internal(format!("CSV header error: {}", e)))?;
    for record in data {
        wtr.serialize(record)
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
}

/// `Content-Disposition` value for a download named `{stem}-{date}.csv`
pub fn attachment_disposition(stem: &str, date: chrono::NaiveDate) -> String {
    format!("attachment; filename=\"{}-{}.csv\"", stem, date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[derive(Serialize)]
    struct Row {
        registration: String,
        make: String,
        odometer: Option<u32>,
    }

    impl CsvRow for Row {
        const HEADERS: &'static [&'static str] = &["registration", "make", "odometer"];
    }

    #[test]
    fn test_csv_has_header_and_quotes_commas() {
        let rows = vec![
            Row {
                registration: "AB12CDE".into(),
                make: "Ford".into(),
                odometer: Some(1200),
            },
            Row {
                registration: "XY99ZZZ".into(),
                make: "Mercedes, Benz".into(),
                odometer: None,
            },
        ];
        let csv = export_to_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "registration,make,odometer");
        assert_eq!(lines[1], "AB12CDE,Ford,1200");
        assert_eq!(lines[2], "XY99ZZZ,\"Mercedes, Benz\",");
    }

    #[test]
    fn test_empty_export_keeps_header() {
        let rows: Vec<Row> = Vec::new();
        assert_eq!(export_to_csv(&rows).unwrap(), "registration,make,odometer\n");
    }

    #[test]
    fn test_disposition() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(
            attachment_disposition("vehicles", date),
            "attachment; filename=\"vehicles-2026-10-19.csv\""
        );
    }
}
