#![allow(clippy::unwrap_used, clippy::expect_used)]
//! CSV export read back through a standard CSV parser.

use chrono::NaiveDate;
use permit_log_core::export::{to_csv, write_export};
use permit_log_core::permit::{Permit, PermitDraft, PermitStatus, PermitType, SHEET_COLUMNS};
use pretty_assertions::assert_eq;

fn permits() -> Vec<Permit> {
    let tricky = PermitDraft {
        permit_type: Some(PermitType::ConfinedSpace),
        date: "2024-03-02".to_string(),
        time: "06:45".to_string(),
        location: "Tank 4, north hatch".to_string(),
        contractor: "Acme \"Deep\" Services".to_string(),
        supervisor: "J. Lee".to_string(),
        work_description: "Inspect welds, then \"blind\" the inlet\nsecond shift continues"
            .to_string(),
        hazards: "O2 deficiency".to_string(),
        status: PermitStatus::Suspended,
        ..Default::default()
    };
    let plain = PermitDraft {
        permit_type: Some(PermitType::Lifting),
        date: "2024-03-01".to_string(),
        location: "Crane pad".to_string(),
        contractor: "Northline".to_string(),
        supervisor: "M. Ruiz".to_string(),
        ..Default::default()
    };
    vec![
        Permit::new("TWS O-16123", tricky).unwrap(),
        Permit::new("TWS O-16123", plain).unwrap(),
    ]
}

#[test]
fn standard_parser_recovers_every_cell() {
    let permits = permits();
    let text = to_csv(&permits);

    let mut reader = csv::ReaderBuilder::new().from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    assert_eq!(headers, SHEET_COLUMNS.map(str::to_string).to_vec());

    let records: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    let expected: Vec<Vec<String>> = permits
        .iter()
        .map(|p| p.sheet_row().map(str::to_string).to_vec())
        .collect();
    assert_eq!(records, expected);
    assert_eq!(
        records[0][6],
        "Inspect welds, then \"blind\" the inlet\nsecond shift continues"
    );
    assert_eq!(records[0][12], "Suspended");
    assert_eq!(records[1][2], "SOF-3542-C Lifting Operation");
}

#[test]
fn export_file_lands_in_target_directory() {
    let dir = tempfile::TempDir::new().unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();

    let path = write_export(dir.path(), "TWS O-16123", &permits(), date).unwrap();

    assert_eq!(
        path.file_name().and_then(std::ffi::OsStr::to_str),
        Some("Permit_Log_TWS O-16123_2024-03-02.csv")
    );
    let mut reader = csv::Reader::from_path(&path).unwrap();
    assert_eq!(reader.records().count(), 2);
}
