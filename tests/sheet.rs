use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use rust_xlsxwriter::Workbook;

use part_sourcing::domain::IdentifierColumn;
use part_sourcing::error::SourcingError;
use part_sourcing::sheet::{CellValue, read_identifiers, write_rows};

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn missing_file_is_input_not_found() {
    let (_temp, root) = temp_root();
    let err = read_identifiers(&root.join("absent.xlsx"), &IdentifierColumn::First).unwrap_err();
    assert_matches!(err, SourcingError::InputNotFound(_));
    assert!(err.is_input_error());
}

#[test]
fn header_only_is_empty_input() {
    let (_temp, root) = temp_root();
    let path = root.join("header.xlsx");
    write_rows(&path, &["MPN"], &[]).unwrap();
    let err = read_identifiers(&path, &IdentifierColumn::First).unwrap_err();
    assert_matches!(err, SourcingError::EmptyInput(_));
}

#[test]
fn only_blank_identifiers_is_empty_input() {
    let (_temp, root) = temp_root();
    let path = root.join("blank.xlsx");
    let rows = vec![
        vec![CellValue::Empty, CellValue::from("note")],
        vec![CellValue::from("   "), CellValue::from("note")],
    ];
    write_rows(&path, &["MPN", "Comment"], &rows).unwrap();
    let err = read_identifiers(&path, &IdentifierColumn::First).unwrap_err();
    assert_matches!(err, SourcingError::EmptyInput(_));
}

#[test]
fn not_a_workbook_is_malformed() {
    let (_temp, root) = temp_root();
    let path = root.join("notes.xlsx");
    std::fs::write(path.as_std_path(), b"MPN\nABC123\n").unwrap();
    let err = read_identifiers(&path, &IdentifierColumn::First).unwrap_err();
    assert_matches!(err, SourcingError::MalformedInput(_));
}

#[test]
fn named_column_is_located_by_header() {
    let (_temp, root) = temp_root();
    let path = root.join("named.xlsx");
    let rows = vec![
        vec![CellValue::from("1"), CellValue::from("LM358DR")],
        vec![CellValue::from("2"), CellValue::from("NE555P")],
    ];
    write_rows(&path, &["#", "mpn"], &rows).unwrap();
    let ids = read_identifiers(&path, &IdentifierColumn::Named("mpn".to_string())).unwrap();
    assert_eq!(ids, vec!["LM358DR", "NE555P"]);

    let err = read_identifiers(&path, &IdentifierColumn::Named("part".to_string())).unwrap_err();
    assert_matches!(err, SourcingError::MalformedInput(message) if message.contains("'part'"));
}

#[test]
fn numeric_identifiers_are_read_as_text() {
    let (_temp, root) = temp_root();
    let path = root.join("numeric.xlsx");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "MPN").unwrap();
    sheet.write_number(1, 0, 74139.0).unwrap();
    sheet.write_string(2, 0, "SN74HC00N").unwrap();
    workbook.save(path.as_std_path()).unwrap();

    let ids = read_identifiers(&path, &IdentifierColumn::First).unwrap();
    assert_eq!(ids, vec!["74139", "SN74HC00N"]);
}
