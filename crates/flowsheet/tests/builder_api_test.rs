//! Integration tests for the ModelBuilder API
//!
//! These tests verify that the public API works and is usable.

use std::fs;

use tempfile::tempdir;

use flowsheet::{
    FlowsheetError, ModelBuilder,
    config::{AppConfig, ResolveSettings, TablesConfig},
    diagnostics::ErrorCode,
    element::{Element, Tag, attr},
    fragment::{read_fragment, write_fragment},
    tables::{Table, TableSet},
};

fn field(name: &str) -> Element {
    Element::named(Tag::Field, name).with_child(
        Element::new(Tag::Stream)
            .with_attr(attr::SRC, "Well")
            .with_attr(attr::DST, "Separator"),
    )
}

fn cell(row: &str, col: &str, value: &str) -> Element {
    Element::new(Tag::Cell)
        .with_attr(attr::ROW, row)
        .with_attr(attr::COL, col)
        .with_text(value)
}

fn config_with_tables(known: &[&str]) -> AppConfig {
    AppConfig::new(
        ResolveSettings::default(),
        TablesConfig::new(known.iter().map(|name| name.to_string()).collect()),
    )
}

#[test]
fn test_builder_api_exists() {
    let _builder = ModelBuilder::default();
}

#[test]
fn test_build_simple_model() {
    let builder = ModelBuilder::default();
    let result = builder.build(vec![Element::new(Tag::Model).with_child(field("R1"))]);
    assert!(result.is_ok(), "Should resolve valid model: {:?}", result.err());

    let session = result.expect("checked above");
    assert!(session.is_valid());
    assert!(session.ensure_valid().is_ok());
    assert!(session.resolution().graph("R1").is_some());
}

#[test]
fn test_fatal_error_is_returned() {
    let builder = ModelBuilder::default();
    let result = builder.build(vec![Element::new(Tag::Field)]);
    match result {
        Err(FlowsheetError::Resolve(err)) => {
            assert_eq!(err.diagnostics()[0].code(), Some(ErrorCode::E100));
        }
        other => panic!("Expected a resolve error, got {other:?}"),
    }
}

#[test]
fn test_table_updates_use_known_tables() {
    let model = Element::new(Tag::Model)
        .with_child(field("R1"))
        .with_child(
            Element::named(Tag::TableUpdate, "venting")
                .with_child(cell("R1", "fraction", "0.1"))
                .with_child(cell("R1", "fraction", "0.2")),
        )
        .with_child(Element::named(Tag::TableUpdate, "unlisted").with_child(cell("a", "b", "c")));

    let session = ModelBuilder::new(config_with_tables(&["venting"]))
        .build(vec![model])
        .expect("resolves");

    let venting = session.tables().get("venting").expect("known table");
    assert_eq!(venting.get("R1", "fraction"), Some("0.2"));

    assert!(!session.is_valid());
    let codes: Vec<_> = session.diagnostics().iter().filter_map(|d| d.code()).collect();
    assert_eq!(codes, [ErrorCode::E400]);
    assert!(session.resolution().is_valid());
    assert!(matches!(
        session.ensure_valid(),
        Err(FlowsheetError::Resolve(_))
    ));
}

#[test]
fn test_programmatic_tables_keep_existing_entries() {
    let mut factors = Table::new("factors");
    flowsheet::tables::apply_cells(
        &mut factors,
        [
            flowsheet::tables::Cell::new("gas", "CO2", "1.0"),
            flowsheet::tables::Cell::new("oil", "CO2", "3.0"),
        ],
    );
    let mut tables = TableSet::new();
    tables.insert(factors);

    let model = Element::new(Tag::Model)
        .with_child(field("R1"))
        .with_child(Element::named(Tag::TableUpdate, "factors").with_child(cell("gas", "CO2", "1.5")));

    let session = ModelBuilder::default()
        .with_tables(tables)
        .build(vec![model])
        .expect("resolves");
    let factors = session.tables().get("factors").expect("table");
    assert_eq!(factors.get("gas", "CO2"), Some("1.5"));
    assert_eq!(factors.get("oil", "CO2"), Some("3.0"));
    assert!(session.is_valid());
}

#[test]
fn test_builder_reusability() {
    let builder = ModelBuilder::default();
    let first = builder
        .build(vec![Element::new(Tag::Model).with_child(field("R1"))])
        .expect("first");
    let second = builder
        .build(vec![Element::new(Tag::Model).with_child(field("R2"))])
        .expect("second");

    assert!(first.resolution().graph("R1").is_some());
    assert!(second.resolution().graph("R1").is_none());
    assert!(second.resolution().graph("R2").is_some());
}

#[test]
fn test_fragment_files_roundtrip() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("base.json");
    let model = Element::new(Tag::Model).with_child(field("R1"));

    write_fragment(&path, &model).expect("write");
    assert_eq!(read_fragment(&path).expect("read"), model);

    fs::write(&path, "[]").expect("overwrite");
    assert!(matches!(
        read_fragment(&path),
        Err(FlowsheetError::Decode { .. })
    ));
    assert!(matches!(
        read_fragment(dir.path().join("missing.json")),
        Err(FlowsheetError::Io(_))
    ));
}
