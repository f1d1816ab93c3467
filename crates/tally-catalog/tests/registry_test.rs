//! Registry integration tests.
//!
//! End-to-end flows through the public catalog API: registering tables,
//! writing and deleting records, and keeping secondary indexes consistent
//! with the primary index.

use chrono::{TimeZone, Utc};
use tracing_subscriber::EnvFilter;

use tally_catalog::{ColumnDefinition, Registry, Schema};
use tally_common::{DataType, IndexKey, Record, RegistryConfig, TallyError, Value};

// =============================================================================
// Helpers
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ledger_schema() -> Schema {
    Schema::builder()
        .column(ColumnDefinition::new("entry_id", DataType::Integer).primary_key())
        .column(ColumnDefinition::new("account", DataType::String).not_null())
        .column(ColumnDefinition::new("amount", DataType::Double).not_null())
        .column(ColumnDefinition::new("reference", DataType::String).unique())
        .column(ColumnDefinition::new("posted_at", DataType::DateTime))
        .column(ColumnDefinition::new("reconciled", DataType::Boolean))
        .build()
        .unwrap()
}

fn entry(id: i64, account: &str, amount: f64) -> Record {
    let posted_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(id);
    Record::new()
        .with("entry_id", id)
        .with("account", account)
        .with("amount", amount)
        .with("reference", format!("REF-{:05}", id))
        .with("posted_at", posted_at)
        .with("reconciled", id % 2 == 0)
}

/// Every secondary posting points at a live row whose column value matches,
/// and every indexed value of every row has a posting.
fn assert_indexes_consistent(registry: &Registry, table: &str) {
    let table = registry.table(table).unwrap();
    let primary = table.primary_index();
    primary.tree().check_invariants().unwrap();

    for index in table.secondary_indexes() {
        index.tree().check_invariants().unwrap();
    }

    for column in table.schema().columns().iter().map(|c| c.name.as_str()) {
        let Some(index) = table.secondary_index(column) else {
            continue;
        };
        let mut postings = 0;
        for (value, primary_keys) in index.iter() {
            assert!(!primary_keys.is_empty(), "empty posting list for {}", value);
            assert!(primary_keys.windows(2).all(|w| w[0] < w[1]));
            for pk in primary_keys {
                let record = primary.search(pk).expect("posting to missing row");
                assert_eq!(record.value(column), Some(&Value::from(value.clone())));
            }
            postings += primary_keys.len();
        }
        let indexed_rows = primary
            .iter()
            .filter(|(_, record)| record.value(column).is_some())
            .count();
        assert_eq!(postings, indexed_rows, "column {}", column);
    }
}

// =============================================================================
// Flows
// =============================================================================

#[test]
fn test_register_insert_scan_delete() {
    init_tracing();
    let mut registry = Registry::new(RegistryConfig::with_order(4)).unwrap();
    let primary = registry.register_table("ledger", ledger_schema()).unwrap();
    assert_eq!(primary.name(), "pk_ledger");

    for id in (1..=200).rev() {
        let account = ["cash", "sales", "rent"][id as usize % 3];
        registry
            .insert_record("ledger", entry(id, account, id as f64 * 1.5))
            .unwrap();
    }
    assert_eq!(registry.index_size("ledger").unwrap(), 200);
    assert_indexes_consistent(&registry, "ledger");

    let ids: Vec<IndexKey> = registry
        .scan_records("ledger", &IndexKey::Integer(50), &IndexKey::Integer(60))
        .unwrap()
        .map(|(k, _)| k.clone())
        .collect();
    assert_eq!(ids, (50..=60).map(IndexKey::Integer).collect::<Vec<_>>());

    for id in (1..=200).filter(|id| id % 3 == 0) {
        assert!(registry
            .delete_record("ledger", &IndexKey::Integer(id))
            .unwrap()
            .is_some());
    }
    assert_eq!(registry.index_size("ledger").unwrap(), 134);
    assert_indexes_consistent(&registry, "ledger");
}

#[test]
fn test_secondary_index_tracks_writes_after_creation() {
    init_tracing();
    let mut registry = Registry::new(RegistryConfig::with_order(5)).unwrap();
    registry.register_table("ledger", ledger_schema()).unwrap();

    for id in 1..=30 {
        let account = if id % 4 == 0 { "rent" } else { "cash" };
        registry
            .insert_record("ledger", entry(id, account, 10.0))
            .unwrap();
    }
    registry.create_secondary_index("ledger", "account").unwrap();
    registry.create_secondary_index("ledger", "posted_at").unwrap();

    for id in 31..=40 {
        registry
            .insert_record("ledger", entry(id, "rent", 10.0))
            .unwrap();
    }
    for id in [4, 8, 12] {
        registry
            .delete_record("ledger", &IndexKey::Integer(id))
            .unwrap();
    }

    let rent = registry
        .find_by_column("ledger", "account", &Value::from("rent"))
        .unwrap();
    // 4..=28 step 4 minus {4, 8, 12} plus 31..=40.
    assert_eq!(rent.len(), 4 + 10);
    let ids: Vec<&Value> = rent.iter().filter_map(|r| r.value("entry_id")).collect();
    assert!(ids.windows(2).all(|w| match (w[0], w[1]) {
        (Value::Integer(a), Value::Integer(b)) => a < b,
        _ => false,
    }));

    let day = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(35);
    let on_day = registry
        .find_by_column("ledger", "posted_at", &Value::from(day))
        .unwrap();
    assert_eq!(on_day.len(), 1);
    assert_eq!(on_day[0].value("entry_id"), Some(&Value::Integer(35)));

    assert_indexes_consistent(&registry, "ledger");
}

#[test]
fn test_rejected_writes_leave_no_trace() {
    init_tracing();
    let mut registry = Registry::default();
    registry.register_table("ledger", ledger_schema()).unwrap();
    registry
        .insert_record("ledger", entry(1, "cash", 5.0))
        .unwrap();

    // Duplicate reference on a new key.
    let clash = entry(2, "cash", 5.0).with("reference", "REF-00001");
    let err = registry.insert_record("ledger", clash).unwrap_err();
    assert!(err.is_constraint_violation());

    // Wrong type for amount.
    let bad = entry(3, "cash", 0.0).with("amount", 5i64);
    assert!(matches!(
        registry.insert_record("ledger", bad),
        Err(TallyError::TypeMismatch { ref column, .. }) if column == "amount"
    ));

    // Unknown table.
    assert!(registry
        .insert_record("journal", entry(4, "cash", 1.0))
        .unwrap_err()
        .is_not_found());

    assert_eq!(registry.index_size("ledger").unwrap(), 1);
    assert_indexes_consistent(&registry, "ledger");
}

#[test]
fn test_independent_tables() {
    init_tracing();
    let mut registry = Registry::default();
    registry.register_table("ledger", ledger_schema()).unwrap();
    registry.register_table("archive", ledger_schema()).unwrap();

    registry
        .insert_record("ledger", entry(1, "cash", 1.0))
        .unwrap();
    // Same key and same unique reference in a different table.
    registry
        .insert_record("archive", entry(1, "cash", 1.0))
        .unwrap();

    let dropped = registry.drop_table("archive").unwrap();
    assert_eq!(dropped.primary_index().size(), 1);
    assert_eq!(registry.table_names(), vec!["ledger"]);
    assert_eq!(registry.index_size("ledger").unwrap(), 1);
}
