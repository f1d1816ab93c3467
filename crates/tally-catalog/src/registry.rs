//! Table registry: maps table names to their schema and indexes.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tally_common::{IndexKey, Record, RegistryConfig, Result, TallyError, TreeConfig, Value};
use tally_storage::{Index, RangeScan};
use tracing::{debug, info};

use crate::column::ColumnDefinition;
use crate::schema::Schema;

/// Primary index of a table: primary key -> full record.
pub type PrimaryIndex = Index<IndexKey, Record>;

/// Secondary index over one column: column value -> primary keys (ascending).
pub type SecondaryIndex = Index<IndexKey, Vec<IndexKey>>;

/// A registered table and the indexes it owns.
///
/// Indexes are created with the table (or later through
/// [`Registry::create_secondary_index`]) and are dropped with it.
#[derive(Debug)]
pub struct TableEntry {
    name: String,
    schema: Schema,
    primary: PrimaryIndex,
    /// Secondary indexes keyed by column name.
    secondary: BTreeMap<String, SecondaryIndex>,
}

impl TableEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn primary_index(&self) -> &PrimaryIndex {
        &self.primary
    }

    pub fn secondary_index(&self, column: &str) -> Option<&SecondaryIndex> {
        self.secondary.get(column)
    }

    pub fn secondary_indexes(&self) -> impl Iterator<Item = &SecondaryIndex> {
        self.secondary.values()
    }

    /// Number of rows in the table.
    pub fn len(&self) -> usize {
        self.primary.size()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.size() == 0
    }
}

/// Catalog of tables for one process.
///
/// Construct one registry at startup and hand out references to it. All
/// mutating operations take `&mut self`; callers sharing a registry across
/// threads must serialize access themselves (e.g. behind a `Mutex`).
#[derive(Debug)]
pub struct Registry {
    config: RegistryConfig,
    tables: HashMap<String, TableEntry>,
}

impl Registry {
    /// Creates an empty registry after validating `config`.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tables: HashMap::new(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Registered table names in ascending order.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    // =========================================================================
    // Table Lifecycle
    // =========================================================================

    /// Registers a table and returns its (empty) primary index.
    ///
    /// Non-key columns declared `unique` get a secondary index right away so
    /// that uniqueness is enforced from the first insert.
    pub fn register_table(&mut self, name: impl Into<String>, schema: Schema) -> Result<&PrimaryIndex> {
        let name = name.into();
        if name.is_empty() {
            return Err(TallyError::MissingArgument("table name"));
        }

        let slot = match self.tables.entry(name) {
            Entry::Occupied(occupied) => {
                debug!(table = %occupied.key(), "rejected duplicate table registration");
                return Err(TallyError::TableAlreadyExists(occupied.key().clone()));
            }
            Entry::Vacant(vacant) => vacant,
        };

        let name = slot.key().clone();
        let primary = Index::primary(format!("pk_{}", name), &self.config.primary_index)?;
        let mut secondary = BTreeMap::new();
        for column in schema.columns().iter().filter(|c| c.unique && !c.primary_key) {
            let index = Index::secondary(
                secondary_index_name(&name, &column.name),
                &self.config.secondary_index,
            )?;
            secondary.insert(column.name.clone(), index);
        }

        info!(
            table = %name,
            primary_key = schema.primary_key_column_name(),
            columns = schema.len(),
            secondary_indexes = secondary.len(),
            "registered table"
        );

        let entry = slot.insert(TableEntry {
            name,
            schema,
            primary,
            secondary,
        });
        Ok(&entry.primary)
    }

    /// Removes a table together with all of its indexes.
    pub fn drop_table(&mut self, name: &str) -> Result<TableEntry> {
        let entry = self
            .tables
            .remove(name)
            .ok_or_else(|| TallyError::TableNotFound(name.to_string()))?;
        info!(table = %name, rows = entry.len(), "dropped table");
        Ok(entry)
    }

    pub fn table(&self, name: &str) -> Result<&TableEntry> {
        if name.is_empty() {
            return Err(TallyError::MissingArgument("table name"));
        }
        self.tables
            .get(name)
            .ok_or_else(|| TallyError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableEntry> {
        if name.is_empty() {
            return Err(TallyError::MissingArgument("table name"));
        }
        self.tables
            .get_mut(name)
            .ok_or_else(|| TallyError::TableNotFound(name.to_string()))
    }

    pub fn schema(&self, table: &str) -> Result<&Schema> {
        Ok(&self.table(table)?.schema)
    }

    /// Number of entries in the table's primary index.
    pub fn index_size(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.primary.size())
    }

    /// Creates a secondary index on `column`, filled from the rows already
    /// present.
    ///
    /// Fails if the column already has an index (the primary-key column always
    /// does), or if the column is unique and existing rows share a value.
    pub fn create_secondary_index(&mut self, table: &str, column: &str) -> Result<&SecondaryIndex> {
        let config = self.config.secondary_index;
        let entry = self.table_mut(table)?;
        let definition = entry.schema.get_column(column)?;

        if definition.primary_key || entry.secondary.contains_key(column) {
            return Err(TallyError::IndexAlreadyExists {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        let index = backfill_secondary_index(&entry.name, definition, &entry.primary, &config)?;
        info!(
            table = %table,
            column = %column,
            entries = index.size(),
            "created secondary index"
        );
        Ok(entry.secondary.entry(column.to_string()).or_insert(index))
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Validates and inserts a record into the table's primary index and all
    /// of its secondary indexes.
    ///
    /// Every check (schema, primary-key uniqueness, unique columns) runs
    /// before the first index is touched, so a failed insert leaves no trace.
    pub fn insert_record(&mut self, table: &str, record: Record) -> Result<()> {
        let entry = self.table_mut(table)?;

        if let Err(err) = entry.schema.validate_record(&record) {
            debug!(table = %table, error = %err, "rejected invalid record");
            return Err(err);
        }

        let primary_key = entry.schema.primary_key_of(&record)?;
        if entry.primary.contains_key(&primary_key) {
            debug!(table = %table, key = %primary_key, "rejected duplicate primary key");
            return Err(TallyError::DuplicateKey);
        }

        // Secondary keys in the same order as `entry.secondary`.
        let mut secondary_keys = Vec::with_capacity(entry.secondary.len());
        for (column, index) in &entry.secondary {
            let key = match record.value(column) {
                Some(value) => Some(IndexKey::try_from(value)?),
                None => None,
            };
            if let Some(key) = &key {
                if entry.schema.get_column(column)?.unique && index.contains_key(key) {
                    debug!(table = %table, column = %column, key = %key, "rejected unique violation");
                    return Err(TallyError::UniqueViolation {
                        column: column.clone(),
                    });
                }
            }
            secondary_keys.push(key);
        }

        if !entry.primary.insert(primary_key.clone(), record) {
            return Err(TallyError::DuplicateKey);
        }
        for (index, key) in entry.secondary.values_mut().zip(secondary_keys) {
            if let Some(key) = key {
                add_posting(index, key, primary_key.clone());
            }
        }
        Ok(())
    }

    /// Looks up a record by primary key. `Ok(None)` if no such row exists.
    pub fn get_record(&self, table: &str, key: &IndexKey) -> Result<Option<&Record>> {
        Ok(self.table(table)?.primary.search(key))
    }

    /// Deletes a record by primary key and unlinks it from every secondary
    /// index. `Ok(None)` if no such row exists.
    pub fn delete_record(&mut self, table: &str, key: &IndexKey) -> Result<Option<Record>> {
        let entry = self.table_mut(table)?;
        let Some(record) = entry.primary.remove(key) else {
            return Ok(None);
        };

        for (column, index) in entry.secondary.iter_mut() {
            if let Some(value) = record.value(column) {
                remove_posting(index, &IndexKey::try_from(value)?, key);
            }
        }
        Ok(Some(record))
    }

    /// Scans rows with `low <= primary key <= high` in key order.
    pub fn scan_records(
        &self,
        table: &str,
        low: &IndexKey,
        high: &IndexKey,
    ) -> Result<RangeScan<'_, IndexKey, Record>> {
        Ok(self.table(table)?.primary.range_scan(low, high))
    }

    /// Finds rows whose `column` equals `value`, ordered by primary key.
    ///
    /// Uses the primary index for the key column and a secondary index
    /// otherwise; a non-key column without an index is `IndexNotFound`.
    pub fn find_by_column(&self, table: &str, column: &str, value: &Value) -> Result<Vec<&Record>> {
        let entry = self.table(table)?;
        let definition = entry.schema.get_column(column)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let key = IndexKey::try_from(value)?;

        if definition.primary_key {
            return Ok(entry.primary.search(&key).into_iter().collect());
        }

        let index = entry
            .secondary
            .get(column)
            .ok_or_else(|| TallyError::IndexNotFound(secondary_index_name(table, column)))?;
        Ok(index
            .search(&key)
            .map(|primary_keys| {
                primary_keys
                    .iter()
                    .filter_map(|pk| entry.primary.search(pk))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            config: RegistryConfig::default(),
            tables: HashMap::new(),
        }
    }
}

fn secondary_index_name(table: &str, column: &str) -> String {
    format!("ix_{}_{}", table, column)
}

/// Builds a secondary index over `column` from the rows of `primary`.
fn backfill_secondary_index(
    table: &str,
    column: &ColumnDefinition,
    primary: &PrimaryIndex,
    config: &TreeConfig,
) -> Result<SecondaryIndex> {
    let mut index = Index::secondary(secondary_index_name(table, &column.name), config)?;
    for (primary_key, record) in primary.iter() {
        let Some(value) = record.value(&column.name) else {
            continue;
        };
        let key = IndexKey::try_from(value)?;
        if column.unique && index.contains_key(&key) {
            debug!(table = %table, column = %column.name, key = %key, "existing rows violate unique index");
            return Err(TallyError::UniqueViolation {
                column: column.name.clone(),
            });
        }
        add_posting(&mut index, key, primary_key.clone());
    }
    Ok(index)
}

/// Adds `primary_key` to the posting list of `key`, keeping it sorted.
fn add_posting(index: &mut SecondaryIndex, key: IndexKey, primary_key: IndexKey) {
    if let Some(postings) = index.search_mut(&key) {
        if let Err(pos) = postings.binary_search(&primary_key) {
            postings.insert(pos, primary_key);
        }
        return;
    }
    let inserted = index.insert(key, vec![primary_key]);
    debug_assert!(inserted, "posting list vanished between lookup and insert");
}

/// Removes `primary_key` from the posting list of `key`; empty lists are
/// removed from the index.
fn remove_posting(index: &mut SecondaryIndex, key: &IndexKey, primary_key: &IndexKey) {
    let now_empty = match index.search_mut(key) {
        Some(postings) => {
            if let Ok(pos) = postings.binary_search(primary_key) {
                postings.remove(pos);
            }
            postings.is_empty()
        }
        None => false,
    };
    if now_empty {
        index.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_common::{DataType, ErrorKind};

    fn account_schema() -> Schema {
        Schema::builder()
            .column(ColumnDefinition::new("id", DataType::Integer).primary_key())
            .column(ColumnDefinition::new("owner", DataType::String).not_null())
            .column(ColumnDefinition::new("iban", DataType::String).unique())
            .column(ColumnDefinition::new("balance", DataType::Double))
            .build()
            .unwrap()
    }

    fn account(id: i64, owner: &str, iban: Option<&str>) -> Record {
        Record::new()
            .with("id", id)
            .with("owner", owner)
            .with("iban", iban)
            .with("balance", 0.0)
    }

    fn registry() -> Registry {
        let mut registry = Registry::new(RegistryConfig::with_order(4)).unwrap();
        registry.register_table("accounts", account_schema()).unwrap();
        registry
    }

    #[test]
    fn test_register_table_returns_empty_primary_index() {
        let mut registry = Registry::default();
        let index = registry.register_table("accounts", account_schema()).unwrap();
        assert_eq!(index.name(), "pk_accounts");
        assert!(index.is_primary());
        assert_eq!(index.size(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_scenario_duplicate_table_registration() {
        let mut registry = registry();
        let err = registry
            .register_table("accounts", account_schema())
            .unwrap_err();
        assert!(matches!(err, TallyError::TableAlreadyExists(ref t) if t == "accounts"));
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_empty_name_rejected() {
        let mut registry = Registry::default();
        let err = registry.register_table("", account_schema()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(Registry::new(RegistryConfig::with_order(2)).is_err());
    }

    #[test]
    fn test_unique_column_gets_index_on_registration() {
        let registry = registry();
        let table = registry.table("accounts").unwrap();
        let index = table.secondary_index("iban").unwrap();
        assert_eq!(index.name(), "ix_accounts_iban");
        assert!(!index.is_primary());
        assert!(table.secondary_index("owner").is_none());
    }

    #[test]
    fn test_insert_and_get_record() {
        let mut registry = registry();
        registry
            .insert_record("accounts", account(1, "alice", Some("DE01")))
            .unwrap();
        let record = registry
            .get_record("accounts", &IndexKey::Integer(1))
            .unwrap()
            .unwrap();
        assert_eq!(record.value("owner"), Some(&Value::from("alice")));
        assert_eq!(registry.index_size("accounts").unwrap(), 1);
        assert!(registry
            .get_record("accounts", &IndexKey::Integer(2))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_insert_invalid_record_touches_nothing() {
        let mut registry = registry();
        let err = registry
            .insert_record("accounts", Record::new().with("id", 1i64))
            .unwrap_err();
        assert!(matches!(err, TallyError::NullNotAllowed { .. }));
        assert_eq!(registry.index_size("accounts").unwrap(), 0);
    }

    #[test]
    fn test_insert_with_unknown_column_is_constraint_violation() {
        let mut registry = registry();
        let record = account(1, "alice", None).with("extra", true);
        let err = registry.insert_record("accounts", record).unwrap_err();
        assert!(matches!(err, TallyError::UnknownColumn { ref column } if column == "extra"));
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert!(!err.is_not_found());
        assert_eq!(registry.index_size("accounts").unwrap(), 0);
    }

    #[test]
    fn test_duplicate_primary_key_leaves_secondaries_untouched() {
        let mut registry = registry();
        registry
            .insert_record("accounts", account(1, "alice", Some("DE01")))
            .unwrap();
        let err = registry
            .insert_record("accounts", account(1, "bob", Some("DE02")))
            .unwrap_err();
        assert!(matches!(err, TallyError::DuplicateKey));

        let table = registry.table("accounts").unwrap();
        assert_eq!(table.len(), 1);
        let iban = table.secondary_index("iban").unwrap();
        assert_eq!(iban.size(), 1);
        assert!(iban.search(&IndexKey::from("DE02")).is_none());
    }

    #[test]
    fn test_unique_violation_rejected_before_mutation() {
        let mut registry = registry();
        registry
            .insert_record("accounts", account(1, "alice", Some("DE01")))
            .unwrap();
        let err = registry
            .insert_record("accounts", account(2, "bob", Some("DE01")))
            .unwrap_err();
        assert!(matches!(err, TallyError::UniqueViolation { ref column } if column == "iban"));
        assert_eq!(registry.index_size("accounts").unwrap(), 1);
    }

    #[test]
    fn test_null_unique_values_do_not_collide() {
        let mut registry = registry();
        registry.insert_record("accounts", account(1, "alice", None)).unwrap();
        registry.insert_record("accounts", account(2, "bob", None)).unwrap();
        let table = registry.table("accounts").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.secondary_index("iban").unwrap().size(), 0);
    }

    #[test]
    fn test_secondary_index_backfill_and_lookup() {
        let mut registry = registry();
        for (id, owner) in [(1, "alice"), (2, "bob"), (3, "alice"), (4, "carol")] {
            registry
                .insert_record("accounts", account(id, owner, None))
                .unwrap();
        }

        let index = registry.create_secondary_index("accounts", "owner").unwrap();
        assert_eq!(index.size(), 3);
        assert_eq!(
            index.search(&IndexKey::from("alice")),
            Some(&vec![IndexKey::Integer(1), IndexKey::Integer(3)])
        );

        registry
            .insert_record("accounts", account(5, "alice", None))
            .unwrap();
        let ids: Vec<&Value> = registry
            .find_by_column("accounts", "owner", &Value::from("alice"))
            .unwrap()
            .into_iter()
            .filter_map(|r| r.value("id"))
            .collect();
        assert_eq!(ids, vec![&Value::Integer(1), &Value::Integer(3), &Value::Integer(5)]);
    }

    #[test]
    fn test_create_secondary_index_errors() {
        let mut registry = registry();
        assert!(matches!(
            registry.create_secondary_index("missing", "owner"),
            Err(TallyError::TableNotFound(_))
        ));
        assert!(matches!(
            registry.create_secondary_index("accounts", "missing"),
            Err(TallyError::ColumnNotFound(_))
        ));
        assert!(matches!(
            registry.create_secondary_index("accounts", "iban"),
            Err(TallyError::IndexAlreadyExists { .. })
        ));
        assert!(matches!(
            registry.create_secondary_index("accounts", "id"),
            Err(TallyError::IndexAlreadyExists { .. })
        ));

        registry.create_secondary_index("accounts", "owner").unwrap();
        assert!(matches!(
            registry.create_secondary_index("accounts", "owner"),
            Err(TallyError::IndexAlreadyExists { .. })
        ));
    }

    #[test]
    fn test_backfill_non_unique_column_with_shared_values() {
        let schema = Schema::builder()
            .column(ColumnDefinition::new("id", DataType::Integer).primary_key())
            .column(ColumnDefinition::new("email", DataType::String))
            .build()
            .unwrap();
        let mut registry = Registry::default();
        registry.register_table("users", schema).unwrap();
        for id in 1..=2i64 {
            registry
                .insert_record("users", Record::new().with("id", id).with("email", "same@x"))
                .unwrap();
        }
        let index = registry.create_secondary_index("users", "email").unwrap();
        assert_eq!(index.search(&IndexKey::from("same@x")).map(Vec::len), Some(2));
    }

    #[test]
    fn test_delete_record_unlinks_secondaries() {
        let mut registry = registry();
        registry
            .insert_record("accounts", account(1, "alice", Some("DE01")))
            .unwrap();
        registry
            .insert_record("accounts", account(2, "alice", Some("DE02")))
            .unwrap();
        registry.create_secondary_index("accounts", "owner").unwrap();

        let removed = registry
            .delete_record("accounts", &IndexKey::Integer(1))
            .unwrap()
            .unwrap();
        assert_eq!(removed.value("iban"), Some(&Value::from("DE01")));

        let table = registry.table("accounts").unwrap();
        assert!(table.secondary_index("iban").unwrap().search(&IndexKey::from("DE01")).is_none());
        assert_eq!(
            table.secondary_index("owner").unwrap().search(&IndexKey::from("alice")),
            Some(&vec![IndexKey::Integer(2)])
        );

        // IBAN is free again.
        registry
            .insert_record("accounts", account(3, "dave", Some("DE01")))
            .unwrap();
        assert!(registry
            .delete_record("accounts", &IndexKey::Integer(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scan_records() {
        let mut registry = registry();
        for id in [5, 1, 9, 3, 7] {
            registry
                .insert_record("accounts", account(id, "x", None))
                .unwrap();
        }
        let ids: Vec<IndexKey> = registry
            .scan_records("accounts", &IndexKey::Integer(3), &IndexKey::Integer(7))
            .unwrap()
            .map(|(k, _)| k.clone())
            .collect();
        assert_eq!(
            ids,
            vec![IndexKey::Integer(3), IndexKey::Integer(5), IndexKey::Integer(7)]
        );
    }

    #[test]
    fn test_find_by_column() {
        let mut registry = registry();
        registry
            .insert_record("accounts", account(1, "alice", Some("DE01")))
            .unwrap();

        let by_pk = registry
            .find_by_column("accounts", "id", &Value::Integer(1))
            .unwrap();
        assert_eq!(by_pk.len(), 1);

        let by_iban = registry
            .find_by_column("accounts", "iban", &Value::from("DE01"))
            .unwrap();
        assert_eq!(by_iban.len(), 1);

        assert!(registry
            .find_by_column("accounts", "iban", &Value::Null)
            .unwrap()
            .is_empty());
        assert!(matches!(
            registry.find_by_column("accounts", "owner", &Value::from("alice")),
            Err(TallyError::IndexNotFound(ref name)) if name == "ix_accounts_owner"
        ));
        assert!(matches!(
            registry.find_by_column("accounts", "nope", &Value::from("alice")),
            Err(TallyError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_drop_table() {
        let mut registry = registry();
        registry
            .insert_record("accounts", account(1, "alice", None))
            .unwrap();
        let dropped = registry.drop_table("accounts").unwrap();
        assert_eq!(dropped.name(), "accounts");
        assert_eq!(dropped.len(), 1);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.table("accounts"),
            Err(TallyError::TableNotFound(_))
        ));
        assert!(registry.drop_table("accounts").unwrap_err().is_not_found());

        // The name can be reused once dropped.
        registry.register_table("accounts", account_schema()).unwrap();
    }

    #[test]
    fn test_table_names_sorted() {
        let mut registry = registry();
        registry.register_table("transactions", account_schema()).unwrap();
        registry.register_table("users", account_schema()).unwrap();
        assert_eq!(
            registry.table_names(),
            vec!["accounts", "transactions", "users"]
        );
    }

    #[test]
    fn test_registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
