use crate::core::{InsertPlan, Record, RowWriter};
use crate::utils::error::InsertError;
use std::collections::HashSet;

/// Inserts batches whose column list is taken from the first record.
pub struct DynamicInserter<W: RowWriter> {
    writer: W,
}

impl<W: RowWriter> DynamicInserter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Writes `records` into `table` with a single statement.
    ///
    /// An empty batch returns 0 without reaching the writer. Every record must
    /// carry exactly the first record's key set; otherwise nothing is written.
    pub async fn insert(&self, table: &str, records: &[Record]) -> Result<u64, InsertError> {
        let Some(first) = records.first() else {
            tracing::debug!("Nothing to insert into {}", table);
            return Ok(0);
        };

        let columns: Vec<String> = first.keys().map(str::to_string).collect();
        ensure_uniform_columns(&columns, records)?;
        let plan = build_insert_plan(table, &columns)?;

        tracing::debug!(
            "💾 Inserting {} rows into {} ({} columns)",
            records.len(),
            plan.table,
            plan.columns.len()
        );

        self.writer.write(&plan, records).await
    }
}

pub fn quote_identifier(identifier: &str) -> Result<String, InsertError> {
    let reason = if identifier.is_empty() {
        Some("identifier is empty")
    } else if identifier.contains('"') {
        Some("identifier contains a double quote")
    } else if identifier.contains('\0') {
        Some("identifier contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(InsertError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(format!("\"{}\"", identifier)),
    }
}

/// Quotes each part of a possibly schema-qualified table name.
pub fn quote_table_name(table: &str) -> Result<String, InsertError> {
    let parts = table
        .split('.')
        .map(quote_identifier)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| InsertError::InvalidIdentifier {
            identifier: table.to_string(),
            reason: "expected `table` or `schema.table` with non-empty, unquoted parts".to_string(),
        })?;
    Ok(parts.join("."))
}

/// Renders the bulk statement. The whole batch binds as one JSON array (`$1`)
/// and the store coerces each field to the target column's type.
pub fn build_insert_plan(table: &str, columns: &[String]) -> Result<InsertPlan, InsertError> {
    if columns.is_empty() {
        return Err(InsertError::InvalidIdentifier {
            identifier: table.to_string(),
            reason: "first record has no columns".to_string(),
        });
    }

    let qualified = quote_table_name(table)?;
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");

    let statement = format!(
        "INSERT INTO {qualified} ({column_list}) SELECT {column_list} FROM jsonb_populate_recordset(NULL::{qualified}, $1)"
    );

    Ok(InsertPlan {
        table: table.to_string(),
        columns: columns.to_vec(),
        statement,
    })
}

fn ensure_uniform_columns(columns: &[String], records: &[Record]) -> Result<(), InsertError> {
    let expected: HashSet<&str> = columns.iter().map(String::as_str).collect();

    for (row, record) in records.iter().enumerate().skip(1) {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !record.contains_key(c))
            .cloned()
            .collect();
        let unexpected: Vec<String> = record
            .keys()
            .filter(|k| !expected.contains(k))
            .map(str::to_string)
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(InsertError::ColumnMismatch {
                row,
                missing,
                unexpected,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingWriter {
        calls: Arc<Mutex<Vec<(InsertPlan, usize)>>>,
    }

    impl RecordingWriter {
        fn calls(&self) -> Vec<(InsertPlan, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RowWriter for RecordingWriter {
        async fn write(&self, plan: &InsertPlan, records: &[Record]) -> Result<u64, InsertError> {
            self.calls.lock().unwrap().push((plan.clone(), records.len()));
            Ok(records.len() as u64)
        }
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_object(value.as_object().unwrap().clone())
    }

    #[tokio::test]
    async fn test_empty_batch_skips_writer() {
        let writer = RecordingWriter::default();
        let inserter = DynamicInserter::new(writer.clone());

        let rows = inserter.insert("etl.source_1_records", &[]).await.unwrap();

        assert_eq!(rows, 0);
        assert!(writer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_insert_uses_first_record_column_order() {
        let writer = RecordingWriter::default();
        let inserter = DynamicInserter::new(writer.clone());
        let records = vec![
            record(json!({"id": 1, "name": "a", "created_at": "2025-01-05 00:00:00"})),
            record(json!({"created_at": "2025-01-06 00:00:00", "id": 2, "name": "b"})),
        ];

        let rows = inserter.insert("etl.source_2_records", &records).await.unwrap();

        assert_eq!(rows, 2);
        let calls = writer.calls();
        assert_eq!(calls.len(), 1);
        let (plan, count) = &calls[0];
        assert_eq!(*count, 2);
        assert_eq!(plan.columns, vec!["id", "name", "created_at"]);
        assert_eq!(
            plan.statement,
            "INSERT INTO \"etl\".\"source_2_records\" (\"id\", \"name\", \"created_at\") \
             SELECT \"id\", \"name\", \"created_at\" \
             FROM jsonb_populate_recordset(NULL::\"etl\".\"source_2_records\", $1)"
        );
    }

    #[tokio::test]
    async fn test_mismatched_record_rejects_whole_batch() {
        let writer = RecordingWriter::default();
        let inserter = DynamicInserter::new(writer.clone());
        let records = vec![
            record(json!({"id": 1, "name": "a"})),
            record(json!({"id": 2, "name": "b"})),
            record(json!({"id": 3, "title": "c"})),
        ];

        let err = inserter.insert("items", &records).await.unwrap_err();

        match err {
            InsertError::ColumnMismatch {
                row,
                missing,
                unexpected,
            } => {
                assert_eq!(row, 2);
                assert_eq!(missing, vec!["name"]);
                assert_eq!(unexpected, vec!["title"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(writer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_extra_column_is_rejected() {
        let inserter = DynamicInserter::new(RecordingWriter::default());
        let records = vec![record(json!({"id": 1})), record(json!({"id": 2, "extra": true}))];

        let err = inserter.insert("items", &records).await.unwrap_err();
        assert!(matches!(err, InsertError::ColumnMismatch { row: 1, .. }));
    }

    #[test]
    fn test_identifier_validation() {
        assert_eq!(quote_identifier("lineid").unwrap(), "\"lineid\"");
        assert_eq!(quote_table_name("items").unwrap(), "\"items\"");
        assert!(quote_identifier("").is_err());
        assert!(quote_identifier("bad\"name").is_err());
        assert!(quote_table_name("etl.").is_err());
        assert!(quote_table_name("a\"; DROP TABLE x; --").is_err());
    }

    #[test]
    fn test_build_plan_rejects_no_columns() {
        assert!(matches!(
            build_insert_plan("items", &[]),
            Err(InsertError::InvalidIdentifier { .. })
        ));
    }
}
