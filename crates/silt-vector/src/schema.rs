use std::sync::Arc;

use arrow_schema::{DataType, Field, Fields, Schema};

/// Table schema: one row per document. `metadata` is stored as a JSON
/// string column rather than a nested struct so arbitrary caller-supplied
/// keys don't require a schema migration.
pub fn document_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(Fields::from(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Int64, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim,
            ),
            false,
        ),
    ])))
}
