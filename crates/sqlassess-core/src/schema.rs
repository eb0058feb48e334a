use crate::dataset::{ColumnKind, DecodedColumn, DecoderRegistry, UploadedFile};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Int,
    Decimal,
    Varchar,
}

impl SqlType {
    /// Fixed, total mapping from column kind to SQL type.
    pub fn from_kind(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Int64 => SqlType::Int,
            ColumnKind::Float64 => SqlType::Decimal,
            ColumnKind::Bool | ColumnKind::Object => SqlType::Varchar,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Int => "INT",
            SqlType::Decimal => "DECIMAL(10,2)",
            SqlType::Varchar => "VARCHAR(255)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub inferred_type: SqlType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn infer(table_name: &str, columns: &[DecodedColumn]) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns: columns
                .iter()
                .map(|c| ColumnSchema {
                    name: c.name.clone(),
                    inferred_type: SqlType::from_kind(c.kind),
                })
                .collect(),
        }
    }

    /// CREATE TABLE style text block.
    pub fn render(&self) -> String {
        let body = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.inferred_type.as_sql()))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE {} (\n{}\n);", self.table_name, body)
    }
}

/// Table schemas keyed by table name, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSet {
    tables: Vec<TableSchema>,
}

impl TableSet {
    /// Inserts a schema; a repeated table name replaces the earlier entry in place.
    pub fn insert(&mut self, schema: TableSchema) {
        match self
            .tables
            .iter_mut()
            .find(|t| t.table_name == schema.table_name)
        {
            Some(existing) => *existing = schema,
            None => self.tables.push(schema),
        }
    }

    pub fn get(&self, table_name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.table_name == table_name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.table_name.as_str()).collect()
    }

    /// Concatenated `Table: <name>` blocks for multi-table prompts.
    pub fn render(&self) -> String {
        self.tables
            .iter()
            .map(|t| format!("Table: {}\n{}", t.table_name, t.render()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// Serialized as a name -> CREATE TABLE map that keeps upload order.
impl Serialize for TableSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for t in &self.tables {
            map.serialize_entry(&t.table_name, &t.render())?;
        }
        map.end()
    }
}

/// Runs inference once per file. Files that fail to decode are dropped, not reported.
pub fn infer_batch(files: &[UploadedFile], decoders: &DecoderRegistry) -> TableSet {
    let mut set = TableSet::default();
    for file in files {
        let Some(decoder) = decoders.for_extension(file.extension()) else {
            tracing::warn!(
                event = "schema.file_skipped",
                file = %file.file_name,
                reason = "unsupported extension"
            );
            continue;
        };
        match decoder.decode(&file.bytes) {
            Ok(columns) => set.insert(TableSchema::infer(file.table_name(), &columns)),
            Err(e) => {
                tracing::warn!(
                    event = "schema.file_skipped",
                    file = %file.file_name,
                    error = %e
                );
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, kind: ColumnKind) -> DecodedColumn {
        DecodedColumn {
            name: name.into(),
            kind,
        }
    }

    #[test]
    fn test_type_mapping_is_total() {
        assert_eq!(SqlType::from_kind(ColumnKind::Int64), SqlType::Int);
        assert_eq!(SqlType::from_kind(ColumnKind::Float64), SqlType::Decimal);
        assert_eq!(SqlType::from_kind(ColumnKind::Bool), SqlType::Varchar);
        assert_eq!(SqlType::from_kind(ColumnKind::Object), SqlType::Varchar);
    }

    #[test]
    fn test_render_three_columns() {
        let schema = TableSchema::infer(
            "products",
            &[
                col("id", ColumnKind::Int64),
                col("price", ColumnKind::Float64),
                col("name", ColumnKind::Object),
            ],
        );
        let text = schema.render();
        assert_eq!(
            text,
            "CREATE TABLE products (\n    id INT,\n    price DECIMAL(10,2),\n    name VARCHAR(255)\n);"
        );
        assert!(text.contains("id INT"));
        assert!(text.contains("price DECIMAL(10,2)"));
        assert!(text.contains("name VARCHAR(255)"));
    }

    #[test]
    fn test_batch_skips_undecodable_files() {
        let files = vec![
            UploadedFile::new("orders.csv", "id,total\n1,2.5\n"),
            UploadedFile::new("broken.csv", ""),
            UploadedFile::new("notes.xlsx", "binary"),
            UploadedFile::new("readme.txt", "id\n1\n"),
            UploadedFile::new("customers.csv", "id,name\n1,Ann\n"),
        ];
        let set = infer_batch(&files, &DecoderRegistry::default());
        assert_eq!(set.table_names(), vec!["orders", "customers"]);
        assert_eq!(
            set.get("orders").unwrap().columns[1].inferred_type,
            SqlType::Decimal
        );
    }

    #[test]
    fn test_table_set_serializes_in_upload_order() {
        let mut set = TableSet::default();
        set.insert(TableSchema::infer("zeta", &[col("a", ColumnKind::Int64)]));
        set.insert(TableSchema::infer("alpha", &[col("b", ColumnKind::Object)]));
        set.insert(TableSchema::infer("zeta", &[col("c", ColumnKind::Float64)]));

        let json = serde_json::to_string(&set).unwrap();
        let zeta = json.find("\"zeta\"").unwrap();
        let alpha = json.find("\"alpha\"").unwrap();
        assert!(zeta < alpha);
        assert_eq!(set.len(), 2);
        assert!(set.get("zeta").unwrap().render().contains("c DECIMAL(10,2)"));
        assert!(set.render().starts_with("Table: zeta\nCREATE TABLE zeta"));
    }
}
