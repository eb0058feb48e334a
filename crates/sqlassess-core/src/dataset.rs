use anyhow::Context;
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Primitive kind of a decoded column, as a dataframe library would report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Int64,
    Float64,
    Bool,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// An uploaded file: the original file name plus its raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self { file_name, bytes })
    }

    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or("")
    }

    /// File name without its final extension.
    pub fn table_name(&self) -> &str {
        table_name_from_file_name(&self.file_name)
    }
}

pub fn table_name_from_file_name(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Turns file bytes into ordered column descriptions.
pub trait TabularDecoder: Send + Sync {
    fn supports(&self, extension: &str) -> bool;
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<Vec<DecodedColumn>>;
}

/// Decoders keyed by file extension; the first one that supports it wins.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: Vec<Arc<dyn TabularDecoder>>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self {
            decoders: vec![Arc::new(CsvDecoder), Arc::new(XlsxDecoder)],
        }
    }
}

impl DecoderRegistry {
    pub fn for_extension(&self, extension: &str) -> Option<&dyn TabularDecoder> {
        self.decoders
            .iter()
            .find(|d| d.supports(extension))
            .map(|d| d.as_ref())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvDecoder;

impl TabularDecoder for CsvDecoder {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("csv")
    }

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<Vec<DecodedColumn>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers = reader.headers().context("failed to read csv header")?.clone();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            anyhow::bail!("csv has no header row");
        }

        let mut stats: Vec<KindStats> = vec![KindStats::default(); headers.len()];
        for record in reader.records() {
            let record = record.context("malformed csv record")?;
            for (idx, st) in stats.iter_mut().enumerate() {
                st.observe_text(record.get(idx).unwrap_or(""));
            }
        }

        Ok(columns(headers.iter().map(str::to_string), stats))
    }
}

/// First worksheet of an Excel workbook; the first row holds the column names.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxDecoder;

impl TabularDecoder for XlsxDecoder {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("xlsx")
    }

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<Vec<DecodedColumn>> {
        let mut workbook: Xlsx<_> =
            open_workbook_from_rs(Cursor::new(bytes)).context("failed to open xlsx workbook")?;
        let range = workbook
            .worksheet_range_at(0)
            .context("workbook has no worksheets")?
            .context("failed to read first worksheet")?;

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            anyhow::bail!("first worksheet is empty");
        };
        let names: Vec<String> = header.iter().map(|c| c.to_string()).collect();
        if names.iter().all(|n| n.trim().is_empty()) {
            anyhow::bail!("xlsx has no header row");
        }

        let mut stats: Vec<KindStats> = vec![KindStats::default(); names.len()];
        for row in rows {
            for (idx, st) in stats.iter_mut().enumerate() {
                match row.get(idx) {
                    None | Some(Data::Empty) => st.observe_missing(),
                    Some(Data::Int(_)) => st.observe_int(),
                    Some(Data::Float(f)) if f.is_finite() && f.fract() == 0.0 => st.observe_int(),
                    Some(Data::Float(_)) => st.observe_float(),
                    Some(Data::Bool(_)) => st.observe_bool(),
                    Some(Data::String(text)) if text.trim().is_empty() => st.observe_missing(),
                    // Text, dates and error cells are all objects to a dataframe reader.
                    Some(_) => st.observe_object(),
                }
            }
        }

        Ok(columns(names.into_iter(), stats))
    }
}

fn columns(names: impl Iterator<Item = String>, stats: Vec<KindStats>) -> Vec<DecodedColumn> {
    names
        .zip(stats)
        .map(|(name, st)| DecodedColumn {
            name: name.trim().to_string(),
            kind: st.kind(),
        })
        .collect()
}

#[derive(Debug, Clone)]
struct KindStats {
    values: usize,
    missing: bool,
    all_int: bool,
    all_float: bool,
    all_bool: bool,
}

impl Default for KindStats {
    fn default() -> Self {
        Self {
            values: 0,
            missing: false,
            all_int: true,
            all_float: true,
            all_bool: true,
        }
    }
}

impl KindStats {
    fn observe_missing(&mut self) {
        self.missing = true;
    }

    fn observe_int(&mut self) {
        self.values += 1;
        self.all_bool = false;
    }

    fn observe_float(&mut self) {
        self.values += 1;
        self.all_int = false;
        self.all_bool = false;
    }

    fn observe_bool(&mut self) {
        self.values += 1;
        self.all_int = false;
        self.all_float = false;
    }

    fn observe_object(&mut self) {
        self.values += 1;
        self.all_int = false;
        self.all_float = false;
        self.all_bool = false;
    }

    fn observe_text(&mut self, cell: &str) {
        let cell = cell.trim();
        if cell.is_empty() {
            self.observe_missing();
        } else if cell.parse::<i64>().is_ok() {
            self.observe_int();
        } else if cell.parse::<f64>().is_ok() {
            self.observe_float();
        } else if cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false") {
            self.observe_bool();
        } else {
            self.observe_object();
        }
    }

    // Integers with gaps widen to floats; booleans with gaps fall back to objects.
    fn kind(&self) -> ColumnKind {
        if self.values == 0 {
            ColumnKind::Object
        } else if self.all_int && !self.missing {
            ColumnKind::Int64
        } else if self.all_float {
            ColumnKind::Float64
        } else if self.all_bool && !self.missing {
            ColumnKind::Bool
        } else {
            ColumnKind::Object
        }
    }
}
