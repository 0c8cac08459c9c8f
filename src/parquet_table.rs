use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use parquet::basic::Compression;
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Utf8(Vec<String>),
    OptionalUtf8(Vec<Option<String>>),
    Int64(Vec<i64>),
    OptionalInt64(Vec<Option<i64>>),
    Double(Vec<f64>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Utf8(v) => v.len(),
            ColumnValues::OptionalUtf8(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::OptionalInt64(v) => v.len(),
            ColumnValues::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn schema_field(&self, name: &str) -> String {
        match self {
            ColumnValues::Utf8(_) => format!("REQUIRED BYTE_ARRAY {name} (UTF8);"),
            ColumnValues::OptionalUtf8(_) => format!("OPTIONAL BYTE_ARRAY {name} (UTF8);"),
            ColumnValues::Int64(_) => format!("REQUIRED INT64 {name};"),
            ColumnValues::OptionalInt64(_) => format!("OPTIONAL INT64 {name};"),
            ColumnValues::Double(_) => format!("REQUIRED DOUBLE {name};"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

/// Column-major table written out as a single Parquet row group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTable {
    columns: Vec<Column>,
}

impl ColumnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, values: ColumnValues) -> Result<()> {
        if !is_valid_column_name(name) {
            return Err(anyhow!("invalid column name `{name}`"));
        }
        if self.columns.iter().any(|c| c.name == name) {
            return Err(anyhow!("duplicate column `{name}`"));
        }
        if let Some(first) = self.columns.first() {
            if first.values.len() != values.len() {
                return Err(anyhow!(
                    "column `{name}` has {} rows, expected {}",
                    values.len(),
                    first.values.len()
                ));
            }
        }
        self.columns.push(Column {
            name: name.to_string(),
            values,
        });
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnValues> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.values)
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    fn message_type(&self) -> String {
        let fields = self
            .columns
            .iter()
            .map(|c| c.values.schema_field(&c.name))
            .collect::<Vec<_>>()
            .join(" ");
        format!("message schema {{ {fields} }}")
    }

    pub fn write_parquet(&self, path: &Path) -> Result<()> {
        if self.columns.is_empty() {
            return Err(anyhow!("refusing to write a table without columns"));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }

        let schema = parse_message_type(&self.message_type()).context("build parquet schema")?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let file =
            File::create(path).with_context(|| format!("create parquet {}", path.display()))?;
        let mut writer = SerializedFileWriter::new(file, Arc::new(schema), Arc::new(props))
            .context("open parquet writer")?;

        let mut row_group = writer.next_row_group().context("start row group")?;
        let mut columns = self.columns.iter();
        while let Some(mut col_writer) = row_group.next_column().context("next column")? {
            let column = columns
                .next()
                .ok_or_else(|| anyhow!("parquet schema has more columns than table"))?;
            write_column(&mut col_writer, &column.values)
                .with_context(|| format!("write column `{}`", column.name))?;
            col_writer.close().context("close column")?;
        }
        row_group.close().context("close row group")?;
        writer.close().context("finish parquet file")?;
        Ok(())
    }
}

fn write_column(
    col_writer: &mut parquet::file::writer::SerializedColumnWriter<'_>,
    values: &ColumnValues,
) -> Result<()> {
    match values {
        ColumnValues::Utf8(values) => {
            let data = values
                .iter()
                .map(|s| ByteArray::from(s.as_str()))
                .collect::<Vec<_>>();
            col_writer
                .typed::<ByteArrayType>()
                .write_batch(&data, None, None)?;
        }
        ColumnValues::OptionalUtf8(values) => {
            let levels = definition_levels(values);
            let data = values
                .iter()
                .flatten()
                .map(|s| ByteArray::from(s.as_str()))
                .collect::<Vec<_>>();
            col_writer
                .typed::<ByteArrayType>()
                .write_batch(&data, Some(&levels), None)?;
        }
        ColumnValues::Int64(values) => {
            col_writer
                .typed::<Int64Type>()
                .write_batch(values, None, None)?;
        }
        ColumnValues::OptionalInt64(values) => {
            let levels = definition_levels(values);
            let data = values.iter().flatten().copied().collect::<Vec<_>>();
            col_writer
                .typed::<Int64Type>()
                .write_batch(&data, Some(&levels), None)?;
        }
        ColumnValues::Double(values) => {
            col_writer
                .typed::<DoubleType>()
                .write_batch(values, None, None)?;
        }
    }
    Ok(())
}

fn definition_levels<T>(values: &[Option<T>]) -> Vec<i16> {
    values
        .iter()
        .map(|v| if v.is_some() { 1 } else { 0 })
        .collect()
}

fn is_valid_column_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
