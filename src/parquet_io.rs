use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use parquet::basic::{ConvertedType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::Field;
use parquet::schema::types::Type;
use tracing::info;

use crate::table::{Column, Table};

/// Writes `table` as a single row group. Numeric columns are optional doubles, text columns
/// optional UTF-8 byte arrays. The file is swapped in atomically.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    if table.n_cols() == 0 {
        return Err(anyhow!("refusing to write {} with no columns", path.display()));
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }

    let mut fields = Vec::with_capacity(table.n_cols());
    for (name, col) in table.columns() {
        let field = match col {
            Column::Num(_) => Type::primitive_type_builder(name, PhysicalType::DOUBLE)
                .with_repetition(Repetition::OPTIONAL)
                .build(),
            Column::Text(_) => Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
                .with_repetition(Repetition::OPTIONAL)
                .with_converted_type(ConvertedType::UTF8)
                .build(),
        }
        .with_context(|| format!("schema for column {name}"))?;
        fields.push(Arc::new(field));
    }
    let schema = Arc::new(
        Type::group_type_builder("schema")
            .with_fields(fields)
            .build()
            .context("build parquet schema")?,
    );

    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    let props = Arc::new(WriterProperties::builder().build());
    let mut writer =
        SerializedFileWriter::new(file, schema, props).context("open parquet writer")?;
    let mut row_group = writer.next_row_group().context("open row group")?;

    for (name, col) in table.columns() {
        let Some(mut col_writer) = row_group
            .next_column()
            .with_context(|| format!("next column {name}"))?
        else {
            return Err(anyhow!("parquet writer ran out of columns at {name}"));
        };
        match col {
            Column::Num(values) => {
                let present = values.iter().flatten().copied().collect::<Vec<f64>>();
                let defs = definition_levels(values);
                col_writer
                    .typed::<DoubleType>()
                    .write_batch(&present, Some(&defs), None)
                    .with_context(|| format!("write column {name}"))?;
            }
            Column::Text(values) => {
                let present = values
                    .iter()
                    .flatten()
                    .map(|s| ByteArray::from(s.as_str()))
                    .collect::<Vec<_>>();
                let defs = definition_levels(values);
                col_writer
                    .typed::<ByteArrayType>()
                    .write_batch(&present, Some(&defs), None)
                    .with_context(|| format!("write column {name}"))?;
            }
        }
        col_writer
            .close()
            .with_context(|| format!("close column {name}"))?;
    }
    row_group.close().context("close row group")?;
    writer.close().context("close parquet writer")?;

    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    info!(
        "wrote {} ({} rows x {} cols)",
        path.display(),
        table.n_rows(),
        table.n_cols()
    );
    Ok(())
}

fn definition_levels<T>(values: &[Option<T>]) -> Vec<i16> {
    values.iter().map(|v| i16::from(v.is_some())).collect()
}

pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("open parquet reader")?;
    let descr = reader.metadata().file_metadata().schema_descr_ptr();
    let mut columns = descr
        .columns()
        .iter()
        .map(|c| {
            let col = if c.physical_type() == PhysicalType::BYTE_ARRAY {
                Column::Text(Vec::new())
            } else {
                Column::Num(Vec::new())
            };
            (c.name().to_string(), col)
        })
        .collect::<Vec<_>>();

    let iter = reader.get_row_iter(None).context("iterate rows")?;
    for row in iter {
        let row = row.with_context(|| format!("decode row of {}", path.display()))?;
        for (idx, (_, field)) in row.get_column_iter().enumerate() {
            let Some((_, col)) = columns.get_mut(idx) else {
                continue;
            };
            match col {
                Column::Num(v) => v.push(read_num(field)),
                Column::Text(v) => v.push(read_text(field)),
            }
        }
    }

    let mut table = Table::new();
    for (name, col) in columns {
        table.push_column(name, col)?;
    }
    Ok(table)
}

fn read_num(field: &Field) -> Option<f64> {
    match field {
        Field::Double(x) => Some(*x),
        Field::Float(x) => Some(f64::from(*x)),
        Field::Long(x) => Some(*x as f64),
        Field::Int(x) => Some(f64::from(*x)),
        Field::Short(x) => Some(f64::from(*x)),
        Field::Byte(x) => Some(f64::from(*x)),
        Field::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn read_text(field: &Field) -> Option<String> {
    match field {
        Field::Str(s) => Some(s.clone()),
        Field::Null => None,
        Field::Bytes(b) => b.as_utf8().ok().map(str::to_string),
        other => Some(other.to_string()),
    }
}
