use anyhow::Result;
use arrow::array::{ArrayRef, BooleanBuilder, StringBuilder};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rusqlite::Row;
use std::sync::Arc;

use crate::{arrow_schemas, query::result_rows_sql, Db};

const CHUNK: usize = 10_000;

/// Stream hosts joined with their service records into a Parquet file.
/// Returns the number of rows written.
pub fn export_results_to_parquet(db: &Db, anonymous_only: bool, out: &std::path::Path) -> Result<usize> {
    let sql = result_rows_sql(anonymous_only);
    let mut stmt = db.conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let schema = Arc::new(arrow_schemas::results_schema());
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();
    let file = std::fs::File::create(out)?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let mut total = 0;
    loop {
        let mut batch = RowBatch::default();
        while batch.len < CHUNK {
            let Some(row) = rows.next()? else { break };
            batch.push(row)?;
        }
        if batch.len == 0 {
            break;
        }
        total += batch.len;
        let rb = RecordBatch::try_new(schema.clone(), batch.finish())?;
        writer.write(&rb)?;
    }

    writer.close()?;
    Ok(total)
}

#[derive(Default)]
struct RowBatch {
    len: usize,
    ip: StringBuilder,
    discovered_at: StringBuilder,
    available: BooleanBuilder,
    anonymous: BooleanBuilder,
    ftps: BooleanBuilder,
    stream: StringBuilder,
    recorded_at: StringBuilder,
}

impl RowBatch {
    fn push(&mut self, row: &Row) -> Result<()> {
        self.ip.append_value(row.get::<_, String>(0)?);
        self.discovered_at.append_option(row.get::<_, Option<String>>(1)?);
        self.available.append_option(row.get::<_, Option<bool>>(2)?);
        self.anonymous.append_option(row.get::<_, Option<bool>>(3)?);
        self.ftps.append_option(row.get::<_, Option<bool>>(4)?);
        self.stream.append_option(row.get::<_, Option<String>>(5)?);
        self.recorded_at.append_option(row.get::<_, Option<String>>(6)?);
        self.len += 1;
        Ok(())
    }

    fn finish(mut self) -> Vec<ArrayRef> {
        vec![
            Arc::new(self.ip.finish()),
            Arc::new(self.discovered_at.finish()),
            Arc::new(self.available.finish()),
            Arc::new(self.anonymous.finish()),
            Arc::new(self.ftps.finish()),
            Arc::new(self.stream.finish()),
            Arc::new(self.recorded_at.finish()),
        ]
    }
}
