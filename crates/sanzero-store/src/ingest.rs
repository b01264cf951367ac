//! Parquet import and export for precedent records.
//!
//! Ingestion writes precedents in the schema from
//! [`sanzero_core::precedents`]; rows whose `embedding` is still null are
//! skipped on load and counted so the caller can report them.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, LargeStringArray,
    StringArray,
};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sanzero_core::precedents as cols;
use sanzero_core::{DisabilityGrade, Precedent, PrecedentMetadata};
use tracing::{info, warn};

use crate::{PrecedentStore, StoreError};

/// Quality assumed when the column is missing, null, or not a number.
const DEFAULT_QUALITY: f32 = 0.5;

/// Precedents decoded from Parquet.
#[derive(Debug, Default)]
pub struct ParquetLoad {
    pub precedents: Vec<Precedent>,
    /// Rows skipped because they have no embedding yet.
    pub unembedded: usize,
}

/// Read a Parquet file into Arrow RecordBatches.
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    if !path.exists() {
        return Err(StoreError::ParquetNotFound(path.to_path_buf()));
    }
    let file = std::fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches: Result<Vec<RecordBatch>, _> = reader.collect();
    Ok(batches?)
}

/// Write RecordBatches to a Parquet file, replacing any existing file.
pub fn write_parquet(path: &Path, batches: &[RecordBatch]) -> Result<usize, StoreError> {
    let first = batches
        .first()
        .ok_or_else(|| StoreError::Other("no record batches provided".into()))?;
    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, first.schema(), None)?;
    let mut rows = 0;
    for batch in batches {
        writer.write(batch)?;
        rows += batch.num_rows();
    }
    writer.close()?;
    info!(rows, path = %path.display(), "wrote parquet");
    Ok(rows)
}

/// Decode precedent rows from batches.
pub fn precedents_from_batches(batches: &[RecordBatch]) -> Result<ParquetLoad, StoreError> {
    let mut load = ParquetLoad::default();

    for batch in batches {
        let case_numbers = column(batch, cols::CASE_NUMBER)?;
        let grades = column(batch, cols::DISABILITY_GRADE)?;
        let grades = grades
            .as_any()
            .downcast_ref::<Int32Array>()
            .ok_or_else(|| StoreError::Other("disability_grade column is not Int32".into()))?;
        let emb_col = column(batch, cols::EMBEDDING)?;
        let fsl = emb_col
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| StoreError::Other("embedding column is not FixedSizeList".into()))?;
        let dim = fsl.value_length() as usize;
        let flat_values = fsl
            .values()
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| StoreError::Other("embedding values are not Float32".into()))?;

        let quality = batch
            .column_by_name(cols::QUALITY_SCORE)
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>().cloned());
        let compensation = batch
            .column_by_name(cols::COMPENSATION_AMOUNT)
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>().cloned());

        for row in 0..batch.num_rows() {
            let Some(case_number) = get_string(case_numbers.as_ref(), row) else {
                warn!(row, "skipping precedent without case number");
                continue;
            };
            if fsl.is_null(row) {
                load.unembedded += 1;
                continue;
            }
            if grades.is_null(row) {
                return Err(StoreError::Other(format!("{case_number}: missing disability grade")));
            }
            let grade = u8::try_from(grades.value(row))
                .ok()
                .and_then(|g| DisabilityGrade::new(g).ok())
                .ok_or_else(|| {
                    StoreError::Other(format!(
                        "{case_number}: invalid disability grade {}",
                        grades.value(row)
                    ))
                })?;

            let offset = row * dim;
            let embedding = flat_values.values()[offset..offset + dim].to_vec();

            let metadata = PrecedentMetadata {
                title: string_at(batch, cols::TITLE, row).unwrap_or_default(),
                summary: string_at(batch, cols::SUMMARY, row).unwrap_or_default(),
                court: string_at(batch, cols::COURT, row),
                decided_on: string_at(batch, cols::DECIDED_ON, row),
                outcome: string_at(batch, cols::OUTCOME, row),
                compensation_amount: compensation
                    .as_ref()
                    .filter(|a| !a.is_null(row))
                    .and_then(|a| u64::try_from(a.value(row)).ok()),
                injury_type: string_at(batch, cols::INJURY_TYPE, row),
                industry_code: string_at(batch, cols::INDUSTRY_CODE, row),
            };
            let quality_score = quality
                .as_ref()
                .filter(|a| !a.is_null(row) && a.value(row).is_finite())
                .map_or(DEFAULT_QUALITY, |a| a.value(row).clamp(0.0, 1.0));

            load.precedents.push(Precedent {
                case_number,
                embedding,
                grade,
                metadata,
                quality_score,
            });
        }
    }

    Ok(load)
}

impl PrecedentStore {
    /// Load every embedded precedent from a Parquet file.
    pub fn load_parquet(&self, path: &Path) -> Result<ParquetLoad, StoreError> {
        let batches = read_parquet(path)?;
        let mut load = precedents_from_batches(&batches)?;
        if load.unembedded > 0 {
            warn!(
                unembedded = load.unembedded,
                path = %path.display(),
                "skipped precedents without embeddings"
            );
        }
        let precedents = std::mem::take(&mut load.precedents);
        self.insert_many(precedents)?;
        Ok(load)
    }
}

// ── Column helpers ──

fn column(batch: &RecordBatch, name: &str) -> Result<Arc<dyn Array>, StoreError> {
    batch
        .column_by_name(name)
        .cloned()
        .ok_or_else(|| StoreError::Other(format!("missing '{name}' column")))
}

fn string_at(batch: &RecordBatch, name: &str, row: usize) -> Option<String> {
    batch
        .column_by_name(name)
        .and_then(|col| get_string(col.as_ref(), row))
}

/// Read a Utf8 or LargeUtf8 cell.
pub fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
}
