//! Embedding pipeline: reads precedent text from Parquet, embeds it, writes
//! Parquet with a populated `embedding` column.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use arrow::array::{Array, ArrayRef, FixedSizeListBuilder, Float32Builder, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use futures::stream::{self, StreamExt};
use sanzero_ai::TextEmbedder;
use sanzero_core::precedents as cols;
use sanzero_store::get_string;
use tracing::{info, warn};

/// Texts embedded concurrently per batch.
const EMBED_CONCURRENCY: usize = 8;

#[derive(Debug)]
pub struct EmbedStats {
    pub total_rows: usize,
    pub embedded: usize,
    /// Rows whose text the embedder rejected; written with a null embedding.
    pub skipped: usize,
    pub elapsed_secs: f64,
}

/// Read Parquet → embed `text` → write Parquet.
pub async fn run_embed_pipeline(
    embedder: &dyn TextEmbedder,
    model_name: &str,
    input: &Path,
    output: &Path,
) -> anyhow::Result<EmbedStats> {
    let start = Instant::now();

    let source_batches = sanzero_store::read_parquet(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let total_rows: usize = source_batches.iter().map(|b| b.num_rows()).sum();
    eprintln!("  Read {total_rows} rows from {}", input.display());

    let Some(first) = source_batches.first() else {
        return Ok(EmbedStats {
            total_rows: 0,
            embedded: 0,
            skipped: 0,
            elapsed_secs: 0.0,
        });
    };

    let dim = embedder.dim();
    let layout = Layout::new(&first.schema(), dim)?;

    let mut output_batches = Vec::with_capacity(source_batches.len());
    let mut processed = 0usize;
    let mut skipped = 0usize;

    for batch in &source_batches {
        let texts = extract_texts(batch)?;

        let results: Vec<_> = stream::iter(texts.iter())
            .map(|text| async move { embedder.embed(text).await })
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        let mut embeddings = Vec::with_capacity(results.len());
        for (row, result) in results.into_iter().enumerate() {
            match result {
                Ok(v) => embeddings.push(Some(v)),
                Err(e) if e.is_input_error() => {
                    warn!(row = processed + row, error = %e, "text not embeddable, leaving embedding null");
                    skipped += 1;
                    embeddings.push(None);
                }
                Err(e) => return Err(e).context("generating embeddings"),
            }
        }

        output_batches.push(layout.apply(batch, &embeddings, model_name)?);

        processed += batch.num_rows();
        eprint!(
            "\r  Embedded {processed}/{total_rows} ({:.1}%)",
            processed as f64 / total_rows as f64 * 100.0
        );
    }
    eprintln!();

    let written = sanzero_store::write_parquet(output, &output_batches)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(rows = written, skipped, path = %output.display(), "embedded precedents written");

    Ok(EmbedStats {
        total_rows,
        embedded: total_rows - skipped,
        skipped,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// Where the embedding columns go in the output schema. Existing columns are
/// replaced in place; missing ones are appended.
struct Layout {
    schema: SchemaRef,
    dim: usize,
    embedding_idx: usize,
    model_idx: usize,
}

impl Layout {
    fn new(source: &Schema, dim: usize) -> anyhow::Result<Self> {
        let dim_i32 = i32::try_from(dim).context("embedding dimension too large")?;
        let mut fields: Vec<Field> = source.fields().iter().map(|f| f.as_ref().clone()).collect();

        let embedding = Field::new(cols::EMBEDDING, cols::embedding_type(dim_i32), true);
        let embedding_idx = place(&mut fields, source, embedding);
        let model = Field::new(cols::EMBEDDING_MODEL, DataType::Utf8, true);
        let model_idx = place(&mut fields, source, model);

        Ok(Self {
            schema: Arc::new(Schema::new(fields)),
            dim,
            embedding_idx,
            model_idx,
        })
    }

    fn apply(
        &self,
        batch: &RecordBatch,
        embeddings: &[Option<Vec<f32>>],
        model_name: &str,
    ) -> anyhow::Result<RecordBatch> {
        let mut builder = FixedSizeListBuilder::new(Float32Builder::new(), self.dim as i32);
        for emb in embeddings {
            match emb {
                Some(v) => {
                    builder.values().append_slice(v);
                    builder.append(true);
                }
                None => {
                    builder.values().append_nulls(self.dim);
                    builder.append(false);
                }
            }
        }
        let models: StringArray = embeddings
            .iter()
            .map(|e| e.as_ref().map(|_| model_name))
            .collect();

        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
        set_column(&mut columns, self.embedding_idx, Arc::new(builder.finish()));
        set_column(&mut columns, self.model_idx, Arc::new(models));

        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }
}

fn place(fields: &mut Vec<Field>, source: &Schema, field: Field) -> usize {
    match source.index_of(field.name()) {
        Ok(idx) => {
            fields[idx] = field;
            idx
        }
        Err(_) => {
            fields.push(field);
            fields.len() - 1
        }
    }
}

fn set_column(columns: &mut Vec<ArrayRef>, idx: usize, array: ArrayRef) {
    if idx < columns.len() {
        columns[idx] = array;
    } else {
        columns.push(array);
    }
}

/// Text per row from the `text` column; nulls become empty strings.
fn extract_texts(batch: &RecordBatch) -> anyhow::Result<Vec<String>> {
    let col = batch
        .column_by_name(cols::TEXT)
        .with_context(|| format!("missing '{}' column", cols::TEXT))?;
    Ok((0..col.len())
        .map(|i| get_string(col.as_ref(), i).unwrap_or_default())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;
    use sanzero_ai::HashingEmbedder;
    use sanzero_store::{IndexParams, PrecedentStore};

    fn source_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new(cols::CASE_NUMBER, DataType::Utf8, false),
            Field::new(cols::TEXT, DataType::Utf8, true),
            Field::new(cols::DISABILITY_GRADE, DataType::Int32, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["2019-001", "2019-002", "2019-003"])),
                Arc::new(StringArray::from(vec![
                    Some("right index finger amputated in a press"),
                    Some("   "),
                    Some("lumbar fracture after fall from scaffolding"),
                ])),
                Arc::new(Int32Array::from(vec![9, 12, 8])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn embeds_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("precedents.parquet");
        let output = dir.path().join("embedded.parquet");
        sanzero_store::write_parquet(&input, &[source_batch()]).unwrap();

        let embedder = HashingEmbedder::new(4, 2000);
        let stats = run_embed_pipeline(&embedder, "hashing-4", &input, &output)
            .await
            .unwrap();
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.embedded, 2);
        assert_eq!(stats.skipped, 1);

        let batches = sanzero_store::read_parquet(&output).unwrap();
        let schema = batches[0].schema();
        assert_eq!(
            schema.field_with_name(cols::EMBEDDING).unwrap().data_type(),
            &cols::embedding_type(4)
        );
        let models = batches[0].column_by_name(cols::EMBEDDING_MODEL).unwrap();
        assert_eq!(get_string(models.as_ref(), 0).as_deref(), Some("hashing-4"));
        assert!(models.is_null(1));

        let store = PrecedentStore::new(4, IndexParams::default());
        let load = store.load_parquet(&output).unwrap();
        assert_eq!(load.unembedded, 1);
        assert_eq!(store.len().unwrap(), 2);
        assert!(store.get("2019-002").unwrap().is_none());
    }

    #[test]
    fn missing_text_column_is_an_error() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            cols::CASE_NUMBER,
            DataType::Utf8,
            false,
        )]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["a"]))])
            .unwrap();
        assert!(extract_texts(&batch).is_err());
    }
}
