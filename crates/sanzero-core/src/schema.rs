/// Arrow schema definitions for precedent data exchanged with ingestion.
pub mod precedents {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    pub const CASE_NUMBER: &str = "case_number";
    pub const TITLE: &str = "title";
    pub const SUMMARY: &str = "summary";
    pub const TEXT: &str = "text";
    pub const COURT: &str = "court";
    pub const DECIDED_ON: &str = "decided_on";
    pub const OUTCOME: &str = "outcome";
    pub const COMPENSATION_AMOUNT: &str = "compensation_amount";
    pub const INJURY_TYPE: &str = "injury_type";
    pub const INDUSTRY_CODE: &str = "industry_code";
    pub const DISABILITY_GRADE: &str = "disability_grade";
    pub const QUALITY_SCORE: &str = "quality_score";
    pub const EMBEDDING: &str = "embedding";
    pub const EMBEDDING_MODEL: &str = "embedding_model";

    /// `FixedSizeList<Float32, dim>` used for embedding columns.
    pub fn embedding_type(dim: i32) -> DataType {
        DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim)
    }

    /// Schema for precedent records. `embedding` is null until the embed step runs.
    pub fn precedent_schema(dim: i32) -> Schema {
        Schema::new(vec![
            Field::new(CASE_NUMBER, DataType::Utf8, false),
            Field::new(TITLE, DataType::Utf8, false),
            Field::new(SUMMARY, DataType::Utf8, true),
            Field::new(TEXT, DataType::Utf8, false),
            Field::new(COURT, DataType::Utf8, true),
            Field::new(DECIDED_ON, DataType::Utf8, true),
            Field::new(OUTCOME, DataType::Utf8, true),
            Field::new(COMPENSATION_AMOUNT, DataType::Int64, true),
            Field::new(INJURY_TYPE, DataType::Utf8, true),
            Field::new(INDUSTRY_CODE, DataType::Utf8, true),
            Field::new(DISABILITY_GRADE, DataType::Int32, false),
            Field::new(QUALITY_SCORE, DataType::Float32, true),
            Field::new(EMBEDDING, embedding_type(dim), true),
            Field::new(EMBEDDING_MODEL, DataType::Utf8, true),
        ])
    }
}
