use crate::core::inserter::DynamicInserter;
use crate::core::transform::{clean_column_names, drop_empty_rows, normalize_dates, validate_schema};
use crate::core::{FetchWindow, Pipeline, PipelineKind, RecordSource, RowWriter};
use crate::utils::error::{PipelineError, Result};
use async_trait::async_trait;

/// Fetch → clean → validate → insert for one source and its target table.
pub struct EtlPipeline<S: RecordSource, W: RowWriter> {
    kind: PipelineKind,
    source: S,
    inserter: DynamicInserter<W>,
}

impl<S: RecordSource, W: RowWriter> EtlPipeline<S, W> {
    pub fn new(kind: PipelineKind, source: S, writer: W) -> Self {
        Self {
            kind,
            source,
            inserter: DynamicInserter::new(writer),
        }
    }

    pub fn writer(&self) -> &W {
        self.inserter.writer()
    }

    async fn execute(&self, window: Option<&FetchWindow>) -> Result<u64> {
        let tag = self.kind.tag();

        // 1. Extract
        let raw = self.source.fetch(window).await?;
        tracing::info!(
            "📥 [{}] Extracted {} raw records from {}",
            tag,
            raw.len(),
            self.source.endpoint()
        );

        if raw.is_empty() {
            tracing::warn!("⚠️ [{}] No data returned for this window. Pipeline will end.", tag);
            return Ok(0);
        }

        // 2. Transform
        let cleaned = normalize_dates(drop_empty_rows(clean_column_names(raw)));
        if cleaned.is_empty() {
            tracing::warn!("⚠️ [{}] Every record was empty after cleaning. Pipeline will end.", tag);
            return Ok(0);
        }

        validate_schema(&cleaned, self.kind.required_fields())?;
        tracing::info!(
            "🔧 [{}] Transformation phase completed. Total usable rows: {}",
            tag,
            cleaned.len()
        );

        // 3. Load
        let inserted = self
            .inserter
            .insert(self.kind.target_table(), &cleaned)
            .await?;
        tracing::info!(
            "💾 [{}] Inserted {} rows into {}",
            tag,
            inserted,
            self.kind.target_table()
        );

        Ok(inserted)
    }
}

#[async_trait]
impl<S: RecordSource, W: RowWriter> Pipeline for EtlPipeline<S, W> {
    fn kind(&self) -> PipelineKind {
        self.kind
    }

    async fn run(&self, window: Option<&FetchWindow>) -> std::result::Result<u64, PipelineError> {
        let tag = self.kind.tag();
        match window {
            Some(window) => tracing::info!(
                "🚀 [{}] {} started for window {}",
                tag,
                self.kind.name(),
                window
            ),
            None => tracing::info!("🚀 [{}] {} started", tag, self.kind.name()),
        }

        match self.execute(window).await {
            Ok(rows) => {
                tracing::info!("✅ [{}] {} completed successfully", tag, self.kind.name());
                Ok(rows)
            }
            Err(e) => {
                tracing::error!("❌ [{}] {} failed: {}", tag, self.kind.name(), e);
                Err(PipelineError::new(self.kind.name(), e))
            }
        }
    }
}
