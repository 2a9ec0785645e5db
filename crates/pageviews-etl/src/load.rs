//! Idempotent load of transformed rows

use crate::error::LoadError;
use crate::models::TransformedRow;
use crate::storage::PageviewStore;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Rows per insert transaction
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub rows_read: u64,
    /// Rows not already present; zero when re-loading the same file
    pub rows_inserted: u64,
    pub batches: u64,
}

/// Insert every row of `csv_path` into `store`, `batch_size` rows per transaction.
///
/// Rows whose key is already stored are left untouched, so the load can be
/// repeated safely. A failure part-way keeps the batches committed so far.
pub async fn load(
    csv_path: &Path,
    store: &dyn PageviewStore,
    batch_size: usize,
) -> Result<LoadStats, LoadError> {
    info!(
        path = %csv_path.display(),
        backend = store.backend(),
        batch_size,
        "Loading transformed rows"
    );

    store.ensure_schema().await?;

    let csv_err = |source| LoadError::Csv {
        path: csv_path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(csv_path).map_err(csv_err)?;

    let batch_size = batch_size.max(1);
    let mut stats = LoadStats::default();
    let mut batch: Vec<TransformedRow> = Vec::with_capacity(batch_size);

    for row in reader.deserialize::<TransformedRow>() {
        batch.push(row.map_err(csv_err)?);
        stats.rows_read += 1;

        if batch.len() == batch_size {
            flush(store, &mut batch, &mut stats).await?;
        }
    }
    flush(store, &mut batch, &mut stats).await?;

    info!(
        rows_read = stats.rows_read,
        rows_inserted = stats.rows_inserted,
        batches = stats.batches,
        "Load complete"
    );
    Ok(stats)
}

async fn flush(
    store: &dyn PageviewStore,
    batch: &mut Vec<TransformedRow>,
    stats: &mut LoadStats,
) -> Result<(), LoadError> {
    if batch.is_empty() {
        return Ok(());
    }

    let inserted = store.insert_batch(batch).await?;
    stats.rows_inserted += inserted;
    stats.batches += 1;
    debug!(
        batch = stats.batches,
        size = batch.len(),
        inserted,
        "Batch loaded"
    );
    batch.clear();
    Ok(())
}
