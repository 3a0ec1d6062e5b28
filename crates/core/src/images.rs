use crate::error::PipelineResult;
use crate::formula::FormulaDetector;
use crate::pdf::ParsedImage;
use slideforge_db::{Db, Document, DocumentImage, NewDocumentImage};
use slideforge_storage::StorageBackend;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Detect formulas and upload image blobs concurrently, then persist a
/// `DocumentImage` row for every successful upload.
///
/// Detection and upload fan out over up to `min(4, |images|)` workers; rows
/// are inserted serially in input order on the caller's task. Per-image
/// failures are logged and skipped, never fatal.
pub async fn ingest_images(
    db: &Db,
    storage: &Arc<dyn StorageBackend>,
    detector: &FormulaDetector,
    document: &Document,
    images: &[ParsedImage],
) -> PipelineResult<Vec<DocumentImage>> {
    if images.is_empty() {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(images.len().min(4)));
    let mut join_set = JoinSet::new();

    for img in images.iter().cloned() {
        let permit = semaphore.clone().acquire_owned().await.unwrap();
        let storage = storage.clone();
        let detector = detector.clone();
        let doc_id = document.id.clone();

        join_set.spawn(async move {
            let _permit = permit;

            let latex = detector.detect(&img.bytes);
            let storage_key = format!(
                "documents/{doc_id}/images/{}.{}",
                img.image_id, img.ext
            );
            let upload_ok = match storage.upload(&storage_key, &img.bytes).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Failed to upload image {}: {e}", img.image_id);
                    false
                }
            };

            (img.image_id, latex, storage_key, upload_ok)
        });
    }

    let mut results: HashMap<String, (Option<String>, String, bool)> = HashMap::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((image_id, latex, storage_key, upload_ok)) => {
                results.insert(image_id, (latex, storage_key, upload_ok));
            }
            Err(e) => {
                tracing::error!("Image task panicked: {e}");
            }
        }
    }

    let mut rows = Vec::new();
    for img in images {
        let Some((latex, storage_key, upload_ok)) = results.get(&img.image_id) else {
            continue;
        };
        if !upload_ok {
            continue;
        }

        let row = db
            .insert_document_image(NewDocumentImage {
                document_id: document.id.clone(),
                page: img.page,
                image_index: img.image_index,
                storage_key: storage_key.clone(),
                width: img.width,
                height: img.height,
                is_formula: latex.is_some(),
                latex: latex.clone(),
            })
            .await?;
        rows.push(row);
    }

    Ok(rows)
}
