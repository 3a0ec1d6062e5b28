use crate::error::DbError;
use crate::models::{
    BulletCitation, DeckBullet, DeckSection, DeckSubsection, Document, DocumentImage,
    DocumentStatus, Job, JobStatus, NewDeck, NewDocumentImage, SourceSpan, iso_now,
};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// SQLite-backed store for documents, jobs, images, and the deck tree.
///
/// The connection lives behind a mutex; only one caller issues SQL at a time.
/// The pipeline orchestrator is the sole writer during a run.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn, Some(path))
    }

    /// Open an in-memory database (used by tests and throwaway runs).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<&Path>) -> Result<Self, DbError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id         TEXT PRIMARY KEY,
                owner_id   TEXT NOT NULL,
                title      TEXT NOT NULL,
                language   TEXT,
                pages      INTEGER,
                status     TEXT NOT NULL DEFAULT 'uploaded',
                file_key   TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS jobs (
                id           TEXT PRIMARY KEY,
                document_id  TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                status       TEXT NOT NULL DEFAULT 'queued',
                progress     REAL NOT NULL DEFAULT 0.0,
                error_code   TEXT,
                error_detail TEXT,
                metrics      TEXT,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS document_images (
                id          TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                page        INTEGER NOT NULL,
                image_index INTEGER NOT NULL,
                storage_key TEXT NOT NULL,
                width       INTEGER NOT NULL,
                height      INTEGER NOT NULL,
                is_formula  INTEGER NOT NULL DEFAULT 0,
                latex       TEXT
            );
            CREATE TABLE IF NOT EXISTS deck_sections (
                id           TEXT PRIMARY KEY,
                document_id  TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                heading      TEXT NOT NULL,
                summary_note TEXT NOT NULL DEFAULT '',
                sort_index   INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS deck_subsections (
                id         TEXT PRIMARY KEY,
                section_id TEXT NOT NULL REFERENCES deck_sections(id) ON DELETE CASCADE,
                heading    TEXT NOT NULL,
                annotation TEXT NOT NULL DEFAULT '',
                sort_index INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS source_spans (
                id              TEXT PRIMARY KEY,
                document_id     TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                page            INTEGER NOT NULL,
                paragraph_index INTEGER NOT NULL,
                quote_snippet   TEXT NOT NULL,
                char_start      INTEGER,
                char_end        INTEGER
            );
            CREATE TABLE IF NOT EXISTS deck_bullets (
                id            TEXT PRIMARY KEY,
                subsection_id TEXT NOT NULL REFERENCES deck_subsections(id) ON DELETE CASCADE,
                text          TEXT NOT NULL,
                sort_index    INTEGER NOT NULL DEFAULT 0,
                image_id      TEXT REFERENCES document_images(id)
            );
            CREATE TABLE IF NOT EXISTS bullet_citations (
                id             TEXT PRIMARY KEY,
                bullet_id      TEXT NOT NULL REFERENCES deck_bullets(id) ON DELETE CASCADE,
                source_span_id TEXT NOT NULL REFERENCES source_spans(id) ON DELETE CASCADE
            );",
        )?;

        if let Some(path) = path {
            tracing::info!("Database opened at {}", path.display());
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- documents ----

    pub async fn create_document(
        &self,
        owner_id: &str,
        title: &str,
        file_key: &str,
    ) -> Result<Document, DbError> {
        let now = iso_now();
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            language: None,
            pages: None,
            status: DocumentStatus::Uploaded,
            file_key: file_key.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.lock();
        conn.execute(
            "INSERT INTO documents (id, owner_id, title, status, file_key, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                doc.id,
                doc.owner_id,
                doc.title,
                doc.status.as_str(),
                doc.file_key,
                doc.created_at,
                doc.updated_at,
            ],
        )?;
        Ok(doc)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, DbError> {
        let conn = self.lock();
        let doc = conn
            .query_row(
                "SELECT id, owner_id, title, language, pages, status, file_key, created_at, updated_at
                 FROM documents WHERE id = ?1",
                params![id],
                row_to_document,
            )
            .map(Some)
            .or_else(not_found_to_none)?;
        Ok(doc)
    }

    pub async fn set_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
    ) -> Result<(), DbError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), iso_now(), id],
        )?;
        Ok(())
    }

    pub async fn set_document_language(&self, id: &str, language: &str) -> Result<(), DbError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE documents SET language = ?1, updated_at = ?2 WHERE id = ?3",
            params![language, iso_now(), id],
        )?;
        Ok(())
    }

    pub async fn set_document_pages(&self, id: &str, pages: u32) -> Result<(), DbError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE documents SET pages = ?1, updated_at = ?2 WHERE id = ?3",
            params![pages, iso_now(), id],
        )?;
        Ok(())
    }

    // ---- jobs ----

    pub async fn create_job(&self, document_id: &str) -> Result<Job, DbError> {
        let now = iso_now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            status: JobStatus::Queued,
            progress: 0.0,
            error_code: None,
            error_detail: None,
            metrics: None,
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.lock();
        conn.execute(
            "INSERT INTO jobs (id, document_id, status, progress, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job.id,
                job.document_id,
                job.status.as_str(),
                job.progress,
                job.created_at,
                job.updated_at,
            ],
        )?;
        Ok(job)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>, DbError> {
        let conn = self.lock();
        let job = conn
            .query_row(
                "SELECT id, document_id, status, progress, error_code, error_detail, metrics,
                        created_at, updated_at
                 FROM jobs WHERE id = ?1",
                params![id],
                row_to_job,
            )
            .map(Some)
            .or_else(not_found_to_none)?;
        Ok(job)
    }

    pub async fn set_job_status(&self, id: &str, status: JobStatus) -> Result<(), DbError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), iso_now(), id],
        )?;
        Ok(())
    }

    /// Advance job progress. Decreasing writes are ignored so observers only
    /// ever see a non-decreasing sequence.
    pub async fn update_progress(&self, id: &str, progress: f64) -> Result<(), DbError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET progress = MAX(progress, ?1), updated_at = ?2 WHERE id = ?3",
            params![progress, iso_now(), id],
        )?;
        Ok(())
    }

    pub async fn fail_job(&self, id: &str, code: &str, detail: &str) -> Result<(), DbError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = 'failed', error_code = ?1, error_detail = ?2, updated_at = ?3
             WHERE id = ?4",
            params![code, detail, iso_now(), id],
        )?;
        Ok(())
    }

    pub async fn complete_job(
        &self,
        id: &str,
        metrics: &serde_json::Value,
    ) -> Result<(), DbError> {
        let metrics_json = serde_json::to_string(metrics)?;
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = 'done', progress = 1.0, metrics = ?1, updated_at = ?2
             WHERE id = ?3",
            params![metrics_json, iso_now(), id],
        )?;
        Ok(())
    }

    // ---- document images ----

    pub async fn insert_document_image(
        &self,
        image: NewDocumentImage,
    ) -> Result<DocumentImage, DbError> {
        let row = DocumentImage {
            id: Uuid::new_v4().to_string(),
            document_id: image.document_id,
            page: image.page,
            image_index: image.image_index,
            storage_key: image.storage_key,
            width: image.width,
            height: image.height,
            is_formula: image.is_formula,
            latex: image.latex,
        };
        let conn = self.lock();
        conn.execute(
            "INSERT INTO document_images
                 (id, document_id, page, image_index, storage_key, width, height, is_formula, latex)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.id,
                row.document_id,
                row.page,
                row.image_index,
                row.storage_key,
                row.width,
                row.height,
                row.is_formula,
                row.latex,
            ],
        )?;
        Ok(row)
    }

    pub async fn images_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentImage>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, page, image_index, storage_key, width, height, is_formula, latex
             FROM document_images WHERE document_id = ?1 ORDER BY page, image_index",
        )?;
        let rows = stmt
            .query_map(params![document_id], row_to_image)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- deck tree ----

    /// Replace the deck for a document in a single transaction: any prior
    /// sections (with their subsections, bullets, and citations) and source
    /// spans are deleted, then the new tree is inserted parent-first.
    pub async fn replace_deck(&self, document_id: &str, deck: &NewDeck) -> Result<(), DbError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM deck_sections WHERE document_id = ?1",
            params![document_id],
        )?;
        tx.execute(
            "DELETE FROM source_spans WHERE document_id = ?1",
            params![document_id],
        )?;

        for (s_idx, section) in deck.sections.iter().enumerate() {
            let section_id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO deck_sections (id, document_id, heading, summary_note, sort_index)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    section_id,
                    document_id,
                    section.heading,
                    section.summary_note,
                    s_idx as u32,
                ],
            )?;

            for (ss_idx, sub) in section.subsections.iter().enumerate() {
                let sub_id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO deck_subsections (id, section_id, heading, annotation, sort_index)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![sub_id, section_id, sub.heading, sub.annotation, ss_idx as u32],
                )?;

                for (b_idx, bullet) in sub.bullets.iter().enumerate() {
                    let bullet_id = Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO deck_bullets (id, subsection_id, text, sort_index, image_id)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![bullet_id, sub_id, bullet.text, b_idx as u32, bullet.image_id],
                    )?;

                    if let Some(span) = &bullet.span {
                        let span_id = Uuid::new_v4().to_string();
                        tx.execute(
                            "INSERT INTO source_spans
                                 (id, document_id, page, paragraph_index, quote_snippet, char_start, char_end)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            params![
                                span_id,
                                document_id,
                                span.page,
                                span.paragraph_index,
                                span.quote_snippet,
                                span.char_start,
                                span.char_end,
                            ],
                        )?;
                        tx.execute(
                            "INSERT INTO bullet_citations (id, bullet_id, source_span_id)
                             VALUES (?1, ?2, ?3)",
                            params![Uuid::new_v4().to_string(), bullet_id, span_id],
                        )?;
                    }
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Delete the deck tree and spans for a document.
    pub async fn delete_deck(&self, document_id: &str) -> Result<(), DbError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM deck_sections WHERE document_id = ?1",
            params![document_id],
        )?;
        tx.execute(
            "DELETE FROM source_spans WHERE document_id = ?1",
            params![document_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub async fn sections_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DeckSection>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, heading, summary_note, sort_index
             FROM deck_sections WHERE document_id = ?1 ORDER BY sort_index",
        )?;
        let rows = stmt
            .query_map(params![document_id], |row| {
                Ok(DeckSection {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    heading: row.get(2)?,
                    summary_note: row.get(3)?,
                    sort_index: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn subsections_for_section(
        &self,
        section_id: &str,
    ) -> Result<Vec<DeckSubsection>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, section_id, heading, annotation, sort_index
             FROM deck_subsections WHERE section_id = ?1 ORDER BY sort_index",
        )?;
        let rows = stmt
            .query_map(params![section_id], |row| {
                Ok(DeckSubsection {
                    id: row.get(0)?,
                    section_id: row.get(1)?,
                    heading: row.get(2)?,
                    annotation: row.get(3)?,
                    sort_index: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn bullets_for_subsection(
        &self,
        subsection_id: &str,
    ) -> Result<Vec<DeckBullet>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, subsection_id, text, sort_index, image_id
             FROM deck_bullets WHERE subsection_id = ?1 ORDER BY sort_index",
        )?;
        let rows = stmt
            .query_map(params![subsection_id], |row| {
                Ok(DeckBullet {
                    id: row.get(0)?,
                    subsection_id: row.get(1)?,
                    text: row.get(2)?,
                    sort_index: row.get(3)?,
                    image_id: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn citations_for_bullet(
        &self,
        bullet_id: &str,
    ) -> Result<Vec<BulletCitation>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, bullet_id, source_span_id
             FROM bullet_citations WHERE bullet_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![bullet_id], |row| {
                Ok(BulletCitation {
                    id: row.get(0)?,
                    bullet_id: row.get(1)?,
                    source_span_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn span(&self, id: &str) -> Result<Option<SourceSpan>, DbError> {
        let conn = self.lock();
        let span = conn
            .query_row(
                "SELECT id, document_id, page, paragraph_index, quote_snippet, char_start, char_end
                 FROM source_spans WHERE id = ?1",
                params![id],
                row_to_span,
            )
            .map(Some)
            .or_else(not_found_to_none)?;
        Ok(span)
    }

    pub async fn spans_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<SourceSpan>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, page, paragraph_index, quote_snippet, char_start, char_end
             FROM source_spans WHERE document_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![document_id], row_to_span)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("db lock poisoned")
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let status: String = row.get(5)?;
    Ok(Document {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        language: row.get(3)?,
        pages: row.get(4)?,
        status: DocumentStatus::parse(&status),
        file_key: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let status: String = row.get(2)?;
    let metrics_json: Option<String> = row.get(6)?;
    Ok(Job {
        id: row.get(0)?,
        document_id: row.get(1)?,
        status: JobStatus::parse(&status),
        progress: row.get(3)?,
        error_code: row.get(4)?,
        error_detail: row.get(5)?,
        metrics: metrics_json.and_then(|j| serde_json::from_str(&j).ok()),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_image(row: &rusqlite::Row) -> rusqlite::Result<DocumentImage> {
    Ok(DocumentImage {
        id: row.get(0)?,
        document_id: row.get(1)?,
        page: row.get(2)?,
        image_index: row.get(3)?,
        storage_key: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        is_formula: row.get(7)?,
        latex: row.get(8)?,
    })
}

fn row_to_span(row: &rusqlite::Row) -> rusqlite::Result<SourceSpan> {
    Ok(SourceSpan {
        id: row.get(0)?,
        document_id: row.get(1)?,
        page: row.get(2)?,
        paragraph_index: row.get(3)?,
        quote_snippet: row.get(4)?,
        char_start: row.get(5)?,
        char_end: row.get(6)?,
    })
}

fn not_found_to_none<T>(err: rusqlite::Error) -> Result<Option<T>, rusqlite::Error> {
    match err {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}
