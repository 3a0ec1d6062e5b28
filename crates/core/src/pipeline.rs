use crate::config::PipelineConfig;
use crate::dedupe::fuzzy_dedupe;
use crate::error::{PipelineError, PipelineResult};
use crate::formula::FormulaDetector;
use crate::images::ingest_images;
use crate::language::detect_language;
use crate::llm::{FactCandidate, FactType, LlmClient, SectionDraft, SubsectionDraft};
use crate::pdf::{ParsedChunk, ParsedImage, parse_pdf_bytes};
use crate::progress::{ProgressReporter, SilentReporter};
use crate::snippet::{MAX_SNIPPET_LEN, find_best_snippet};
use slideforge_db::{
    Db, Document, DocumentImage, DocumentStatus, Job, JobStatus, NewBullet, NewDeck, NewSection,
    NewSpan, NewSubsection,
};
use slideforge_storage::StorageBackend;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Drives a document through the full processing pipeline: parse, detect
/// language, ingest images, extract facts, dedupe, outline, annotate,
/// persist, and gate.
///
/// The orchestrator is the sole database writer; worker tasks only return
/// plain values. Terminal job and document states are always committed, on
/// success and on failure alike.
pub struct Pipeline {
    config: PipelineConfig,
    llm: LlmClient,
    storage: Arc<dyn StorageBackend>,
    detector: FormulaDetector,
    reporter: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        llm: LlmClient,
        storage: Arc<dyn StorageBackend>,
        detector: FormulaDetector,
    ) -> Self {
        Self {
            config,
            llm,
            storage,
            detector,
            reporter: Arc::new(SilentReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run the pipeline for an existing document + job pair.
    ///
    /// On success the deck tree is persisted and the job is `done`; on
    /// failure the job is `failed` with a classified error code. The error is
    /// also returned so inline callers can report it.
    pub async fn run(
        &self,
        db: &Db,
        document_id: &str,
        job_id: &str,
        file_bytes: Vec<u8>,
    ) -> PipelineResult<()> {
        let (doc, job) = self.preflight(db, document_id, job_id).await?;
        let result = self.execute(db, &doc, &job, file_bytes).await;
        self.finalize(db, &doc, &job, result).await
    }

    async fn preflight(
        &self,
        db: &Db,
        document_id: &str,
        job_id: &str,
    ) -> PipelineResult<(Document, Job)> {
        let doc = db
            .get_document(document_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(format!("document {document_id} missing")))?;
        let job = db
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(format!("job {job_id} missing")))?;
        Ok((doc, job))
    }

    async fn execute(
        &self,
        db: &Db,
        doc: &Document,
        job: &Job,
        file_bytes: Vec<u8>,
    ) -> PipelineResult<()> {
        self.start(db, doc, job).await?;

        let chunk_size = self.config.chunk_size_tokens;
        let (pages, chunks, images) =
            tokio::task::spawn_blocking(move || parse_pdf_bytes(&file_bytes, chunk_size))
                .await
                .map_err(|e| PipelineError::Other(format!("parse task panicked: {e}")))??;

        self.process(db, doc, job, pages, chunks, images).await
    }

    /// S0: mark the job running and the document processing.
    async fn start(&self, db: &Db, doc: &Document, job: &Job) -> PipelineResult<()> {
        db.set_job_status(&job.id, JobStatus::Running).await?;
        db.update_progress(&job.id, 0.05).await?;
        db.set_document_status(&doc.id, DocumentStatus::Processing)
            .await?;
        self.reporter.on_stage("start", 0.05);
        Ok(())
    }

    /// Stages S1 through S10 over already-parsed input.
    async fn process(
        &self,
        db: &Db,
        doc: &Document,
        job: &Job,
        pages: u32,
        chunks: Vec<ParsedChunk>,
        images: Vec<ParsedImage>,
    ) -> PipelineResult<()> {
        // S1: size limit + page count.
        if pages > self.config.max_pages {
            return Err(PipelineError::DocTooLarge(format!("pages={pages}")));
        }
        db.set_document_pages(&doc.id, pages).await?;
        db.update_progress(&job.id, 0.15).await?;
        self.reporter.on_stage("parse", 0.15);

        // S2: language detection.
        let language = detect_language(&chunks);
        db.set_document_language(&doc.id, &language).await?;
        db.update_progress(&job.id, 0.20).await?;
        self.reporter.on_stage("language", 0.20);

        // S3: image ingestion.
        let doc_images = if images.is_empty() {
            Vec::new()
        } else {
            let rows = ingest_images(db, &self.storage, &self.detector, doc, &images).await?;
            tracing::info!(
                "Extracted {} images ({} formulas) from document {}",
                rows.len(),
                rows.iter().filter(|r| r.is_formula).count(),
                doc.id
            );
            rows
        };
        db.update_progress(&job.id, 0.25).await?;
        self.reporter.on_stage("images", 0.25);

        let (formula_facts, formula_image_map) = build_formula_facts(&doc_images);

        // S4: parallel fact extraction across chunks.
        let mut facts: Vec<FactCandidate> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        if !chunks.is_empty() {
            let semaphore = Arc::new(Semaphore::new(chunks.len().min(8)));
            let mut join_set = JoinSet::new();

            for chunk in &chunks {
                let permit = semaphore.clone().acquire_owned().await.unwrap();
                let llm = self.llm.clone();
                let chunk_id = chunk.chunk_id.clone();
                let text = chunk.text.clone();

                join_set.spawn(async move {
                    let _permit = permit;
                    llm.extract_facts(&chunk_id, &text).await
                });
            }

            // Fan-in in completion order; dedupe keeps whichever duplicate
            // arrived first unless beaten on importance.
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(Ok(chunk_facts)) => facts.extend(chunk_facts),
                    Ok(Err(e)) => errors.push(e.to_string()),
                    Err(e) => errors.push(format!("extraction task panicked: {e}")),
                }
            }
        }

        if facts.is_empty() && !errors.is_empty() {
            return Err(PipelineError::LlmOutputInvalid(errors.remove(0)));
        }
        facts.extend(formula_facts);
        db.update_progress(&job.id, 0.35).await?;
        self.reporter.on_stage("extract", 0.35);

        let chunk_map: HashMap<&str, &ParsedChunk> =
            chunks.iter().map(|c| (c.chunk_id.as_str(), c)).collect();
        let fact_to_chunk: HashMap<String, ParsedChunk> = facts
            .iter()
            .filter_map(|f| {
                chunk_map
                    .get(f.chunk_id.as_str())
                    .map(|c| (f.fact_id.clone(), (*c).clone()))
            })
            .collect();

        // S5: fuzzy dedupe.
        let raw_count = facts.len();
        let threshold = (self.config.dedupe_threshold * 100.0).round() as u32;
        let merged_facts = fuzzy_dedupe(facts, threshold);
        db.update_progress(&job.id, 0.50).await?;
        self.reporter.on_stage("dedupe", 0.50);

        // S6: outline building. A hard failure here aborts the run.
        let outline = self
            .llm
            .build_outline(&merged_facts, &language)
            .await
            .map_err(|e| {
                PipelineError::LlmOutputInvalid(format!("Outline generation failed: {e}"))
            })?;
        db.update_progress(&job.id, 0.65).await?;
        self.reporter.on_stage("outline", 0.65);

        // S7: speaker notes (best-effort).
        let drafts: Vec<SectionDraft> = outline
            .sections
            .iter()
            .map(|sec| SectionDraft {
                heading: sec.heading.clone(),
                subsections: sec
                    .subsections
                    .iter()
                    .map(|sub| SubsectionDraft {
                        heading: sub.heading.clone(),
                        bullet_texts: sub
                            .fact_indices
                            .iter()
                            .filter(|&&i| i < merged_facts.len())
                            .map(|&i| merged_facts[i].statement.clone())
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        let annotations = self.llm.write_annotations(&drafts, &language).await;
        db.update_progress(&job.id, 0.75).await?;
        self.reporter.on_stage("annotate", 0.75);

        // S8: build and persist the deck tree (replaces any prior run).
        let mut all_bullets = 0usize;
        let mut cited_bullets = 0usize;
        let mut used_fact_ids: HashSet<String> = HashSet::new();
        let mut annotation_idx = 0usize;
        let mut deck = NewDeck::default();

        for sec in &outline.sections {
            let mut new_section = NewSection {
                heading: sec.heading.clone(),
                summary_note: sec.summary_note.clone(),
                subsections: Vec::new(),
            };

            for sub in &sec.subsections {
                let annotation = annotations.get(annotation_idx).cloned().unwrap_or_default();
                annotation_idx += 1;

                let mut new_sub = NewSubsection {
                    heading: sub.heading.clone(),
                    annotation,
                    bullets: Vec::new(),
                };

                for &fact_idx in &sub.fact_indices {
                    let Some(fact) = merged_facts.get(fact_idx) else {
                        continue;
                    };
                    let linked_image = formula_image_map.get(&fact.fact_id);

                    let span = if let Some(src_chunk) = fact_to_chunk.get(&fact.fact_id) {
                        cited_bullets += 1;
                        Some(NewSpan {
                            page: src_chunk.page,
                            paragraph_index: src_chunk.paragraph_index,
                            quote_snippet: find_best_snippet(
                                &fact.statement,
                                &src_chunk.text,
                                MAX_SNIPPET_LEN,
                            ),
                            char_start: Some(src_chunk.char_start),
                            char_end: Some(src_chunk.char_end),
                        })
                    } else if let Some(image) = linked_image {
                        cited_bullets += 1;
                        Some(NewSpan {
                            page: image.page,
                            paragraph_index: 0,
                            quote_snippet: format!("[Formula image on page {}]", image.page),
                            char_start: None,
                            char_end: None,
                        })
                    } else {
                        None
                    };

                    new_sub.bullets.push(NewBullet {
                        text: fact.statement.clone(),
                        image_id: linked_image.map(|img| img.id.clone()),
                        span,
                    });
                    all_bullets += 1;
                    used_fact_ids.insert(fact.fact_id.clone());
                }

                new_section.subsections.push(new_sub);
            }
            deck.sections.push(new_section);
        }

        db.replace_deck(&doc.id, &deck).await?;
        db.update_progress(&job.id, 0.90).await?;
        self.reporter.on_stage("persist", 0.90);

        // S9: quality gate. A failed gate removes the freshly written deck
        // before the terminal state is committed.
        let coverage = if merged_facts.is_empty() {
            1.0
        } else {
            used_fact_ids.len() as f64 / merged_facts.len() as f64
        };
        let citation_completeness = if all_bullets == 0 {
            1.0
        } else {
            cited_bullets as f64 / all_bullets as f64
        };

        if citation_completeness < 1.0 {
            db.delete_deck(&doc.id).await?;
            return Err(PipelineError::CitationIncomplete(
                "every bullet needs a citation".to_string(),
            ));
        }
        if coverage < self.config.quality_coverage_threshold {
            db.delete_deck(&doc.id).await?;
            return Err(PipelineError::QualityGateFailed(format!(
                "coverage={coverage}"
            )));
        }

        // S10: metrics + terminal success state.
        let metrics = serde_json::json!({
            "coverage_ratio": coverage,
            "citation_completeness": citation_completeness,
            "dedupe_ratio": 1.0 - (merged_facts.len() as f64 / raw_count.max(1) as f64),
        });
        db.set_document_status(&doc.id, DocumentStatus::Ready)
            .await?;
        db.complete_job(&job.id, &metrics).await?;
        self.reporter.on_stage("done", 1.0);

        Ok(())
    }

    /// Commit the terminal failure state; success passes through.
    async fn finalize(
        &self,
        db: &Db,
        doc: &Document,
        job: &Job,
        result: PipelineResult<()>,
    ) -> PipelineResult<()> {
        let Err(err) = result else {
            return Ok(());
        };

        let code = err.code();
        let detail = err.detail();
        self.reporter.on_error(code, &detail);
        tracing::error!("Pipeline failed for document {}: {code}: {detail}", doc.id);

        if let Err(db_err) = db.fail_job(&job.id, code, &detail).await {
            tracing::error!("Failed to record job failure: {db_err}");
        }
        if let Err(db_err) = db.set_document_status(&doc.id, DocumentStatus::Failed).await {
            tracing::error!("Failed to mark document failed: {db_err}");
        }

        Err(err)
    }
}

/// Synthesize fact candidates from persisted formula images. The importance
/// sentinel sits above the [0, 1] scale so a formula variant always survives
/// dedupe against a text near-duplicate.
fn build_formula_facts(
    doc_images: &[DocumentImage],
) -> (Vec<FactCandidate>, HashMap<String, DocumentImage>) {
    let mut formula_facts = Vec::new();
    let mut formula_image_map = HashMap::new();

    for di in doc_images {
        if !di.is_formula {
            continue;
        }
        let Some(latex) = &di.latex else { continue };

        let fact_id = format!("formula_{}", di.id);
        formula_facts.push(FactCandidate {
            fact_id: fact_id.clone(),
            chunk_id: format!("c_img_{:04}", di.page),
            statement: format!("Formula on page {}: ${latex}$", di.page),
            fact_type: FactType::Formula,
            importance: 5.0,
        });
        formula_image_map.insert(fact_id, di.clone());
    }

    (formula_facts, formula_image_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::LatexOcr;
    use crate::llm::ChatProvider;
    use image::RgbImage;
    use slideforge_storage::LocalStorage;
    use uuid::Uuid;

    struct StubOcr(&'static str);

    impl LatexOcr for StubOcr {
        fn transcribe(&self, _image: &image::DynamicImage) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    struct FailingProvider;

    #[async_trait::async_trait]
    impl ChatProvider for FailingProvider {
        async fn complete(&self, _system: &str, _user: &str) -> PipelineResult<String> {
            Err(PipelineError::LlmApi {
                status: 503,
                detail: "overloaded".to_string(),
            })
        }

        fn provider_name(&self) -> &str {
            "failing"
        }
    }

    fn sample_chunks() -> Vec<ParsedChunk> {
        let texts = [
            "Gradient descent updates weights iteratively. The learning rate controls step size. \
             Convergence depends on the loss surface.",
            "Attention layers weigh token relationships. Transformers stack attention blocks. \
             Positional encodings inject order information.",
            "Dropout regularizes deep networks. Batch normalization stabilizes training.",
        ];
        let mut offset = 0u32;
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let start = offset;
                let end = start + text.chars().count() as u32;
                offset = end + 1;
                ParsedChunk {
                    chunk_id: format!("c_{:04}", i + 1),
                    page: i as u32 + 1,
                    paragraph_index: i as u32 + 1,
                    text: text.to_string(),
                    char_start: start,
                    char_end: end,
                }
            })
            .collect()
    }

    fn white_image(page: u32) -> ParsedImage {
        let img = RgbImage::from_pixel(100, 40, image::Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut bytes);
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, image::ImageFormat::Png)
            .unwrap();
        ParsedImage {
            image_id: Uuid::new_v4().to_string(),
            page,
            image_index: 0,
            bytes,
            ext: "png".to_string(),
            width: 100,
            height: 40,
            bbox: (0.0, 0.0, 100.0, 40.0),
        }
    }

    struct TestEnv {
        db: Db,
        doc: Document,
        job: Job,
        _storage_dir: tempfile::TempDir,
        storage: Arc<dyn StorageBackend>,
    }

    async fn test_env() -> TestEnv {
        let db = Db::open_in_memory().unwrap();
        let doc = db
            .create_document("u1", "paper", "documents/u1/paper.pdf")
            .await
            .unwrap();
        let job = db.create_job(&doc.id).await.unwrap();
        let storage_dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalStorage::new(storage_dir.path().to_path_buf()));
        TestEnv {
            db,
            doc,
            job,
            _storage_dir: storage_dir,
            storage,
        }
    }

    fn mock_pipeline(storage: Arc<dyn StorageBackend>, detector: FormulaDetector) -> Pipeline {
        Pipeline::new(
            PipelineConfig::default(),
            LlmClient::mock(),
            storage,
            detector,
        )
    }

    async fn run_parsed(
        pipeline: &Pipeline,
        env: &TestEnv,
        pages: u32,
        chunks: Vec<ParsedChunk>,
        images: Vec<ParsedImage>,
    ) -> PipelineResult<()> {
        let (doc, job) = pipeline.preflight(&env.db, &env.doc.id, &env.job.id).await?;
        let result = async {
            pipeline.start(&env.db, &doc, &job).await?;
            pipeline
                .process(&env.db, &doc, &job, pages, chunks, images)
                .await
        }
        .await;
        pipeline.finalize(&env.db, &doc, &job, result).await
    }

    async fn collect_bullets(db: &Db, document_id: &str) -> Vec<slideforge_db::DeckBullet> {
        let mut bullets = Vec::new();
        for section in db.sections_for_document(document_id).await.unwrap() {
            for sub in db.subsections_for_section(&section.id).await.unwrap() {
                bullets.extend(db.bullets_for_subsection(&sub.id).await.unwrap());
            }
        }
        bullets
    }

    #[tokio::test]
    async fn test_happy_path_with_mock_provider() {
        let env = test_env().await;
        let pipeline = mock_pipeline(env.storage.clone(), FormulaDetector::disabled());

        run_parsed(&pipeline, &env, 3, sample_chunks(), Vec::new())
            .await
            .unwrap();

        let job = env.db.get_job(&env.job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 1.0);
        let metrics = job.metrics.unwrap();
        assert_eq!(metrics["coverage_ratio"], 1.0);
        assert_eq!(metrics["citation_completeness"], 1.0);

        let doc = env.db.get_document(&env.doc.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.pages, Some(3));
        assert_eq!(doc.language.as_deref(), Some("en"));

        let sections = env.db.sections_for_document(&env.doc.id).await.unwrap();
        assert!(!sections.is_empty());

        // Every persisted bullet carries at least one citation to this document.
        let bullets = collect_bullets(&env.db, &env.doc.id).await;
        assert!(!bullets.is_empty());
        for bullet in &bullets {
            let citations = env.db.citations_for_bullet(&bullet.id).await.unwrap();
            assert!(!citations.is_empty());
            let span = env
                .db
                .span(&citations[0].source_span_id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(span.document_id, env.doc.id);
            assert!(span.quote_snippet.chars().count() <= MAX_SNIPPET_LEN);
        }
    }

    #[tokio::test]
    async fn test_oversize_document_fails_before_processing() {
        let env = test_env().await;
        let mut config = PipelineConfig::default();
        config.max_pages = 2;
        let pipeline = Pipeline::new(
            config,
            LlmClient::mock(),
            env.storage.clone(),
            FormulaDetector::disabled(),
        );

        let err = run_parsed(&pipeline, &env, 3, sample_chunks(), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DOC_TOO_LARGE");

        let job = env.db.get_job(&env.job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code.as_deref(), Some("DOC_TOO_LARGE"));

        let doc = env.db.get_document(&env.doc.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);

        assert!(env
            .db
            .sections_for_document(&env.doc.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_all_chunks_failing_extraction() {
        let env = test_env().await;
        let pipeline = Pipeline::new(
            PipelineConfig::default(),
            LlmClient::with_provider(Arc::new(FailingProvider), 0),
            env.storage.clone(),
            FormulaDetector::disabled(),
        );

        let err = run_parsed(&pipeline, &env, 3, sample_chunks(), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LLM_OUTPUT_INVALID");

        let job = env.db.get_job(&env.job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code.as_deref(), Some("LLM_OUTPUT_INVALID"));
    }

    #[tokio::test]
    async fn test_formula_bullet_with_synthetic_span() {
        let env = test_env().await;
        let detector = FormulaDetector::new(Arc::new(StubOcr("E = mc^2")));
        let pipeline = mock_pipeline(env.storage.clone(), detector);

        run_parsed(
            &pipeline,
            &env,
            3,
            sample_chunks(),
            vec![white_image(1)],
        )
        .await
        .unwrap();

        // The image row is persisted with its transcription.
        let images = env.db.images_for_document(&env.doc.id).await.unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].is_formula);
        assert_eq!(images[0].latex.as_deref(), Some("E = mc^2"));

        // The blob landed under the document's image prefix.
        let blob = env.storage.read(&images[0].storage_key).await.unwrap();
        assert!(!blob.is_empty());

        // Exactly one bullet is backed by the image, cited via the synthetic
        // formula span.
        let bullets = collect_bullets(&env.db, &env.doc.id).await;
        let formula_bullets: Vec<_> =
            bullets.iter().filter(|b| b.image_id.is_some()).collect();
        assert_eq!(formula_bullets.len(), 1);
        let bullet = formula_bullets[0];
        assert!(bullet.text.contains("$E = mc^2$"));

        let citations = env.db.citations_for_bullet(&bullet.id).await.unwrap();
        assert_eq!(citations.len(), 1);
        let span = env
            .db
            .span(&citations[0].source_span_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(span.paragraph_index, 0);
        assert_eq!(span.quote_snippet, "[Formula image on page 1]");
        assert_eq!(span.page, 1);

        let job = env.db.get_job(&env.job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_rerun_replaces_deck_without_orphans() {
        let env = test_env().await;
        let pipeline = mock_pipeline(env.storage.clone(), FormulaDetector::disabled());

        run_parsed(&pipeline, &env, 3, sample_chunks(), Vec::new())
            .await
            .unwrap();
        let first_sections = env.db.sections_for_document(&env.doc.id).await.unwrap();

        let job2 = env.db.create_job(&env.doc.id).await.unwrap();
        let env2 = TestEnv {
            db: env.db.clone(),
            doc: env.doc.clone(),
            job: job2,
            _storage_dir: env._storage_dir,
            storage: env.storage.clone(),
        };
        run_parsed(&pipeline, &env2, 3, sample_chunks(), Vec::new())
            .await
            .unwrap();

        let sections = env2.db.sections_for_document(&env2.doc.id).await.unwrap();
        assert_eq!(sections.len(), first_sections.len());
        // No section survives from the first run.
        for s in &sections {
            assert!(!first_sections.iter().any(|f| f.id == s.id));
        }

        // Every span belongs to exactly one citation: counts match.
        let bullets = collect_bullets(&env2.db, &env2.doc.id).await;
        let mut citation_count = 0;
        for bullet in &bullets {
            citation_count += env2
                .db
                .citations_for_bullet(&bullet.id)
                .await
                .unwrap()
                .len();
        }
        let spans = env2.db.spans_for_document(&env2.doc.id).await.unwrap();
        assert_eq!(spans.len(), citation_count);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_across_stages() {
        let env = test_env().await;
        let pipeline = mock_pipeline(env.storage.clone(), FormulaDetector::disabled());

        // Seed progress above an intermediate checkpoint; the run must never
        // pull the observable value backwards.
        env.db.update_progress(&env.job.id, 0.30).await.unwrap();
        run_parsed(&pipeline, &env, 3, sample_chunks(), Vec::new())
            .await
            .unwrap();

        let job = env.db.get_job(&env.job.id).await.unwrap().unwrap();
        assert_eq!(job.progress, 1.0);
    }

    #[tokio::test]
    async fn test_run_missing_job_is_reported() {
        let env = test_env().await;
        let pipeline = mock_pipeline(env.storage.clone(), FormulaDetector::disabled());
        let err = pipeline
            .run(&env.db, &env.doc.id, "no-such-job", b"%PDF-".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "JOB_NOT_FOUND");
    }

    #[test]
    fn test_build_formula_facts_sentinel_importance() {
        let image = DocumentImage {
            id: "img1".to_string(),
            document_id: "d".to_string(),
            page: 4,
            image_index: 0,
            storage_key: "documents/d/images/img1.png".to_string(),
            width: 100,
            height: 40,
            is_formula: true,
            latex: Some("a^2 + b^2 = c^2".to_string()),
        };
        let plain = DocumentImage {
            is_formula: false,
            latex: None,
            ..image.clone()
        };

        let (facts, map) = build_formula_facts(&[image, plain]);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].fact_id, "formula_img1");
        assert_eq!(facts[0].chunk_id, "c_img_0004");
        assert_eq!(facts[0].statement, "Formula on page 4: $a^2 + b^2 = c^2$");
        assert_eq!(facts[0].fact_type, FactType::Formula);
        assert!(facts[0].importance > 1.0);
        assert!(map.contains_key("formula_img1"));
    }
}
