//! Schema extraction: turn a PDF form into a JSON form schema.
//!
//! One call runs the whole pipeline:
//!
//! ```text
//! Document ─▶ validate ─▶ rasterize (blocking pool) ─▶ ModelRequest
//!          ─▶ ModelInvoker (retry) ─▶ sanitize ─▶ parse ─▶ ExtractedSchema
//! ```
//!
//! Every page that renders is sent in a single request so the model sees
//! the whole form at once and can keep section and layout order across
//! page breaks. Pages that fail to render are left out and reported in
//! [`ExtractedSchema::skipped_pages`].

use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::output::{ExtractedSchema, SCHEMA_CONFIDENCE};
use crate::pipeline::input::Document;
use crate::pipeline::llm::{ContentBlock, ModelInvoker, ModelRequest, Provider};
use crate::pipeline::render::{rasterize, PageRasterizer, PdfiumRasterizer, RenderedPage};
use crate::pipeline::sanitize;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::SCHEMA_PROMPT;
use crate::schema::{derive_form_id, FormSchema};
use crate::transport::{HttpTransport, ReqwestTransport};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extracts form schemas from PDF documents.
///
/// Cheap to clone; share one instance across requests.
///
/// # Example
/// ```rust,no_run
/// use formlift::{Document, ExtractorConfig, Provider, SchemaExtractor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = SchemaExtractor::from_config(ExtractorConfig::from_env()?)?;
/// let document = Document::from_path("enrollment.pdf")?;
/// let result = extractor.extract(&document, Provider::Claude).await?;
/// println!("{}: {}", result.form_id, result.schema);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SchemaExtractor {
    config: Arc<ExtractorConfig>,
    invoker: ModelInvoker,
    rasterizer: Arc<dyn PageRasterizer>,
    progress: ProgressCallback,
}

impl SchemaExtractor {
    pub fn new(
        config: Arc<ExtractorConfig>,
        transport: Arc<dyn HttpTransport>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        Self {
            invoker: ModelInvoker::new(transport, config.clone()),
            config,
            rasterizer,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Production wiring: reqwest transport and pdfium rasteriser.
    pub fn from_config(config: ExtractorConfig) -> Result<Self, ExtractError> {
        let rasterizer = Arc::new(PdfiumRasterizer::from_config(&config));
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::new(Arc::new(config), transport, rasterizer))
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Extract a schema from `document` using `provider`.
    ///
    /// # Errors
    /// - [`ExtractError::InputInvalid`] / [`ExtractError::NotAPdf`] before any work
    /// - [`ExtractError::ProviderNotConfigured`] before rendering
    /// - [`ExtractError::RasterizationFailed`] / [`ExtractError::HostEnvironment`]
    ///   when no page renders
    /// - [`ExtractError::TransientNetwork`] / [`ExtractError::UpstreamRejected`]
    ///   from the model call
    /// - [`ExtractError::ParseFailure`] when the answer is not a JSON object
    pub async fn extract(
        &self,
        document: &Document,
        provider: Provider,
    ) -> Result<ExtractedSchema, ExtractError> {
        let result = self.run(document, provider).await;
        match &result {
            Ok(schema) => self.progress.on_extraction_complete(&schema.form_id),
            Err(e) => {
                warn!("Schema extraction failed: {}", e);
                self.progress.on_extraction_error(&e.to_string());
            }
        }
        result
    }

    /// Read `path` and extract its schema.
    pub async fn extract_file(
        &self,
        path: impl AsRef<Path>,
        provider: Provider,
    ) -> Result<ExtractedSchema, ExtractError> {
        let document = Document::from_path(path)?;
        self.extract(&document, provider).await
    }

    /// The request sent for `pages`: the schema prompt, then one image
    /// block per page in document order.
    pub fn build_request(&self, provider: Provider, pages: &[RenderedPage]) -> ModelRequest {
        ModelRequest::new(
            self.config.model_for(provider),
            self.config.schema_max_tokens,
            Duration::from_secs(self.config.schema_timeout_secs),
        )
        .block(ContentBlock::text(SCHEMA_PROMPT))
        .blocks(pages.iter().map(|p| ContentBlock::png(p.to_base64())))
    }

    async fn run(
        &self,
        document: &Document,
        provider: Provider,
    ) -> Result<ExtractedSchema, ExtractError> {
        let started = Instant::now();
        document.validate_pdf()?;
        self.invoker.api_key(provider)?;
        info!(
            "Starting schema extraction: {} bytes, provider {}",
            document.len(),
            provider.display_name()
        );

        self.progress.on_render_start();
        let raster = rasterize(self.rasterizer.clone(), document.bytes().to_vec()).await?;
        if raster.pages.is_empty() {
            return Err(ExtractError::RasterizationFailed {
                detail: "no page could be rendered".into(),
            });
        }
        info!(
            "Rendered {}/{} page(s) in {:?}",
            raster.pages.len(),
            raster.page_count,
            started.elapsed()
        );
        self.progress
            .on_render_complete(raster.pages.len(), raster.page_count);

        let request = self.build_request(provider, &raster.pages);
        self.progress
            .on_model_call(provider.display_name(), request.payload_bytes());
        let response = self.invoker.invoke(provider, &request).await?;
        let text = response.into_text()?;
        debug!("Model answered with {} chars", text.len());

        let value = sanitize::parse_schema(&text)?;
        let cleaned = sanitize::sanitize(&text);
        let form_id = derive_form_id(&value);
        let summary = FormSchema::from_value(&value).map(|s| s.summary());
        if let Some(s) = &summary {
            info!(
                "Schema '{}': {} field(s), {} required, {} page(s)",
                form_id, s.field_count, s.required_count, s.page_count
            );
        }

        let mut notes = format!(
            "Schema generated successfully using {} AI. Please review and adjust as needed.",
            provider.display_name()
        );
        if !raster.skipped.is_empty() {
            notes.push_str(&format!(
                " {} page(s) could not be rendered and were not analysed.",
                raster.skipped.len()
            ));
        }

        info!("Schema extraction finished in {:?}", started.elapsed());
        Ok(ExtractedSchema {
            schema: cleaned,
            form_id,
            confidence: SCHEMA_CONFIDENCE,
            notes,
            provider,
            pages_sent: raster.pages.len(),
            skipped_pages: raster.skipped,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::render::{collect_pages, PageOutcome, RasterOutput};
    use crate::progress::ExtractionProgressCallback;
    use crate::transport::fake::{ScriptedTransport, Step};
    use crate::transport::TransportError;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakePages {
        outcomes: Vec<PageOutcome>,
        renders: AtomicUsize,
    }

    impl FakePages {
        fn new(outcomes: Vec<PageOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes,
                renders: AtomicUsize::new(0),
            })
        }
    }

    impl PageRasterizer for FakePages {
        fn render(&self, _document: &[u8]) -> Result<RasterOutput, ExtractError> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            collect_pages(150, self.outcomes.clone())
        }
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl ExtractionProgressCallback for Events {
        fn on_render_complete(&self, rendered: usize, total: usize) {
            self.0.lock().unwrap().push(format!("rendered {rendered}/{total}"));
        }
        fn on_extraction_complete(&self, form_id: &str) {
            self.0.lock().unwrap().push(format!("done {form_id}"));
        }
        fn on_extraction_error(&self, _error: &str) {
            self.0.lock().unwrap().push("error".into());
        }
    }

    fn config() -> Arc<ExtractorConfig> {
        Arc::new(
            ExtractorConfig::builder()
                .anthropic_api_key("sk-ant-test")
                .build()
                .unwrap(),
        )
    }

    fn pdf() -> Document {
        Document::pdf(b"%PDF-1.7\n%fake".to_vec())
    }

    fn claude_says(text: &str) -> Step {
        Step::json(200, json!({ "content": [{ "type": "text", "text": text }] }))
    }

    fn extractor(
        steps: Vec<Step>,
        pages: Arc<FakePages>,
    ) -> (SchemaExtractor, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(steps));
        (SchemaExtractor::new(config(), transport.clone(), pages), transport)
    }

    #[tokio::test]
    async fn three_pages_become_one_request() {
        let answer = "```json\n{\"title\":\"Enrollment\",\"x-form-config\":{\"formId\":\"enroll-a\"},\"properties\":{}}\n```";
        let pages = FakePages::new(vec![Ok(vec![1]), Ok(vec![2]), Ok(vec![3])]);
        let (ex, transport) = extractor(vec![claude_says(answer)], pages);

        let out = ex.extract(&pdf(), Provider::Claude).await.unwrap();
        assert_eq!(out.form_id, "enroll-a");
        assert_eq!(out.confidence, 85);
        assert_eq!(out.pages_sent, 3);
        assert!(out.notes.contains("Claude"));
        assert!(!out.schema.contains("```"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let body: Value = serde_json::from_slice(calls[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["max_tokens"], 16000);
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 4);
        assert_eq!(content[0]["type"], "text");
        let data: Vec<&str> = content[1..]
            .iter()
            .map(|b| b["source"]["data"].as_str().unwrap())
            .collect();
        assert_eq!(data, vec!["AQ==", "Ag==", "Aw=="]);
    }

    #[tokio::test]
    async fn skipped_pages_are_reported() {
        let pages = FakePages::new(vec![Ok(vec![1]), Err("broken stream".into())]);
        let (ex, _) = extractor(vec![claude_says("{\"title\":\"X Y\"}")], pages);
        let out = ex.extract(&pdf(), Provider::Claude).await.unwrap();
        assert_eq!(out.pages_sent, 1);
        assert_eq!(out.skipped_pages.len(), 1);
        assert_eq!(out.form_id, "x-y");
        assert!(out.notes.contains("1 page(s) could not be rendered"));
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_before_rendering() {
        let pages = FakePages::new(vec![Ok(vec![1])]);
        let (ex, transport) = extractor(vec![], pages.clone());
        let doc = Document::new(b"\x89PNG....".to_vec(), "image/png");
        let err = ex.extract(&doc, Provider::Claude).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputInvalid);
        assert_eq!(pages.renders.load(Ordering::SeqCst), 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_skip_rendering() {
        let pages = FakePages::new(vec![Ok(vec![1])]);
        let (ex, _) = extractor(vec![], pages.clone());
        let err = ex.extract(&pdf(), Provider::Google).await.unwrap_err();
        assert!(matches!(err, ExtractError::ProviderNotConfigured { .. }));
        assert_eq!(pages.renders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_answer_keeps_tail_fragment() {
        let pages = FakePages::new(vec![Ok(vec![1])]);
        let (ex, _) = extractor(vec![claude_says("I could not read this form, sorry.")], pages);
        let err = ex.extract(&pdf(), Provider::Claude).await.unwrap_err();
        match err {
            ExtractError::ParseFailure { fragment, .. } => {
                assert!(fragment.ends_with("sorry."))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_reset_surfaces_as_transient() {
        let pages = FakePages::new(vec![Ok(vec![1])]);
        let (ex, transport) = extractor(
            vec![
                Step::Fail(TransportError::ConnectionReset("rst".into())),
                Step::Fail(TransportError::ConnectionReset("rst".into())),
            ],
            pages,
        );
        let err = ex.extract(&pdf(), Provider::Claude).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn progress_sees_render_and_completion() {
        let pages = FakePages::new(vec![Ok(vec![1]), Ok(vec![2])]);
        let events = Arc::new(Events::default());
        let (ex, _) = extractor(vec![claude_says("{\"title\":\"Consent\"}")], pages);
        let ex = ex.with_progress(events.clone());
        ex.extract(&pdf(), Provider::Claude).await.unwrap();
        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["rendered 2/2".to_string(), "done consent".to_string()]
        );
    }

    #[tokio::test]
    async fn progress_sees_failure() {
        let pages = FakePages::new(vec![Ok(vec![1])]);
        let events = Arc::new(Events::default());
        let (ex, _) = extractor(vec![Step::json(400, json!({"error":{"message":"bad"}}))], pages);
        let ex = ex.with_progress(events.clone());
        let err = ex.extract(&pdf(), Provider::Claude).await.unwrap_err();
        assert!(matches!(err, ExtractError::UpstreamRejected { status: Some(400), .. }));
        assert_eq!(events.0.lock().unwrap().last().map(String::as_str), Some("error"));
    }
}
