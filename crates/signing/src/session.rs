use std::time::{Duration, Instant};

use doc_model::{FieldId, FieldStore, PageMetrics, SignatureContent, SignatureKind, SignerConfig};
use viewer_core::{
    DocumentViewport, DragController, DragOutcome, PlacementContext, PointerEvent,
    ViewportAdapter, ViewportError,
};

use crate::{
    ArtifactHandle, ArtifactRegistry, Notice, SignedArtifact, SigningEngine, SigningError,
    SigningInput, ViewportCapture,
};

/// One signing workflow over one document: placement, filling and signing.
#[derive(Debug)]
pub struct SigningSession {
    config: SignerConfig,
    store: FieldStore,
    viewport: DocumentViewport,
    drag: DragController,
    engine: SigningEngine,
    artifacts: ArtifactRegistry,
    tool: SignatureKind,
    document_name: Option<String>,
    notices: Vec<Notice>,
}

impl SigningSession {
    pub fn new(config: SignerConfig) -> Self {
        let engine = SigningEngine::from_config(&config);
        let artifacts = ArtifactRegistry::new(Duration::from_millis(config.release_delay_ms));
        Self {
            config,
            store: FieldStore::default(),
            viewport: DocumentViewport::new(),
            drag: DragController::new(),
            engine,
            artifacts,
            tool: SignatureKind::default(),
            document_name: None,
            notices: Vec::new(),
        }
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut FieldStore {
        &mut self.store
    }

    pub fn viewport(&self) -> &DocumentViewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut DocumentViewport {
        &mut self.viewport
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn artifacts(&self) -> &ArtifactRegistry {
        &self.artifacts
    }

    pub fn artifacts_mut(&mut self) -> &mut ArtifactRegistry {
        &mut self.artifacts
    }

    pub fn tool(&self) -> SignatureKind {
        self.tool
    }

    pub fn set_tool(&mut self, tool: SignatureKind) {
        self.tool = tool;
    }

    /// Drains the notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Replaces the document. Fields from a previous document are dropped.
    pub fn load_document(
        &mut self,
        bytes: Vec<u8>,
        name: Option<String>,
    ) -> Result<PageMetrics, ViewportError> {
        self.drag.exit_placement_mode();
        self.store.reset();

        match self.viewport.load(bytes) {
            Ok(metrics) => {
                self.store.set_page_count(metrics.page_count());
                self.notices.push(Notice::info(
                    "Document loaded",
                    format!("{} page(s) ready for signing.", metrics.page_count()),
                ));
                self.document_name = name;
                Ok(metrics)
            }
            Err(err) => {
                self.document_name = None;
                self.notices.push(Notice::destructive("Could not open document", err.to_string()));
                Err(err)
            }
        }
    }

    /// Arms placement: the next click on the document creates a field.
    pub fn add_field(&mut self) -> bool {
        let armed = self.drag.enter_placement_mode();
        if armed {
            self.notices.push(Notice::info(
                "Place signature field",
                "Click on the document where the signature should go.",
            ));
        }
        armed
    }

    pub fn handle_pointer(
        &mut self,
        event: PointerEvent,
        adapter: &mut dyn ViewportAdapter,
    ) -> DragOutcome {
        let (width, height) = self.config.field_size();
        let context = PlacementContext {
            page: self.viewport.current_page(),
            kind: self.tool,
            width,
            height,
        };

        let outcome = self.drag.handle(event, &context, adapter, &mut self.store);
        if let DragOutcome::Created(id) = outcome {
            let name = self.config.profile.name.trim();
            if self.tool == SignatureKind::Type && !name.is_empty() {
                let text = name.to_owned();
                self.store.set_content(id, SignatureContent::Type { text });
            }
            self.notices.push(Notice::info(
                "Signature field added",
                format!("Field placed on page {}.", context.page),
            ));
        }
        outcome
    }

    /// Fills the selected field.
    pub fn save_signature(&mut self, content: SignatureContent) -> Result<FieldId, SigningError> {
        let Some(id) = self.store.selected() else {
            self.notices.push(Notice::destructive(
                "No field selected",
                "Select a signature field before saving a signature.",
            ));
            return Err(SigningError::NoSelection);
        };

        if !self.store.set_content(id, content) {
            return Err(SigningError::UnknownField(id));
        }
        self.notices.push(Notice::info("Signature saved", "The signature was added to the field."));
        Ok(id)
    }

    pub fn signer_name(&self) -> &str {
        &self.config.profile.name
    }

    /// Updates the signer profile. A selected typed field follows the name.
    pub fn set_signer_name(&mut self, name: impl Into<String>) {
        self.config.profile.name = name.into();

        let selected_typed = self
            .store
            .selected()
            .and_then(|id| self.store.get(id))
            .filter(|field| field.kind == SignatureKind::Type)
            .map(|field| field.id);
        if let Some(id) = selected_typed {
            let text = self.config.profile.name.clone();
            self.store.set_content(id, SignatureContent::Type { text });
        }
    }

    /// Checks that there is something to sign.
    pub fn preflight(&mut self) -> Result<(), SigningError> {
        let readiness = self.store.readiness();
        if readiness.total == 0 {
            self.notices.push(Notice::destructive(
                "Nothing to sign",
                "Add at least one signature field first.",
            ));
            return Err(SigningError::NoFields);
        }

        if readiness.incomplete > 0 {
            let message = format!("{} signature field(s) are still empty.", readiness.incomplete);
            if self.config.require_complete {
                self.notices.push(Notice::destructive("Empty signature fields", message));
                return Err(SigningError::IncompleteFields {
                    incomplete: readiness.incomplete,
                    total: readiness.total,
                });
            }
            self.notices.push(Notice::warning("Empty signature fields", message));
        }
        Ok(())
    }

    /// Produces the signed artifact, publishes it and starts its download.
    pub fn sign(
        &mut self,
        adapter: &mut dyn ViewportAdapter,
        capture: &mut dyn ViewportCapture,
        now: Instant,
    ) -> Result<ArtifactHandle, SigningError> {
        let released = self.artifacts.sweep(now);
        if released > 0 {
            log::debug!("released {released} expired artifact(s)");
        }
        if let Some(id) = self.drag.cancel(adapter) {
            log::debug!("drag of field {id} ended by signing");
        }
        self.drag.exit_placement_mode();
        self.viewport.poll(adapter);

        self.preflight()?;

        let result = self.run_engine(adapter, capture);
        let artifact = match result {
            Ok(artifact) => artifact,
            Err(err) => {
                self.notices.push(Notice::destructive("Signing failed", err.to_string()));
                return Err(err);
            }
        };

        self.notices.extend(artifact.notices);
        let handle = self.artifacts.publish(artifact.bytes, artifact.filename);
        self.artifacts.trigger_download(handle, now);
        Ok(handle)
    }

    fn run_engine(
        &self,
        adapter: &dyn ViewportAdapter,
        capture: &mut dyn ViewportCapture,
    ) -> Result<SignedArtifact, SigningError> {
        let bytes = self.viewport.document_bytes().map_err(|_| SigningError::NoDocument)?;
        let page = self.viewport.page_metrics().ok_or(SigningError::NoDocument)?;
        let viewport = self.viewport.viewport_metrics().ok_or(SigningError::NoViewport)?;
        let fields = self.store.snapshot();

        let input = SigningInput {
            bytes,
            fields: &fields,
            viewport,
            page,
            current_page: self.viewport.current_page(),
            scroll: adapter.scroll_offset().unwrap_or_default(),
            original_name: self.document_name.as_deref(),
        };
        self.engine.sign(&input, capture)
    }

    /// Ends any drag and releases its listeners. Call before dropping the
    /// session.
    pub fn teardown(&mut self, adapter: &mut dyn ViewportAdapter) {
        self.drag.cancel(adapter);
    }
}
