//! Seed-and-propagate learning over a queue of unclassified documents.
//!
//! Each round takes the oldest queued document as a seed and asks a human,
//! through [`TemplateAuthor`], for a template. A confirmed template is
//! saved, cached, used on the seed, and then tried against everything still
//! queued: documents identified as that same vendor leave the queue.

use std::collections::VecDeque;

use image::GrayImage;
use tracing::{info, warn};

use crate::{
    config::{EngineConfig, FieldSpec},
    error::DocAnchorResult,
    extraction::{self, DocumentArchive, ExtractionRecord, QueuedDocument, RecordSink, TextExtractor},
    matching::{MatchResult, VendorIdentifier},
    projection::{FieldProjector, ProjectedField},
    template::{cache::TemplateCache, record::TemplateRecord, store::TemplateStore, Template},
};

/// The authoring front end. Blocks until the human confirms a template or
/// gives up, signalled by `None`.
pub trait TemplateAuthor {
    fn author(
        &mut self,
        seed: &GrayImage,
        schema: &[FieldSpec],
        existing_vendors: &[String],
    ) -> Option<Template>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearningState {
    #[default]
    Idle,
    SeedSelected,
    AwaitingHumanTemplate,
    TemplateConfirmed,
    TemplateCancelled,
    Propagating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// A template was saved; `propagated` names the queued documents it
    /// classified, in queue order.
    Confirmed {
        vendor_name: String,
        propagated: Vec<String>,
    },
    /// The author gave up on the seed.
    Cancelled { seed: String },
    /// The authored template could not be validated or saved.
    Rejected { seed: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningReport {
    pub confirmed: Vec<String>,
    pub unprocessed: Vec<String>,
    pub propagated: usize,
}

pub struct LearningOrchestrator<A, X, S, R> {
    config: EngineConfig,
    store: TemplateStore,
    identifier: VendorIdentifier,
    projector: FieldProjector,
    author: A,
    extractor: X,
    sink: S,
    archive: R,
    state: LearningState,
}

impl<A, X, S, R> LearningOrchestrator<A, X, S, R>
where
    A: TemplateAuthor,
    X: TextExtractor,
    S: RecordSink,
    R: DocumentArchive,
{
    pub fn new(
        config: EngineConfig,
        store: TemplateStore,
        author: A,
        extractor: X,
        sink: S,
        archive: R,
    ) -> Self {
        Self {
            identifier: VendorIdentifier::new(&config),
            config,
            store,
            projector: FieldProjector,
            author,
            extractor,
            sink,
            archive,
            state: LearningState::Idle,
        }
    }

    pub fn state(&self) -> LearningState {
        self.state
    }

    pub fn identifier(&self) -> &VendorIdentifier {
        &self.identifier
    }

    /// Runs rounds until the queue is empty.
    pub fn run(
        &mut self,
        cache: &mut TemplateCache,
        queue: &mut VecDeque<QueuedDocument>,
    ) -> LearningReport {
        let mut report = LearningReport::default();
        while let Some(outcome) = self.run_round(cache, queue) {
            match outcome {
                RoundOutcome::Confirmed {
                    vendor_name,
                    propagated,
                } => {
                    report.propagated += propagated.len();
                    report.confirmed.push(vendor_name);
                }
                RoundOutcome::Cancelled { seed } | RoundOutcome::Rejected { seed, .. } => {
                    report.unprocessed.push(seed)
                }
            }
        }
        info!(
            confirmed = report.confirmed.len(),
            unprocessed = report.unprocessed.len(),
            propagated = report.propagated,
            "learning finished"
        );
        report
    }

    /// One seed round. `None` when the queue is empty.
    pub fn run_round(
        &mut self,
        cache: &mut TemplateCache,
        queue: &mut VecDeque<QueuedDocument>,
    ) -> Option<RoundOutcome> {
        let seed = queue.pop_front()?;
        self.transition(LearningState::SeedSelected);
        info!(seed = %seed.name, remaining = queue.len(), "seed selected");

        self.transition(LearningState::AwaitingHumanTemplate);
        let existing = cache.vendor_names();
        let Some(template) = self.author.author(&seed.page, &self.config.fields, &existing) else {
            self.transition(LearningState::TemplateCancelled);
            self.archive.archive_unprocessed(&seed);
            self.transition(LearningState::Idle);
            return Some(RoundOutcome::Cancelled { seed: seed.name });
        };

        if let Err(e) = self.confirm(cache, &template) {
            warn!(seed = %seed.name, vendor = template.vendor_name(), error = %e, "template not accepted");
            self.transition(LearningState::TemplateCancelled);
            self.archive.archive_unprocessed(&seed);
            self.transition(LearningState::Idle);
            return Some(RoundOutcome::Rejected {
                seed: seed.name,
                reason: e.to_string(),
            });
        }
        self.transition(LearningState::TemplateConfirmed);

        // the seed is the page the boxes were drawn on
        let static_fields = self.projector.project(template.fields(), None);
        self.extract(&seed, template.vendor_name(), &static_fields);

        self.transition(LearningState::Propagating);
        let vendor_name = template.vendor_name().to_string();
        let propagated = self.propagate(cache, queue, &vendor_name);
        info!(vendor = %vendor_name, propagated = propagated.len(), remaining = queue.len(), "propagation done");
        self.transition(LearningState::Idle);

        Some(RoundOutcome::Confirmed {
            vendor_name,
            propagated,
        })
    }

    /// Validates, saves and caches a confirmed template. A vendor that was
    /// already known has its file replaced, so the cache is rebuilt instead
    /// of appended to.
    fn confirm(&mut self, cache: &mut TemplateCache, template: &Template) -> DocAnchorResult<()> {
        template.validate(&self.config)?;
        let vendor = template.vendor_name();
        let replaced = self.store.exists(vendor) || cache.contains(vendor);

        let record = TemplateRecord::from(template);
        self.store.save(vendor, &record)?;

        if replaced {
            cache.rebuild(&self.store, &self.config);
        } else {
            cache.append(&record, &self.config)?;
        }
        Ok(())
    }

    /// Identifies every queued document; those that match `vendor_name` are
    /// extracted and removed, the rest keep their order.
    fn propagate(
        &mut self,
        cache: &TemplateCache,
        queue: &mut VecDeque<QueuedDocument>,
        vendor_name: &str,
    ) -> Vec<String> {
        let mut propagated = Vec::new();
        for document in std::mem::take(queue) {
            match self.identifier.identify(cache, &document.page) {
                Some(result) if result.vendor_name == vendor_name => {
                    self.process(&document, &result);
                    propagated.push(document.name);
                }
                _ => queue.push_back(document),
            }
        }
        propagated
    }

    /// Production extraction for a matched document.
    pub fn process(&mut self, document: &QueuedDocument, result: &MatchResult) {
        let fields = self.projector.project_match(result);
        self.extract(document, &result.vendor_name, &fields);
    }

    fn extract(&mut self, document: &QueuedDocument, vendor_name: &str, fields: &[ProjectedField]) {
        let values = extraction::extract_fields(&self.extractor, &document.page, fields);
        self.sink.record(ExtractionRecord {
            document: document.name.clone(),
            vendor_name: vendor_name.to_string(),
            fields: values,
        });
    }

    fn transition(&mut self, next: LearningState) {
        info!(from = ?self.state, to = ?next, "learning state");
        self.state = next;
    }
}
