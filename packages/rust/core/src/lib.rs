//! Content pipeline orchestration for seoflow.
//!
//! This crate ties storage, the LLM client, and the CMS client together
//! into the end-to-end workflows: context assembly, idea generation, draft
//! generation and refinement, and queued publishing.

pub mod context;
pub mod drafts;
pub mod fallback;
pub mod ideas;
pub mod import;
pub mod prompt;
pub mod publish;
pub mod refine;
pub mod worker;

pub use context::{ContextAssembler, ProfileChains};
pub use drafts::{DraftGenerator, DraftPayload, DraftRequest};
pub use ideas::{IdeaGenerator, StoreOutcome};
pub use import::{ImportBundle, ImportSummary, import_bundle};
pub use publish::{ConnectionResolver, EnqueueRequest, PublishOverrides, PublishService};
pub use refine::{CallToAction, DraftRefiner, Refinement};
pub use worker::{
    JobOutcome, ProgressReporter, PublishQueue, PublishWorker, SilentProgress, StorageQueue,
};
