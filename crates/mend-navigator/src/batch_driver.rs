//! Drives one loop invocation per planned batch of editable files.
//!
//! Large contexts do not fit in one request, so the editable files are split
//! into batches sized by the scheduler and the same instruction is run once
//! per batch. Read-only files ride along in every batch; edited paths are
//! unioned across runs.

use anyhow::Result;

use mend_context::{
    estimate_tokens, BatchConfig, BatchPlanItem, BatchScheduler, FileContextStore, FileMode,
};
use mend_core::ContextError;

use crate::navigator::NavigatorLoop;

pub struct BatchDriver {
    scheduler: BatchScheduler,
}

impl BatchDriver {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            scheduler: BatchScheduler::new(config),
        }
    }

    /// Run `instruction` once per batch of the loop's current editable files.
    /// The loop's full context is restored afterwards.
    pub async fn run(&self, nav: &mut NavigatorLoop, instruction: &str) -> Result<Vec<String>> {
        let snapshot = nav.context().snapshot();
        if snapshot.is_empty() {
            return Err(ContextError::EmptyContext.into());
        }
        let readonly: Vec<String> = snapshot
            .iter()
            .filter(|f| f.mode == FileMode::ReadOnly)
            .map(|f| f.path.clone())
            .collect();

        let items: Vec<BatchPlanItem> = snapshot
            .iter()
            .filter(|f| f.mode == FileMode::Editable)
            .map(|f| {
                let content = nav.files.read(&f.path).unwrap_or_default();
                BatchPlanItem {
                    path: f.path.clone(),
                    is_editable: true,
                    tokens: nav.model.token_count(&content),
                }
            })
            .collect();

        // Keep the store's size bookkeeping current with what was read.
        // Read-only files skip the scheduler, so a rough estimate is enough
        // for them.
        for item in &items {
            let _ = nav.store.set_token_count(&item.path, item.tokens);
        }
        let readonly_sizes: Vec<(String, usize)> = readonly
            .iter()
            .map(|p| {
                let content = nav.files.read(p).unwrap_or_default();
                (p.clone(), estimate_tokens(&content))
            })
            .collect();
        for (path, tokens) in &readonly_sizes {
            let _ = nav.store.set_token_count(path, *tokens);
        }

        if items.is_empty() {
            return nav.run(instruction).await;
        }

        let plan = self.scheduler.plan(items.clone());
        tracing::info!(batches = plan.len(), "running batched instruction");

        let mut edited: Vec<String> = Vec::new();
        for batch in plan {
            let mut store = FileContextStore::new();
            for path in &readonly {
                store.add(path, FileMode::ReadOnly);
            }
            for item in &batch {
                store.add(&item.path, FileMode::Editable);
            }
            nav.store = store;

            for path in nav.run(instruction).await? {
                if !edited.contains(&path) {
                    edited.push(path);
                }
            }
        }

        let mut restored = FileContextStore::new();
        for entry in &snapshot {
            restored.add(&entry.path, entry.mode);
        }
        for item in &items {
            let _ = restored.set_token_count(&item.path, item.tokens);
        }
        for (path, tokens) in &readonly_sizes {
            let _ = restored.set_token_count(path, *tokens);
        }
        nav.store = restored;
        Ok(edited)
    }
}
