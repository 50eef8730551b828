//! Ordered execution of upgrade steps over a context

use std::time::Instant;

use tracing::{debug, warn};

use super::context::UpgradeContext;
use super::steps::{default_steps, UpgradeStep};
use super::CURRENT_SCHEMA_VERSION;

/// Runs every applicable [`UpgradeStep`] against a batch, in ascending
/// target-version order.
pub struct UpgradePipeline {
    steps: Vec<Box<dyn UpgradeStep>>,
}

impl UpgradePipeline {
    /// An empty pipeline; mostly useful in tests
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// The built-in legacy steps
    pub fn with_default_steps() -> Self {
        let mut pipeline = Self::new();
        for step in default_steps() {
            pipeline.register_step(step);
        }
        pipeline
    }

    /// Add a step, keeping steps ordered by target version. Steps with
    /// equal targets run in registration order.
    pub fn register_step(&mut self, step: Box<dyn UpgradeStep>) {
        self.steps.push(step);
        self.steps.sort_by_key(|s| s.target_version());
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Upgrade the context in place.
    ///
    /// Documents a step cannot handle are marked invalid and skipped by the
    /// remaining steps. Returns whether the context reached the current
    /// schema version.
    pub fn upgrade(&self, ctx: &mut UpgradeContext) -> bool {
        if !ctx.is_valid() {
            debug!(failure = ?ctx.failure(), "Skipping upgrade of invalid context");
            return false;
        }

        if ctx.version() >= CURRENT_SCHEMA_VERSION {
            return true;
        }

        let started = Instant::now();
        let from = ctx.version();

        for step in &self.steps {
            if !step.applies(ctx.version()) {
                continue;
            }

            for (index, document) in ctx.documents_mut().iter_mut().enumerate() {
                if !document.is_valid() {
                    continue;
                }
                let result = match document.node_mut().as_object_mut() {
                    Some(map) => step.upgrade_document(map),
                    None => Err(super::UpgradeError::NotAnObject),
                };
                if let Err(e) = result {
                    warn!(step = step.name(), document = index, error = %e, "Dropping document that failed to upgrade");
                    document.invalidate(format!("{}: {}", step.name(), e));
                }
            }

            ctx.advance_version(step.target_version());
        }

        if ctx.version() < CURRENT_SCHEMA_VERSION {
            let reason = format!("no upgrade path from schema version {}", from);
            warn!(version = %from, "Unknown schema version, dropping batch");
            ctx.invalidate(reason);
            return false;
        }

        debug!(
            from = %from,
            to = %ctx.version(),
            documents = ctx.documents().len(),
            invalid = ctx.invalid_count(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Upgraded document batch"
        );
        true
    }
}

impl Default for UpgradePipeline {
    fn default() -> Self {
        Self::with_default_steps()
    }
}
