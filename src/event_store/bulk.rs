//! Bulk flag mutations
//!
//! Bulk operations page through their matches with `search_after` on the
//! sort key and patch each page by id, so memory use is bounded by the
//! batch size no matter how many documents match. Documents inserted while
//! an operation runs may or may not be included.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::search::{EventPatch, Field, Filter, IndexClient, SearchRequest, SortKey};
use crate::types::{DateRange, SortOrder};

use super::error::{StoreError, StoreResult};
use super::notify::EntityChanged;
use super::store::EventStore;

/// Cooperative cancellation for long-running bulk operations. Checked
/// between batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl<I: IndexClient> EventStore<I> {
    /// Set the fixed flag on every event of a stack. Returns how many
    /// events changed; re-running with the same flag changes nothing.
    pub fn update_fixed_by_stack(
        &self,
        organization_id: &str,
        stack_id: &str,
        is_fixed: bool,
        send_notifications: bool,
    ) -> StoreResult<usize> {
        self.update_fixed_by_stack_with_cancellation(
            organization_id,
            stack_id,
            is_fixed,
            send_notifications,
            &CancellationFlag::new(),
        )
    }

    pub fn update_fixed_by_stack_with_cancellation(
        &self,
        organization_id: &str,
        stack_id: &str,
        is_fixed: bool,
        send_notifications: bool,
        cancellation: &CancellationFlag,
    ) -> StoreResult<usize> {
        let filter = Filter::term(Field::Organization, organization_id)
            .and(Filter::term(Field::Stack, stack_id))
            .and(Filter::flag(Field::Fixed, !is_fixed));

        let changed = self.patch_matching(
            "update_fixed_by_stack",
            filter,
            EventPatch::SetFixed(is_fixed),
            cancellation,
        )?;

        if send_notifications && changed > 0 {
            self.notifier
                .notify(EntityChanged::stack_saved(organization_id, stack_id, changed));
        }
        Ok(changed)
    }

    /// Hide every event from `client_ip` that occurred between `start` and
    /// `end` inclusive, across all stacks. Hidden events stay retrievable.
    pub fn hide_all_by_client_ip_and_date(
        &self,
        organization_id: &str,
        client_ip: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<usize> {
        self.hide_all_by_client_ip_and_date_with_cancellation(
            organization_id,
            client_ip,
            start,
            end,
            &CancellationFlag::new(),
        )
    }

    pub fn hide_all_by_client_ip_and_date_with_cancellation(
        &self,
        organization_id: &str,
        client_ip: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancellation: &CancellationFlag,
    ) -> StoreResult<usize> {
        let filter = Filter::term(Field::Organization, organization_id)
            .and(Filter::term(Field::ClientIp, client_ip))
            .and(Filter::occurred_within(&DateRange::between(start, end)))
            .and(Filter::flag(Field::Hidden, false));

        self.patch_matching(
            "hide_all_by_client_ip_and_date",
            filter,
            EventPatch::SetHidden(true),
            cancellation,
        )
    }

    fn patch_matching(
        &self,
        operation: &'static str,
        filter: Filter,
        patch: EventPatch,
        cancellation: &CancellationFlag,
    ) -> StoreResult<usize> {
        let started = Instant::now();
        let batch_size = self.config.bulk_batch_size.max(1);
        let mut search_after: Option<SortKey> = None;
        let mut processed = 0usize;
        let mut batches = 0usize;

        loop {
            if cancellation.is_cancelled() {
                warn!(operation, processed, batches, "Bulk operation cancelled");
                return Err(StoreError::Cancelled { processed });
            }

            let request = SearchRequest::new(filter.clone())
                .with_sort(SortOrder::Ascending)
                .with_window(0, batch_size)
                .with_search_after(search_after.take());
            let response = self.index.search(&request)?;

            let Some(last) = response.hits.last() else {
                break;
            };
            search_after = Some(SortKey::of(last));

            let ids: Vec<String> = response.hits.iter().map(|e| e.id.clone()).collect();
            processed += self.index.bulk_update(&ids, &patch)?;
            batches += 1;
            debug!(operation, batch = batches, size = ids.len(), processed, "Patched batch");

            if ids.len() < batch_size {
                break;
            }
        }

        info!(
            operation,
            processed,
            batches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bulk operation complete"
        );
        Ok(processed)
    }
}
