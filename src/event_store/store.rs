//! Event Store - persistence and retrieval of canonical events
//!
//! The store owns no documents itself. It validates and stamps events,
//! hands them to an [`IndexClient`], and turns store operations into index
//! searches with the canonical `(date, id)` ordering.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::search::{
    parse_query, EventPatch, Field, Filter, InMemoryIndex, IndexClient, SearchRequest,
};
use crate::types::{
    DateRange, Event, EventKind, FindResults, PagingOptions, SortOrder,
};
use crate::utils::new_event_id;

use super::config::StoreConfig;
use super::error::{StoreError, StoreResult};
use super::notify::{ChangeNotifier, EntityChanged, NullNotifier};

pub struct EventStore<I: IndexClient = InMemoryIndex> {
    pub(super) index: Arc<I>,
    pub(super) config: StoreConfig,
    pub(super) notifier: Arc<dyn ChangeNotifier>,
}

impl<I: IndexClient> EventStore<I> {
    /// Store over `index` with default configuration and no notifications
    pub fn new(index: Arc<I>) -> Self {
        Self::with_config(index, StoreConfig::default())
    }

    pub fn with_config(index: Arc<I>, config: StoreConfig) -> Self {
        Self {
            index,
            config,
            notifier: Arc::new(NullNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<I> {
        &self.index
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Persist one event, returning it with its assigned id
    pub fn add(&self, event: Event, send_notification: bool) -> StoreResult<Event> {
        let mut added = self.add_many(vec![event], send_notification)?;
        added
            .pop()
            .ok_or_else(|| StoreError::InvalidEvent("nothing was added".to_string()))
    }

    /// Persist a batch. Every event is validated before any is written.
    pub fn add_many(&self, events: Vec<Event>, send_notification: bool) -> StoreResult<Vec<Event>> {
        if events.is_empty() {
            return Ok(events);
        }

        let now = Utc::now();
        let mut prepared = Vec::with_capacity(events.len());
        for mut event in events {
            validate(&event)?;
            if event.id.is_empty() {
                event.id = new_event_id();
            }
            event.created_utc = now;
            event.ensure_session_state();
            prepared.push(event);
        }

        self.index.index(&prepared)?;
        debug!(count = prepared.len(), "Added events");

        if send_notification {
            let mut by_organization: BTreeMap<&str, Vec<String>> = BTreeMap::new();
            for event in &prepared {
                by_organization
                    .entry(event.organization_id.as_str())
                    .or_default()
                    .push(event.id.clone());
            }
            for (organization_id, ids) in by_organization {
                self.notifier.notify(EntityChanged::added(organization_id, ids));
            }
        }

        Ok(prepared)
    }

    /// Visibility barrier: blocks until prior writes are searchable
    pub fn refresh(&self) -> StoreResult<()> {
        self.index.refresh()?;
        Ok(())
    }

    /// Record session activity. Returns false for unknown ids, non-session
    /// events, and sessions that are already closed.
    pub fn update_session_start(
        &self,
        id: &str,
        last_activity: DateTime<Utc>,
        is_session_end: bool,
    ) -> StoreResult<bool> {
        let patch = EventPatch::SessionActivity {
            last_activity,
            is_session_end,
        };
        Ok(self.index.update(id, &patch)?)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn get_by_id(&self, id: &str) -> StoreResult<Option<Event>> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self.index.get(id)?)
    }

    pub fn get_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.index.get_many(ids)?)
    }

    /// Number of searchable events
    pub fn count(&self) -> StoreResult<u64> {
        Ok(self.index.count(&Filter::All)?)
    }

    pub fn count_by_query(&self, query: &str) -> StoreResult<u64> {
        let filter = parse_query(query, Utc::now())?;
        Ok(self.index.count(&filter)?)
    }

    // ========================================================================
    // Listings (date descending, then id descending)
    // ========================================================================

    pub fn get_by_organization_id(
        &self,
        organization_id: &str,
        paging: PagingOptions,
    ) -> StoreResult<FindResults<Event>> {
        self.find(
            Filter::term(Field::Organization, organization_id),
            SortOrder::Descending,
            paging,
        )
    }

    /// Events in any of `organization_ids` matching `query`
    pub fn get_by_organization_ids(
        &self,
        organization_ids: &[String],
        query: &str,
        paging: PagingOptions,
    ) -> StoreResult<FindResults<Event>> {
        let scope = match organization_ids {
            [] => return Ok(FindResults::empty(paging.page())),
            [single] => Filter::term(Field::Organization, single.as_str()),
            many => Filter::Or(
                many.iter()
                    .map(|id| Filter::term(Field::Organization, id.as_str()))
                    .collect(),
            ),
        };
        let filter = scope.and(parse_query(query, Utc::now())?);
        self.find(filter, SortOrder::Descending, paging)
    }

    pub fn get_by_project_id(
        &self,
        project_id: &str,
        paging: PagingOptions,
    ) -> StoreResult<FindResults<Event>> {
        self.find(
            Filter::term(Field::Project, project_id),
            SortOrder::Descending,
            paging,
        )
    }

    /// All events of a stack, hidden ones included
    pub fn get_by_stack_id(
        &self,
        stack_id: &str,
        paging: PagingOptions,
    ) -> StoreResult<FindResults<Event>> {
        self.find(
            Filter::term(Field::Stack, stack_id),
            SortOrder::Descending,
            paging,
        )
    }

    pub fn get_by_reference_id(
        &self,
        project_id: &str,
        reference_id: &str,
    ) -> StoreResult<FindResults<Event>> {
        let filter = Filter::term(Field::Project, project_id)
            .and(Filter::term(Field::Reference, reference_id));
        self.find(filter, SortOrder::Descending, PagingOptions::new())
    }

    /// Structured query limited to an occurrence-date window
    pub fn get_by_filter(
        &self,
        query: &str,
        sort: SortOrder,
        range: DateRange,
        paging: PagingOptions,
    ) -> StoreResult<FindResults<Event>> {
        let filter = parse_query(query, Utc::now())?.and(Filter::occurred_within(&range));
        self.find(filter, sort, paging)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Sessions not yet ended that began at or before `cutoff`, whatever
    /// their last activity. Used to find sessions that may have been
    /// abandoned and need closing.
    pub fn get_open_sessions(
        &self,
        cutoff: DateTime<Utc>,
        paging: PagingOptions,
    ) -> StoreResult<FindResults<Event>> {
        let filter = unclosed_sessions().and(Filter::DateRange {
            field: Field::Date,
            lower: Bound::Unbounded,
            upper: Bound::Included(cutoff),
        });
        self.find(filter, SortOrder::Descending, paging)
    }

    /// Sessions not yet ended whose last activity is at or after `since`
    pub fn get_active_sessions(
        &self,
        since: DateTime<Utc>,
        paging: PagingOptions,
    ) -> StoreResult<FindResults<Event>> {
        let filter = unclosed_sessions().and(Filter::DateRange {
            field: Field::SessionStart,
            lower: Bound::Included(since),
            upper: Bound::Unbounded,
        });
        self.find(filter, SortOrder::Descending, paging)
    }

    pub(super) fn find(
        &self,
        filter: Filter,
        sort: SortOrder,
        paging: PagingOptions,
    ) -> StoreResult<FindResults<Event>> {
        let page = paging.page();
        let limit = paging.resolved_limit(self.config.default_page_limit, self.config.max_page_limit);
        let offset = paging.offset(limit);

        let request = SearchRequest::new(filter)
            .with_sort(sort)
            .with_window(offset, limit);
        let response = self.index.search(&request)?;

        let has_more = ((offset + response.hits.len()) as u64) < response.total;
        Ok(FindResults {
            documents: response.hits,
            total: response.total,
            page,
            has_more,
        })
    }
}

fn unclosed_sessions() -> Filter {
    Filter::term(Field::Kind, EventKind::Session.as_str())
        .and(Filter::flag(Field::SessionEnd, false))
}

fn validate(event: &Event) -> StoreResult<()> {
    let missing = [
        ("organization_id", &event.organization_id),
        ("project_id", &event.project_id),
        ("stack_id", &event.stack_id),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());

    match missing {
        Some((field, _)) => Err(StoreError::InvalidEvent(format!("{} is required", field))),
        None => Ok(()),
    }
}
