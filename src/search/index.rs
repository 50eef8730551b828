//! Search index seam and the in-memory implementation
//!
//! The store never touches documents directly; it talks to an
//! [`IndexClient`]. The in-memory index behaves like an external search
//! cluster: writes land immediately for realtime `get`, but only become
//! searchable after [`IndexClient::refresh`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rayon::prelude::*;
use thiserror::Error;

use crate::types::{Event, SortOrder, DEFAULT_PAGE_LIMIT};

use super::filter::{Field, Filter, SortKey};

/// Above this many candidates, filtering runs on the rayon pool
const PARALLEL_FILTER_THRESHOLD: usize = 1000;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("search index unavailable: {0}")]
    Unavailable(String),

    #[error("search index rejected document '{id}': {reason}")]
    Rejected { id: String, reason: String },

    #[error("search index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    /// Whether the same request may succeed if retried later
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Unavailable(_) | IndexError::Rejected { .. })
    }
}

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub filter: Filter,
    pub sort: SortOrder,
    pub offset: usize,
    pub limit: usize,
    /// Only return hits strictly after this key in sort order
    pub search_after: Option<SortKey>,
}

impl SearchRequest {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: SortOrder::Descending,
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
            search_after: None,
        }
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_window(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn with_search_after(mut self, key: Option<SortKey>) -> Self {
        self.search_after = key;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub hits: Vec<Event>,
    /// Matches of the filter, ignoring paging and `search_after`
    pub total: u64,
}

/// Partial update applied to a stored document
#[derive(Debug, Clone, PartialEq)]
pub enum EventPatch {
    SetFixed(bool),
    SetHidden(bool),
    SessionActivity {
        last_activity: DateTime<Utc>,
        is_session_end: bool,
    },
}

impl EventPatch {
    /// Apply to an event; returns whether it changed
    pub fn apply(&self, event: &mut Event) -> bool {
        match self {
            EventPatch::SetFixed(value) => {
                let changed = event.is_fixed != *value;
                event.is_fixed = *value;
                changed
            }
            EventPatch::SetHidden(value) => {
                let changed = event.is_hidden != *value;
                event.is_hidden = *value;
                changed
            }
            EventPatch::SessionActivity {
                last_activity,
                is_session_end,
            } => event.update_session_start(*last_activity, *is_session_end),
        }
    }
}

/// Operations the store needs from a search index
pub trait IndexClient: Send + Sync {
    /// Insert or replace documents by id
    fn index(&self, events: &[Event]) -> IndexResult<()>;

    /// Realtime lookup; sees writes before a refresh
    fn get(&self, id: &str) -> IndexResult<Option<Event>>;

    /// Realtime lookup of several ids; missing ids are skipped
    fn get_many(&self, ids: &[String]) -> IndexResult<Vec<Event>>;

    fn search(&self, request: &SearchRequest) -> IndexResult<SearchResponse>;

    fn count(&self, filter: &Filter) -> IndexResult<u64>;

    /// Patch one document; returns whether it existed and changed
    fn update(&self, id: &str, patch: &EventPatch) -> IndexResult<bool>;

    /// Patch several documents; returns how many changed
    fn bulk_update(&self, ids: &[String], patch: &EventPatch) -> IndexResult<usize>;

    /// Make every prior write visible to search
    fn refresh(&self) -> IndexResult<()>;
}

#[derive(Debug, Default)]
struct IndexState {
    /// id → latest document
    documents: HashMap<String, Event>,
    /// id → searchable document as of the last refresh
    visible: HashMap<String, Event>,
    /// stack_id → ids, over `visible`
    stack_index: HashMap<String, HashSet<String>>,
    /// organization_id → ids, over `visible`
    organization_index: HashMap<String, HashSet<String>>,
    /// ids written since the last refresh
    dirty: HashSet<String>,
}

impl IndexState {
    fn publish(&mut self, id: &str) {
        let Some(event) = self.documents.get(id).cloned() else {
            return;
        };

        if let Some(previous) = self.visible.get(id) {
            if previous.stack_id != event.stack_id {
                remove_posting(&mut self.stack_index, &previous.stack_id, id);
            }
            if previous.organization_id != event.organization_id {
                remove_posting(&mut self.organization_index, &previous.organization_id, id);
            }
        }

        self.stack_index
            .entry(event.stack_id.clone())
            .or_default()
            .insert(id.to_string());
        self.organization_index
            .entry(event.organization_id.clone())
            .or_default()
            .insert(id.to_string());
        self.visible.insert(id.to_string(), event);
    }

    /// Visible documents that could match `filter`
    fn candidates(&self, filter: &Filter) -> Vec<&Event> {
        let postings = filter
            .pinned_term(Field::Stack)
            .map(|stack| self.stack_index.get(stack))
            .or_else(|| {
                filter
                    .pinned_term(Field::Organization)
                    .map(|org| self.organization_index.get(org))
            });

        match postings {
            Some(Some(ids)) => ids.iter().filter_map(|id| self.visible.get(id)).collect(),
            Some(None) => Vec::new(),
            None => self.visible.values().collect(),
        }
    }

    fn matching(&self, filter: &Filter) -> Vec<&Event> {
        let candidates = self.candidates(filter);
        if candidates.len() > PARALLEL_FILTER_THRESHOLD {
            candidates
                .into_par_iter()
                .filter(|e| filter.matches(e))
                .collect()
        } else {
            candidates.into_iter().filter(|e| filter.matches(e)).collect()
        }
    }
}

/// `(occurrence date, id)` ordering without building [`SortKey`]s
fn key_order(a: &Event, b: &Event) -> std::cmp::Ordering {
    a.occurrence_date
        .cmp(&b.occurrence_date)
        .then_with(|| a.id.cmp(&b.id))
}

fn remove_posting(index: &mut HashMap<String, HashSet<String>>, key: &str, id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

/// Process-local index with refresh-gated visibility
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    state: RwLock<IndexState>,
    unavailable: AtomicBool,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backing cluster going away (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stored documents, visible or not
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Documents written since the last refresh
    pub fn pending_len(&self) -> usize {
        self.state.read().dirty.len()
    }

    fn check_available(&self) -> IndexResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("in-memory index is offline".to_string()));
        }
        Ok(())
    }
}

impl IndexClient for InMemoryIndex {
    fn index(&self, events: &[Event]) -> IndexResult<()> {
        self.check_available()?;
        if let Some(event) = events.iter().find(|e| e.id.is_empty()) {
            return Err(IndexError::Rejected {
                id: String::new(),
                reason: format!("event for stack '{}' has no id", event.stack_id),
            });
        }

        let mut state = self.state.write();
        for event in events {
            state.documents.insert(event.id.clone(), event.clone());
            state.dirty.insert(event.id.clone());
        }
        Ok(())
    }

    fn get(&self, id: &str) -> IndexResult<Option<Event>> {
        self.check_available()?;
        Ok(self.state.read().documents.get(id).cloned())
    }

    fn get_many(&self, ids: &[String]) -> IndexResult<Vec<Event>> {
        self.check_available()?;
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.documents.get(id).cloned())
            .collect())
    }

    fn search(&self, request: &SearchRequest) -> IndexResult<SearchResponse> {
        self.check_available()?;
        let state = self.state.read();

        let mut hits = state.matching(&request.filter);
        let total = hits.len() as u64;

        match request.sort {
            SortOrder::Descending => hits.sort_unstable_by(|a, b| key_order(b, a)),
            SortOrder::Ascending => hits.sort_unstable_by(|a, b| key_order(a, b)),
        }

        let start = match &request.search_after {
            Some(after) => hits.partition_point(|e| {
                let key = SortKey::of(e);
                match request.sort {
                    SortOrder::Descending => key >= *after,
                    SortOrder::Ascending => key <= *after,
                }
            }),
            None => 0,
        };

        let hits = hits
            .into_iter()
            .skip(start + request.offset)
            .take(request.limit)
            .cloned()
            .collect();

        Ok(SearchResponse { hits, total })
    }

    fn count(&self, filter: &Filter) -> IndexResult<u64> {
        self.check_available()?;
        let state = self.state.read();
        Ok(state.matching(filter).len() as u64)
    }

    fn update(&self, id: &str, patch: &EventPatch) -> IndexResult<bool> {
        self.check_available()?;
        let mut state = self.state.write();
        let changed = match state.documents.get_mut(id) {
            Some(event) => patch.apply(event),
            None => return Ok(false),
        };
        if changed {
            state.dirty.insert(id.to_string());
        }
        Ok(changed)
    }

    fn bulk_update(&self, ids: &[String], patch: &EventPatch) -> IndexResult<usize> {
        self.check_available()?;
        let mut state = self.state.write();
        let mut changed = 0;
        for id in ids {
            let applied = state
                .documents
                .get_mut(id)
                .map_or(false, |event| patch.apply(event));
            if applied {
                state.dirty.insert(id.clone());
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn refresh(&self) -> IndexResult<()> {
        self.check_available()?;
        let mut state = self.state.write();
        let dirty: Vec<String> = state.dirty.drain().collect();
        for id in &dirty {
            state.publish(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use chrono::Duration;

    fn event(id: &str, stack: &str, minutes_ago: i64) -> Event {
        let mut event = Event::new(
            "org",
            "proj",
            stack,
            EventKind::Log,
            Utc::now() - Duration::minutes(minutes_ago),
        );
        event.id = id.to_string();
        event
    }

    fn ids(response: &SearchResponse) -> Vec<&str> {
        response.hits.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_writes_are_invisible_until_refresh() {
        let index = InMemoryIndex::new();
        index.index(&[event("a", "s1", 0)]).unwrap();

        assert!(index.get("a").unwrap().is_some());
        assert_eq!(index.count(&Filter::All).unwrap(), 0);
        assert_eq!(index.pending_len(), 1);

        index.refresh().unwrap();
        assert_eq!(index.count(&Filter::All).unwrap(), 1);
        assert_eq!(index.pending_len(), 0);
    }

    #[test]
    fn test_search_sorts_and_pages() {
        let index = InMemoryIndex::new();
        index
            .index(&[event("a", "s1", 3), event("b", "s1", 1), event("c", "s1", 2)])
            .unwrap();
        index.refresh().unwrap();

        let response = index
            .search(&SearchRequest::new(Filter::All).with_window(1, 2))
            .unwrap();
        assert_eq!(response.total, 3);
        assert_eq!(ids(&response), vec!["c", "a"]);

        let ascending = index
            .search(&SearchRequest::new(Filter::All).with_sort(SortOrder::Ascending))
            .unwrap();
        assert_eq!(ids(&ascending), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_search_after_skips_seen_keys() {
        let index = InMemoryIndex::new();
        index
            .index(&[event("a", "s1", 3), event("b", "s1", 1), event("c", "s1", 2)])
            .unwrap();
        index.refresh().unwrap();

        let first = index
            .search(&SearchRequest::new(Filter::All).with_window(0, 1))
            .unwrap();
        assert_eq!(ids(&first), vec!["b"]);

        let after = SortKey::of(&first.hits[0]);
        let second = index
            .search(
                &SearchRequest::new(Filter::All)
                    .with_window(0, 5)
                    .with_search_after(Some(after)),
            )
            .unwrap();
        assert_eq!(ids(&second), vec!["c", "a"]);
        assert_eq!(second.total, 3);
    }

    #[test]
    fn test_stack_postings_follow_updates() {
        let index = InMemoryIndex::new();
        index.index(&[event("a", "s1", 0)]).unwrap();
        index.refresh().unwrap();

        index.index(&[event("a", "s2", 0)]).unwrap();
        index.refresh().unwrap();

        let s1 = Filter::term(Field::Stack, "s1");
        let s2 = Filter::term(Field::Stack, "s2");
        assert_eq!(index.count(&s1).unwrap(), 0);
        assert_eq!(index.count(&s2).unwrap(), 1);
    }

    #[test]
    fn test_updates_are_realtime_for_get_only() {
        let index = InMemoryIndex::new();
        index.index(&[event("a", "s1", 0)]).unwrap();
        index.refresh().unwrap();

        assert!(index.update("a", &EventPatch::SetFixed(true)).unwrap());
        assert!(!index.update("a", &EventPatch::SetFixed(true)).unwrap());
        assert!(!index.update("missing", &EventPatch::SetFixed(true)).unwrap());
        assert!(index.get("a").unwrap().unwrap().is_fixed);

        let fixed = Filter::flag(Field::Fixed, true);
        assert_eq!(index.count(&fixed).unwrap(), 0);
        index.refresh().unwrap();
        assert_eq!(index.count(&fixed).unwrap(), 1);
    }

    #[test]
    fn test_bulk_update_counts_changes() {
        let index = InMemoryIndex::new();
        index
            .index(&[event("a", "s1", 0), event("b", "s1", 0)])
            .unwrap();
        index.update("a", &EventPatch::SetHidden(true)).unwrap();

        let ids = vec!["a".to_string(), "b".to_string(), "zzz".to_string()];
        assert_eq!(index.bulk_update(&ids, &EventPatch::SetHidden(true)).unwrap(), 1);
    }

    #[test]
    fn test_unavailable_index_errors() {
        let index = InMemoryIndex::new();
        index.set_unavailable(true);
        let err = index.count(&Filter::All).unwrap_err();
        assert!(err.is_retryable());
        assert!(index.index(&[event("a", "s1", 0)]).is_err());

        index.set_unavailable(false);
        assert!(index.index(&[event("a", "s1", 0)]).is_ok());
    }

    #[test]
    fn test_rejects_documents_without_id() {
        let index = InMemoryIndex::new();
        let err = index.index(&[event("", "s1", 0)]).unwrap_err();
        assert!(matches!(err, IndexError::Rejected { .. }));
    }
}
