//! Previous/next navigation inside a stack
//!
//! Navigation walks a stack in chronological order, `(date, id)`
//! ascending, which is the reverse of listing order.

use std::ops::Bound;

use tracing::debug;

use crate::search::{Field, Filter, IndexClient, SearchRequest, SortKey};
use crate::types::{DateRange, Event, PreviousAndNextEventIds, SortOrder};

use super::error::StoreResult;
use super::store::EventStore;

impl<I: IndexClient> EventStore<I> {
    /// Chronological neighbours of an event within its stack. Unknown ids
    /// have no neighbours.
    pub fn get_previous_and_next_event_ids(&self, id: &str) -> StoreResult<PreviousAndNextEventIds> {
        let Some(event) = self.get_by_id(id)? else {
            return Ok(PreviousAndNextEventIds::default());
        };

        // A window reaching past the representable range leaves that end open.
        let range = match self.config.navigation_window {
            Some(window) => DateRange {
                start: event.occurrence_date.checked_sub_signed(window),
                end: event.occurrence_date.checked_add_signed(window),
            },
            None => DateRange::unbounded(),
        };
        self.neighbours(&event, range)
    }

    /// Like [`Self::get_previous_and_next_event_ids`], only considering
    /// events that occurred within `range`
    pub fn get_previous_and_next_event_ids_within(
        &self,
        id: &str,
        range: DateRange,
    ) -> StoreResult<PreviousAndNextEventIds> {
        match self.get_by_id(id)? {
            Some(event) => self.neighbours(&event, range),
            None => Ok(PreviousAndNextEventIds::default()),
        }
    }

    fn neighbours(&self, event: &Event, range: DateRange) -> StoreResult<PreviousAndNextEventIds> {
        let anchor = SortKey::of(event);
        let scope = Filter::term(Field::Stack, event.stack_id.as_str())
            .and(Filter::occurred_within(&range));

        let previous = self.first_id(
            scope.clone().and(Filter::KeyRange {
                lower: Bound::Unbounded,
                upper: Bound::Excluded(anchor.clone()),
            }),
            SortOrder::Descending,
        )?;
        let next = self.first_id(
            scope.and(Filter::KeyRange {
                lower: Bound::Excluded(anchor),
                upper: Bound::Unbounded,
            }),
            SortOrder::Ascending,
        )?;

        debug!(id = %event.id, ?previous, ?next, "Resolved event neighbours");
        Ok(PreviousAndNextEventIds { previous, next })
    }

    fn first_id(&self, filter: Filter, sort: SortOrder) -> StoreResult<Option<String>> {
        let request = SearchRequest::new(filter).with_sort(sort).with_window(0, 1);
        let response = self.index.search(&request)?;
        Ok(response.hits.into_iter().next().map(|e| e.id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use crate::event_store::{EventStore, StoreConfig};
    use crate::search::InMemoryIndex;
    use crate::types::{DateRange, Event, EventKind};

    fn add(store: &EventStore, id: &str, stack: &str, minutes: i64, base: chrono::DateTime<Utc>) {
        let mut event = Event::new("org", "proj", stack, EventKind::Error, base + Duration::minutes(minutes));
        event.id = id.to_string();
        store.add(event, false).unwrap();
    }

    #[test]
    fn test_neighbours_stay_in_stack() {
        let store = EventStore::new(Arc::new(InMemoryIndex::new()));
        let base = Utc::now();
        add(&store, "a", "s1", 0, base);
        add(&store, "b", "s2", 1, base);
        add(&store, "c", "s1", 2, base);
        store.refresh().unwrap();

        let nav = store.get_previous_and_next_event_ids("c").unwrap();
        assert_eq!(nav.previous.as_deref(), Some("a"));
        assert_eq!(nav.next, None);

        let unknown = store.get_previous_and_next_event_ids("zzz").unwrap();
        assert_eq!(unknown.previous, None);
        assert_eq!(unknown.next, None);
    }

    #[test]
    fn test_navigation_window_limits_reach() {
        let config = StoreConfig::default().with_navigation_window(Some(Duration::minutes(30)));
        let store = EventStore::with_config(Arc::new(InMemoryIndex::new()), config);
        let base = Utc::now() - Duration::hours(5);
        add(&store, "a", "s1", 0, base);
        add(&store, "b", "s1", 120, base);
        add(&store, "c", "s1", 130, base);
        store.refresh().unwrap();

        let nav = store.get_previous_and_next_event_ids("b").unwrap();
        assert_eq!(nav.previous, None);
        assert_eq!(nav.next.as_deref(), Some("c"));

        let within = store
            .get_previous_and_next_event_ids_within(
                "b",
                DateRange::between(base - Duration::minutes(1), base + Duration::hours(3)),
            )
            .unwrap();
        assert_eq!(within.previous.as_deref(), Some("a"));
        assert_eq!(within.next.as_deref(), Some("c"));
    }

    #[test]
    fn test_huge_navigation_window_is_unbounded() {
        let config = StoreConfig::default().with_navigation_window(Some(Duration::MAX));
        let store = EventStore::with_config(Arc::new(InMemoryIndex::new()), config);
        let base = Utc::now();
        add(&store, "a", "s1", 0, base);
        add(&store, "b", "s1", 10, base);
        store.refresh().unwrap();

        let nav = store.get_previous_and_next_event_ids("b").unwrap();
        assert_eq!(nav.previous.as_deref(), Some("a"));
        assert_eq!(nav.next, None);
    }
}
