use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::api::{self, PageQuery};
use crate::config::FeedConfig;
use crate::error::Result;
use crate::models::{Item, ItemId, ItemKind, LikeState, UserId};

/// Filter context for a listing: global or a single author's items.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedScope {
    pub kind: ItemKind,
    pub author: Option<UserId>,
}

impl FeedScope {
    pub fn posts() -> Self {
        Self {
            kind: ItemKind::Post,
            author: None,
        }
    }

    pub fn videos() -> Self {
        Self {
            kind: ItemKind::Video,
            author: None,
        }
    }

    pub fn by_author(mut self, author: UserId) -> Self {
        self.author = Some(author);
        self
    }

    pub fn page_size(&self, cfg: &FeedConfig) -> u32 {
        match self.kind {
            ItemKind::Post => cfg.post_page_size.max(1),
            ItemKind::Video => cfg.video_page_size.max(1),
        }
    }
}

impl fmt::Display for FeedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.author {
            Some(author) => write!(f, "{} by {}", self.kind.collection(), author),
            None => f.write_str(self.kind.collection()),
        }
    }
}

/// A fetched batch, merged into a [`FeedStore`] and then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub scope: FeedScope,
    pub page: u64,
    pub limit: u32,
    pub items: Vec<Item>,
}

impl FeedPage {
    pub fn offset(&self) -> u64 {
        self.page * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub added: usize,
    pub duplicates: usize,
    pub exhausted: bool,
}

pub trait FeedService: Send + Sync {
    fn fetch_page(&self, scope: &FeedScope, page: u64, limit: u32) -> Result<Vec<Item>>;
}

pub struct ApiFeedService {
    client: Arc<api::Client>,
}

impl ApiFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for ApiFeedService {
    fn fetch_page(&self, scope: &FeedScope, page: u64, limit: u32) -> Result<Vec<Item>> {
        let query = PageQuery::for_page(scope.author.clone(), page, limit);
        self.client.list_items(scope.kind, query)
    }
}

/// Ordered, id-unique items loaded so far for one scope.
#[derive(Debug, Clone)]
pub struct FeedStore {
    scope: FeedScope,
    limit: u32,
    items: Vec<Item>,
    seen: HashSet<ItemId>,
    page: u64,
    has_more: bool,
}

impl FeedStore {
    pub fn new(scope: FeedScope, limit: u32) -> Self {
        Self {
            scope,
            limit: limit.max(1),
            items: Vec::new(),
            seen: HashSet::new(),
            page: 0,
            has_more: true,
        }
    }

    pub fn with_config(scope: FeedScope, cfg: &FeedConfig) -> Self {
        let limit = scope.page_size(cfg);
        Self::new(scope, limit)
    }

    pub fn scope(&self) -> &FeedScope {
        &self.scope
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the next page to request.
    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.seen.contains(id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Fetches the current page and merges it. Returns the fetched page; an
    /// exhausted store returns an empty page without calling the service.
    pub fn load_next_page(&mut self, service: &dyn FeedService) -> Result<FeedPage> {
        let page = self.page;
        if !self.has_more {
            return Ok(FeedPage {
                scope: self.scope.clone(),
                page,
                limit: self.limit,
                items: Vec::new(),
            });
        }
        let items = service.fetch_page(&self.scope, page, self.limit)?;
        let fetched = FeedPage {
            scope: self.scope.clone(),
            page,
            limit: self.limit,
            items,
        };
        self.merge(fetched.clone());
        Ok(fetched)
    }

    /// Appends unseen items in page order. An empty page marks the scope
    /// exhausted without advancing the page counter.
    pub fn merge(&mut self, page: FeedPage) -> MergeOutcome {
        if page.scope != self.scope {
            tracing::debug!(expected = %self.scope, got = %page.scope, "dropping page for other scope");
            return MergeOutcome::default();
        }
        if !self.has_more {
            return MergeOutcome {
                exhausted: true,
                ..Default::default()
            };
        }
        if page.items.is_empty() {
            self.has_more = false;
            tracing::debug!(scope = %self.scope, page = page.page, "feed exhausted");
            return MergeOutcome {
                exhausted: true,
                ..Default::default()
            };
        }

        let incoming = page.items.len();
        let mut added = 0;
        for item in page.items {
            if self.seen.insert(item.id.clone()) {
                self.items.push(item);
                added += 1;
            }
        }
        self.page += 1;
        tracing::debug!(
            scope = %self.scope,
            page = page.page,
            added,
            duplicates = incoming - added,
            "merged page"
        );
        MergeOutcome {
            added,
            duplicates: incoming - added,
            exhausted: false,
        }
    }

    /// Removes the item if present; absent ids are ignored.
    pub fn remove_item(&mut self, id: &ItemId) -> Option<Item> {
        if !self.seen.remove(id) {
            return None;
        }
        let idx = self.items.iter().position(|item| &item.id == id)?;
        Some(self.items.remove(idx))
    }

    /// Replaces the item's like count and likers with the server's values.
    pub fn apply_like(&mut self, id: &ItemId, state: LikeState) -> bool {
        match self.items.iter_mut().find(|item| &item.id == id) {
            Some(item) => {
                item.apply_like(state);
                true
            }
            None => false,
        }
    }

    /// Adds a freshly created item at the top of the feed.
    pub fn prepend(&mut self, item: Item) -> bool {
        if item.kind != self.scope.kind || !self.seen.insert(item.id.clone()) {
            return false;
        }
        self.items.insert(0, item);
        true
    }

    pub fn reset(&mut self) {
        self.items.clear();
        self.seen.clear();
        self.page = 0;
        self.has_more = true;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::ClientError;
    use crate::models::{Author, ItemKind};

    pub fn item(id: &str) -> Item {
        Item {
            id: ItemId::from(id),
            kind: ItemKind::Post,
            author: Some(Author {
                id: UserId::from("42"),
                name: "Asha".into(),
                photo: None,
            }),
            title: format!("title {id}"),
            media: String::new(),
            description: format!("description for {id}"),
            like_count: 0,
            liked_by: Vec::new(),
            created_at: None,
        }
    }

    pub fn items(ids: &[&str]) -> Vec<Item> {
        ids.iter().map(|id| item(id)).collect()
    }

    /// Scripted feed: returns the configured page or an empty one, and records calls.
    #[derive(Default)]
    pub struct ScriptedFeed {
        pub pages: Mutex<HashMap<u64, Result<Vec<Item>>>>,
        pub calls: Mutex<Vec<(FeedScope, u64, u32)>>,
    }

    impl ScriptedFeed {
        pub fn with_pages(pages: Vec<Vec<Item>>) -> Self {
            let feed = Self::default();
            for (idx, page) in pages.into_iter().enumerate() {
                feed.pages.lock().insert(idx as u64, Ok(page));
            }
            feed
        }

        pub fn fail_page(&self, page: u64, err: ClientError) {
            self.pages.lock().insert(page, Err(err));
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    impl FeedService for ScriptedFeed {
        fn fetch_page(&self, scope: &FeedScope, page: u64, limit: u32) -> Result<Vec<Item>> {
            self.calls.lock().push((scope.clone(), page, limit));
            match self.pages.lock().remove(&page) {
                Some(result) => result,
                None => Ok(Vec::new()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{item, items, ScriptedFeed};
    use super::*;
    use crate::error::ClientError;

    fn page(scope: &FeedScope, page: u64, ids: &[&str]) -> FeedPage {
        FeedPage {
            scope: scope.clone(),
            page,
            limit: 7,
            items: items(ids),
        }
    }

    #[test]
    fn overlapping_pages_keep_single_copy() {
        let scope = FeedScope::posts();
        let mut store = FeedStore::new(scope.clone(), 7);
        store.merge(page(&scope, 0, &["a", "b", "c"]));
        let outcome = store.merge(page(&scope, 1, &["c", "d"]));
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.duplicates, 1);
        let ids: Vec<&str> = store.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn all_duplicate_page_still_advances() {
        let scope = FeedScope::posts();
        let mut store = FeedStore::new(scope.clone(), 7);
        store.merge(page(&scope, 0, &["a"]));
        store.merge(page(&scope, 1, &["a"]));
        assert_eq!(store.page(), 2);
        assert!(store.has_more());
    }

    #[test]
    fn author_scope_three_fetches_reach_end() {
        let scope = FeedScope::posts().by_author(UserId::from("42"));
        let first: Vec<String> = (0..7).map(|n| format!("p{n}")).collect();
        let second: Vec<String> = (7..10).map(|n| format!("p{n}")).collect();
        let service = ScriptedFeed::with_pages(vec![
            first.iter().map(|id| item(id)).collect(),
            second.iter().map(|id| item(id)).collect(),
            Vec::new(),
        ]);
        let mut store = FeedStore::new(scope.clone(), 7);
        for _ in 0..3 {
            store.load_next_page(&service).unwrap();
        }
        assert_eq!(store.len(), 10);
        assert!(!store.has_more());
        assert_eq!(store.page(), 2);

        let calls = service.calls.lock().clone();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(s, _, limit)| s == &scope && *limit == 7));
        assert_eq!(
            calls.iter().map(|(_, p, _)| *p).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        store.load_next_page(&service).unwrap();
        assert_eq!(service.call_count(), 3);
    }

    #[test]
    fn failed_fetch_leaves_state_untouched() {
        let service = ScriptedFeed::with_pages(vec![items(&["a"])]);
        service.fail_page(1, ClientError::Network("connection reset".into()));
        let mut store = FeedStore::new(FeedScope::posts(), 7);
        store.load_next_page(&service).unwrap();
        let err = store.load_next_page(&service).unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
        assert_eq!(store.page(), 1);
        assert!(store.has_more());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn auth_failure_propagates() {
        let service = ScriptedFeed::default();
        service.fail_page(0, ClientError::Auth);
        let mut store = FeedStore::new(FeedScope::videos(), 5);
        assert!(matches!(
            store.load_next_page(&service),
            Err(ClientError::Auth)
        ));
    }

    #[test]
    fn removing_last_item_leaves_empty_feed() {
        let scope = FeedScope::posts();
        let mut store = FeedStore::new(scope.clone(), 7);
        store.merge(page(&scope, 0, &["only"]));
        assert!(store.remove_item(&ItemId::from("only")).is_some());
        assert!(store.is_empty());
        assert!(store.remove_item(&ItemId::from("only")).is_none());
        assert!(!store.contains(&ItemId::from("only")));
    }

    #[test]
    fn removed_item_can_be_delivered_again() {
        let scope = FeedScope::posts();
        let mut store = FeedStore::new(scope.clone(), 7);
        store.merge(page(&scope, 0, &["a", "b"]));
        store.remove_item(&ItemId::from("a"));
        let outcome = store.merge(page(&scope, 1, &["a"]));
        assert_eq!(outcome.added, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn page_for_other_scope_is_ignored() {
        let mut store = FeedStore::new(FeedScope::posts(), 7);
        let outcome = store.merge(page(&FeedScope::videos(), 0, &["v1"]));
        assert_eq!(outcome, MergeOutcome::default());
        assert!(store.is_empty());
        assert_eq!(store.page(), 0);
    }

    #[test]
    fn apply_like_replaces_state() {
        let scope = FeedScope::posts();
        let mut store = FeedStore::new(scope.clone(), 7);
        store.merge(page(&scope, 0, &["a"]));
        let applied = store.apply_like(
            &ItemId::from("a"),
            LikeState {
                like_count: 9,
                liked_by: vec![UserId::from("u1")],
            },
        );
        assert!(applied);
        assert_eq!(store.items()[0].like_count, 9);
        assert!(!store.apply_like(&ItemId::from("zz"), LikeState::default()));
    }

    #[test]
    fn prepend_and_reset() {
        let scope = FeedScope::posts();
        let mut store = FeedStore::new(scope.clone(), 7);
        store.merge(page(&scope, 0, &["a"]));
        assert!(store.prepend(item("new")));
        assert!(!store.prepend(item("new")));
        assert_eq!(store.items()[0].id.as_str(), "new");

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.page(), 0);
        assert!(store.has_more());
    }
}
