use std::collections::HashMap;
use std::sync::Arc;

use crate::api::{self, NewItem};
use crate::error::{ClientError, Result};
use crate::feed::FeedStore;
use crate::models::{Comment, CommentId, Item, ItemId, ItemKind, LikeState};
use crate::notice::{Notice, Notices};
use crate::session::{SessionHandle, Viewer};

pub trait InteractionService: Send + Sync {
    fn toggle_like(&self, item: &ItemId) -> Result<LikeState>;
    fn list_comments(&self, item: &ItemId) -> Result<Vec<Comment>>;
    fn add_comment(&self, item: &ItemId, text: &str) -> Result<Vec<Comment>>;
    fn delete_comment(&self, comment: &CommentId) -> Result<()>;
    fn delete_item(&self, kind: ItemKind, item: &ItemId) -> Result<()>;
    fn create_item(&self, kind: ItemKind, item: NewItem) -> Result<Item>;
}

pub struct ApiInteractionService {
    client: Arc<api::Client>,
}

impl ApiInteractionService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for ApiInteractionService {
    fn toggle_like(&self, item: &ItemId) -> Result<LikeState> {
        self.client.toggle_like(item)
    }

    fn list_comments(&self, item: &ItemId) -> Result<Vec<Comment>> {
        self.client.list_comments(item)
    }

    fn add_comment(&self, item: &ItemId, text: &str) -> Result<Vec<Comment>> {
        self.client.add_comment(item, text)
    }

    fn delete_comment(&self, comment: &CommentId) -> Result<()> {
        self.client.delete_comment(comment)
    }

    fn delete_item(&self, kind: ItemKind, item: &ItemId) -> Result<()> {
        self.client.delete_item(kind, item).map(|_| ())
    }

    fn create_item(&self, kind: ItemKind, item: NewItem) -> Result<Item> {
        self.client.create_item(kind, item)
    }
}

/// Synchronous yes/no gate shown before destructive requests.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThreadState {
    Loading,
    Loaded(Vec<Comment>),
}

impl ThreadState {
    pub fn comments(&self) -> &[Comment] {
        match self {
            ThreadState::Loading => &[],
            ThreadState::Loaded(comments) => comments,
        }
    }
}

/// Owner or elevated role may delete an item.
pub fn can_delete(viewer: Option<&Viewer>, item: &Item) -> bool {
    match viewer {
        Some(viewer) => viewer.is_elevated() || item.is_owned_by(&viewer.id),
        None => false,
    }
}

/// Like toggling, comment threads and item deletion for the signed-in viewer.
pub struct Interactions {
    service: Arc<dyn InteractionService>,
    session: SessionHandle,
    threads: HashMap<ItemId, ThreadState>,
    notices: Notices,
}

impl Interactions {
    pub fn new(service: Arc<dyn InteractionService>, session: SessionHandle) -> Self {
        Self {
            service,
            session,
            threads: HashMap::new(),
            notices: Notices::default(),
        }
    }

    pub fn notices_mut(&mut self) -> &mut Notices {
        &mut self.notices
    }

    pub fn is_liked(&self, item: &Item) -> bool {
        self.session
            .viewer()
            .is_some_and(|viewer| item.is_liked_by(&viewer.id))
    }

    pub fn can_delete(&self, item: &Item) -> bool {
        can_delete(self.session.viewer().as_ref(), item)
    }

    /// Sends the toggle and adopts the server's like state as-is.
    pub fn toggle_like(&mut self, feed: &mut FeedStore, item: &ItemId) -> Result<LikeState> {
        if let Err(err) = self.session.require() {
            self.notices.push(Notice::error("Sign in to like posts"));
            return Err(err);
        }
        match self.service.toggle_like(item) {
            Ok(state) => {
                tracing::debug!(%item, likes = state.like_count, "like state updated");
                feed.apply_like(item, state.clone());
                Ok(state)
            }
            Err(err) => {
                self.notices.push(Notice::failure("Could not update like", &err));
                Err(err)
            }
        }
    }

    pub fn thread(&self, item: &ItemId) -> Option<&ThreadState> {
        self.threads.get(item)
    }

    /// Returns the cached thread, fetching it on first open. Fetch failures
    /// leave an empty thread and a notice.
    pub fn open_comments(&mut self, item: &ItemId) -> &[Comment] {
        let cached = matches!(self.threads.get(item), Some(ThreadState::Loaded(_)));
        if !cached {
            self.threads.insert(item.clone(), ThreadState::Loading);
            let loaded = match self.service.list_comments(item) {
                Ok(comments) => comments,
                Err(err) => {
                    tracing::warn!(%item, error = %err, "comment fetch failed");
                    self.notices
                        .push(Notice::failure("Error fetching comments", &err));
                    Vec::new()
                }
            };
            self.threads
                .insert(item.clone(), ThreadState::Loaded(loaded));
        }
        self.threads
            .get(item)
            .map(ThreadState::comments)
            .unwrap_or(&[])
    }

    pub fn close_comments(&mut self, item: &ItemId) {
        self.threads.remove(item);
    }

    /// Posts a comment; the server's list replaces the cached thread.
    pub fn submit_comment(&mut self, item: &ItemId, text: &str) -> Result<&[Comment]> {
        let text = text.trim();
        if text.is_empty() {
            self.notices.push(Notice::error("Comment cannot be empty"));
            return Err(ClientError::validation("comment text is empty"));
        }
        if let Err(err) = self.session.require() {
            self.notices.push(Notice::error("Sign in to comment"));
            return Err(err);
        }
        match self.service.add_comment(item, text) {
            Ok(comments) => {
                self.threads
                    .insert(item.clone(), ThreadState::Loaded(comments));
                Ok(self
                    .threads
                    .get(item)
                    .map(ThreadState::comments)
                    .unwrap_or(&[]))
            }
            Err(err) => {
                self.notices.push(Notice::failure("Error adding comment", &err));
                Err(err)
            }
        }
    }

    /// Deletes one of the viewer's own comments. Returns `Ok(false)` when the
    /// confirmation is declined.
    pub fn delete_comment(
        &mut self,
        item: &ItemId,
        comment: &CommentId,
        confirm: &dyn Confirm,
    ) -> Result<bool> {
        let viewer = self.session.require()?;
        let authored = self
            .threads
            .get(item)
            .and_then(|thread| thread.comments().iter().find(|c| &c.id == comment))
            .map(|c| c.is_authored_by(&viewer.id));
        match authored {
            None => {
                return Err(ClientError::validation("comment is not loaded"));
            }
            Some(false) => {
                self.notices
                    .push(Notice::error("You can only delete your own comments"));
                return Err(ClientError::Forbidden("comment belongs to another user".into()));
            }
            Some(true) => {}
        }
        if !confirm.confirm("Are you sure you want to delete this comment?") {
            return Ok(false);
        }

        match self.service.delete_comment(comment) {
            Ok(()) => {
                if let Some(ThreadState::Loaded(comments)) = self.threads.get_mut(item) {
                    comments.retain(|c| &c.id != comment);
                }
                self.notices.push(Notice::success("Comment deleted"));
                Ok(true)
            }
            Err(err) => {
                self.notices
                    .push(Notice::failure("Error deleting comment", &err));
                Err(err)
            }
        }
    }

    /// Uploads a new item of the feed's kind and shows it at the top.
    pub fn create_item(&mut self, feed: &mut FeedStore, item: NewItem) -> Result<Item> {
        if let Err(err) = self.session.require() {
            self.notices.push(Notice::error("Sign in to share posts"));
            return Err(err);
        }
        let kind = feed.scope().kind;
        match self.service.create_item(kind, item) {
            Ok(created) => {
                feed.prepend(created.clone());
                self.notices
                    .push(Notice::success(format!("{} uploaded", capitalized(kind.noun()))));
                Ok(created)
            }
            Err(err) => {
                self.notices.push(Notice::failure("Upload failed", &err));
                Err(err)
            }
        }
    }

    /// Owner/admin deletion gated by confirmation. `Ok(false)` means nothing
    /// was sent: the item is not in the feed or the user declined.
    pub fn delete_item(
        &mut self,
        feed: &mut FeedStore,
        item: &ItemId,
        confirm: &dyn Confirm,
    ) -> Result<bool> {
        let viewer = self.session.require()?;
        let kind = feed.scope().kind;
        let Some(target) = feed.get(item) else {
            return Ok(false);
        };
        if !can_delete(Some(&viewer), target) {
            return Err(ClientError::Forbidden(format!(
                "only the owner or an admin can delete this {}",
                kind.noun()
            )));
        }
        let prompt = match kind {
            ItemKind::Post => "Are you sure you want to delete this Post?",
            ItemKind::Video => "Are you sure you want to delete this Video?",
        };
        if !confirm.confirm(prompt) {
            return Ok(false);
        }

        match self.service.delete_item(kind, item) {
            Ok(()) => {
                feed.remove_item(item);
                self.threads.remove(item);
                tracing::info!(%item, "item deleted");
                self.notices.push(Notice::success("Post Deleted"));
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(%item, error = %err, "item deletion failed");
                self.notices.push(Notice::error("Post Deletion Failed"));
                Err(err)
            }
        }
    }
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
