use std::collections::HashSet;

use chrono::{DateTime, Utc};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::feed::FeedStore;
use crate::interaction::Interactions;
use crate::models::{Comment, Item, ItemId, ItemKind};

const UNKNOWN_USER: &str = "Unknown User";
const LIKED: &str = "♥";
const NOT_LIKED: &str = "♡";

/// Truncates to `limit` characters, appending `...` when anything was cut.
pub fn preview(text: &str, limit: usize) -> (String, bool) {
    let mut chars = text.char_indices();
    match chars.nth(limit) {
        Some((cut, _)) => (format!("{}...", &text[..cut]), true),
        None => (text.to_string(), false),
    }
}

pub fn author_name(item: &Item) -> &str {
    item.author
        .as_ref()
        .map(|author| author.name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_USER)
}

fn wrap_lines(text: &str, width: usize, prefix: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if width == 0 {
        return vec![format!("{prefix}{text}")];
    }
    let wrap_width = width.max(prefix.width() + 1);
    let options = WrapOptions::new(wrap_width)
        .break_words(false)
        .initial_indent(prefix)
        .subsequent_indent(prefix);
    wrap(text, options)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

/// Left text and right text on one row, padded by display width.
fn spread(left: &str, right: &str, width: usize) -> String {
    let used = left.width() + right.width();
    if used >= width {
        return format!("{left} {right}");
    }
    format!("{left}{}{right}", " ".repeat(width - used))
}

fn format_time(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|at| at.format("%Y-%m-%d %H:%M").to_string())
}

/// Per-viewer state for rendering feeds as plain text rows.
#[derive(Debug)]
pub struct Presenter {
    width: usize,
    preview_chars: usize,
    expanded: HashSet<ItemId>,
}

impl Presenter {
    pub fn new(width: usize, preview_chars: usize) -> Self {
        Self {
            width,
            preview_chars,
            expanded: HashSet::new(),
        }
    }

    pub fn is_expanded(&self, id: &ItemId) -> bool {
        self.expanded.contains(id)
    }

    /// Flips the Read More state and returns whether the item is now expanded.
    pub fn toggle_read_more(&mut self, id: &ItemId) -> bool {
        if self.expanded.remove(id) {
            false
        } else {
            self.expanded.insert(id.clone());
            true
        }
    }

    pub fn description(&self, item: &Item) -> (String, Option<&'static str>) {
        if self.is_expanded(&item.id) {
            return (item.description.clone(), Some("Read Less"));
        }
        let (text, truncated) = preview(&item.description, self.preview_chars);
        (text, truncated.then_some("Read More"))
    }

    pub fn render_item(&self, item: &Item, interactions: &Interactions) -> Vec<String> {
        let marker = if interactions.is_liked(item) {
            LIKED
        } else {
            NOT_LIKED
        };
        let likes = format!("{marker} {}", item.like_count);
        let mut lines = vec![spread(author_name(item), &likes, self.width)];
        lines.extend(wrap_lines(&item.title, self.width, ""));
        if !item.media.is_empty() {
            lines.push(format!("[{}] {}", item.kind.noun(), item.media));
        }

        let (description, toggle) = self.description(item);
        lines.extend(wrap_lines(&description, self.width, "  "));
        if let Some(toggle) = toggle {
            lines.push(format!("  <{toggle}>"));
        }

        let mut meta = vec![format!("id {}", item.id)];
        if let Some(at) = format_time(item.created_at) {
            meta.push(at);
        }
        if interactions.can_delete(item) {
            meta.push("[delete]".to_string());
        }
        lines.push(meta.join("  "));
        lines
    }

    pub fn render_comment(&self, comment: &Comment) -> Vec<String> {
        let name = comment
            .author
            .as_ref()
            .map(|author| author.name.as_str())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_USER);
        let when = format_time(comment.created_at).unwrap_or_default();
        let mut lines = vec![spread(name, &when, self.width)];
        lines.extend(wrap_lines(&comment.text, self.width, "  "));
        lines
    }

    pub fn render_thread(&self, comments: &[Comment]) -> Vec<String> {
        if comments.is_empty() {
            return vec!["No comments yet.".to_string()];
        }
        comments
            .iter()
            .flat_map(|comment| self.render_comment(comment))
            .collect()
    }

    pub fn render_feed(
        &self,
        store: &FeedStore,
        interactions: &Interactions,
        fetching: bool,
    ) -> Vec<String> {
        let mut lines = Vec::new();
        for item in store.items() {
            lines.extend(self.render_item(item, interactions));
            lines.push(String::new());
        }
        if let Some(footer) = footer(store, fetching) {
            lines.push(footer);
        }
        lines
    }
}

pub fn footer(store: &FeedStore, fetching: bool) -> Option<String> {
    if fetching {
        return Some("Loading...".to_string());
    }
    if store.has_more() {
        return None;
    }
    let kind = store.scope().kind;
    let text = match (store.is_empty(), kind) {
        (true, ItemKind::Post) => "No posts available.",
        (true, ItemKind::Video) => "No videos available.",
        (false, ItemKind::Post) => "No more posts",
        (false, ItemKind::Video) => "No more videos",
    };
    Some(text.to_string())
}
