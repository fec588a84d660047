use crate::models::ItemId;

/// Tracks which video is playing; starting one pauses the previous.
#[derive(Debug, Default)]
pub struct PlaybackRegistry {
    playing: Option<ItemId>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing(&self) -> Option<&ItemId> {
        self.playing.as_ref()
    }

    pub fn is_playing(&self, id: &ItemId) -> bool {
        self.playing.as_ref() == Some(id)
    }

    /// Marks `id` as playing and returns the item that must now pause.
    pub fn on_play(&mut self, id: &ItemId) -> Option<ItemId> {
        match self.playing.replace(id.clone()) {
            Some(previous) if &previous != id => {
                tracing::debug!(%previous, current = %id, "pausing previous video");
                Some(previous)
            }
            _ => None,
        }
    }

    pub fn on_pause(&mut self, id: &ItemId) {
        if self.is_playing(id) {
            self.playing = None;
        }
    }

    pub fn on_removed(&mut self, id: &ItemId) {
        self.on_pause(id);
    }
}
