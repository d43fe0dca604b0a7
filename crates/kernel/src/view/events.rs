//! View-scoped event channel.

use tokio::sync::broadcast;

const DEFAULT_BUFFER_SIZE: usize = 16;

/// Signals exchanged between the parts of one listing view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// Current listing should be fetched again.
    RefetchRequested,

    /// Every filter was removed.
    FiltersCleared,
}

/// Sender side of a view's event channel.
///
/// Cloned into each component of the view; receivers obtained through
/// [`subscribe`](Self::subscribe) close when the last sender is dropped.
#[derive(Debug, Clone)]
pub struct ViewEvents {
    sender: broadcast::Sender<ViewEvent>,
}

impl ViewEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_BUFFER_SIZE);
        Self { sender }
    }

    /// Send an event; returns the number of receivers it reached.
    pub fn emit(&self, event: ViewEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.sender.subscribe()
    }
}

impl Default for ViewEvents {
    fn default() -> Self {
        Self::new()
    }
}
