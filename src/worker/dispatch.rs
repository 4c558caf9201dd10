//! Event dispatch table.
//!
//! Each lifecycle or fetch event kind maps to at most one handler. A handler
//! returns a future, and the event only counts as resolved once that future
//! settles. This is how install extends its lifecycle until the cache is warm
//! and how fetch substitutes its own response.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;

use super::fetch::FetchResult;
use crate::error::{Error, Result};
use crate::http::Request;

/// Event types the worker can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Install,
  Activate,
  Fetch,
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventKind::Install => write!(f, "install"),
      EventKind::Activate => write!(f, "activate"),
      EventKind::Fetch => write!(f, "fetch"),
    }
  }
}

/// A dispatched event with its payload.
#[derive(Debug, Clone)]
pub enum Event {
  Install,
  Activate,
  Fetch(Request),
}

impl Event {
  pub fn kind(&self) -> EventKind {
    match self {
      Event::Install => EventKind::Install,
      Event::Activate => EventKind::Activate,
      Event::Fetch(_) => EventKind::Fetch,
    }
  }
}

/// What a handler resolved with.
#[derive(Debug, Clone)]
pub enum Outcome {
  /// Install finished; number of entries pre-cached
  Installed { entries: usize },
  /// Activate finished; names of caches removed
  Activated { pruned: Vec<String> },
  /// Fetch handler substituted this response
  Respond(FetchResult),
}

/// Boxed event handler.
pub type Handler = Box<dyn Fn(Event) -> BoxFuture<'static, Result<Outcome>> + Send + Sync>;

/// Dispatch table mapping event kind to handler.
#[derive(Default)]
pub struct Dispatcher {
  handlers: HashMap<EventKind, Handler>,
}

impl Dispatcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register the handler for `kind`, replacing any previous one.
  pub fn on(&mut self, kind: EventKind, handler: Handler) {
    self.handlers.insert(kind, handler);
  }

  pub fn handles(&self, kind: EventKind) -> bool {
    self.handlers.contains_key(&kind)
  }

  /// Run the handler for `event` and wait for it to settle.
  pub async fn dispatch(&self, event: Event) -> Result<Outcome> {
    let kind = event.kind();
    let handler = self.handlers.get(&kind).ok_or(Error::NoHandler(kind))?;
    handler(event).await
  }
}
