//! Tracking the request awaiting each kind of reply
//!
//! The debugger's replies carry no correlation identifiers: a `frames`
//! document answers whichever stack request is currently waiting for one.
//! The frontend serialises requests of a given kind itself, so at most one
//! waiter per kind is outstanding; registering a new waiter supersedes the
//! previous one instead of queueing behind it.
use std::collections::HashMap;

use tokio::sync::oneshot;
use transport::{Document, DocumentKind};

pub(crate) struct PendingRequests {
    waiting: HashMap<DocumentKind, oneshot::Sender<Document>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            waiting: HashMap::new(),
        }
    }

    /// Register interest in the next reply of `kind`.
    ///
    /// Callers must register before writing the command that triggers the
    /// reply, otherwise the reply can arrive before its waiter exists.
    pub(crate) fn register(&mut self, kind: DocumentKind) -> oneshot::Receiver<Document> {
        let (tx, rx) = oneshot::channel();
        if self.waiting.insert(kind, tx).is_some() {
            tracing::debug!(?kind, "superseding stale waiter");
        }
        rx
    }

    /// Hand a completed reply to its waiter, if one is registered.
    pub(crate) fn resolve(&mut self, document: Document) {
        match self.waiting.remove(&document.kind) {
            Some(tx) => {
                let _ = tx.send(document);
            }
            None => tracing::debug!(kind = ?document.kind, "discarding unawaited reply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::element::Element;

    fn frames_document() -> Document {
        Document {
            kind: DocumentKind::Frames,
            root: Element {
                name: "frames".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn replies_reach_the_registered_waiter() {
        let mut pending = PendingRequests::new();
        let mut rx = pending.register(DocumentKind::Frames);

        pending.resolve(frames_document());

        assert_eq!(rx.try_recv().unwrap().kind, DocumentKind::Frames);
    }

    #[test]
    fn unawaited_replies_are_discarded() {
        let mut pending = PendingRequests::new();
        let mut rx = pending.register(DocumentKind::Variables);

        pending.resolve(frames_document());

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn last_registrant_wins() {
        let mut pending = PendingRequests::new();
        let mut stale = pending.register(DocumentKind::Frames);
        let mut fresh = pending.register(DocumentKind::Frames);

        pending.resolve(frames_document());

        // the superseded waiter's sender was dropped
        assert!(stale.try_recv().is_err());
        assert_eq!(fresh.try_recv().unwrap().kind, DocumentKind::Frames);
    }
}
