use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::logging::ProgressMessage;
use crate::types::{FileMatch, ProgressItem};

/// Handle providers use to stream progress back to the orchestrator.
///
/// Every sub-search of one query shares the same channel, so the caller sees
/// a single serialized stream no matter how many providers report at once.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: UnboundedSender<ProgressItem>,
}

impl ProgressSink {
    /// Create a sink together with the receiving end of its channel.
    pub fn channel() -> (Self, UnboundedReceiver<ProgressItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send an item. Returns `false` once nobody is listening anymore.
    pub fn report(&self, item: ProgressItem) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn report_match(&self, file_match: FileMatch) -> bool {
        self.report(ProgressItem::Match(file_match))
    }

    pub fn report_message(&self, message: ProgressMessage) -> bool {
        self.report(ProgressItem::Message(message))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceId;

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (sink, mut rx) = ProgressSink::channel();
        let resource = ResourceId::parse("file:///a.txt").unwrap();
        assert!(sink.report_match(FileMatch::new(resource.clone())));
        assert!(sink.report_message(ProgressMessage::info("done")));

        assert_eq!(rx.recv().await, Some(ProgressItem::Match(FileMatch::new(resource))));
        assert_eq!(
            rx.recv().await,
            Some(ProgressItem::Message(ProgressMessage::info("done")))
        );
    }

    #[tokio::test]
    async fn test_sink_reports_closed_receiver() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.report_message(ProgressMessage::info("late")));
    }
}
