//! Routing of decoded envelopes to per-tag subscribers.

pub mod envelope;

use std::collections::HashMap;

use tracing::{debug, warn};

pub use self::envelope::{
    ChatMessage, DATA_TYPE_KEY, DataType, Envelope, PlayerUpdateMessage, ReadyMessage,
    StartGameMessage,
};

/// Subscriber invoked with the envelope and a caller-supplied context.
pub type Handler<C> = Box<dyn FnMut(&Envelope, &mut C) + Send>;

/// Registry of handlers keyed by message tag.
///
/// Handlers run synchronously, each exactly once per dispatch, in the order
/// they were registered. Tags without handlers and unrecognised tags are
/// dropped without error so newer clients can talk to older ones.
pub struct Dispatcher<C> {
    handlers: HashMap<DataType, Vec<Handler<C>>>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C> Dispatcher<C> {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to envelopes tagged `data_type`.
    pub fn register<F>(&mut self, data_type: DataType, handler: F)
    where
        F: FnMut(&Envelope, &mut C) + Send + 'static,
    {
        if !data_type.is_recognized() {
            warn!(tag = %data_type, "handler registered for an unrecognised tag will never run");
        }
        self.handlers
            .entry(data_type)
            .or_default()
            .push(Box::new(handler));
    }

    /// Number of handlers subscribed to `data_type`.
    pub fn handler_count(&self, data_type: &DataType) -> usize {
        self.handlers.get(data_type).map_or(0, Vec::len)
    }

    /// Route one envelope, returning how many handlers ran.
    pub fn dispatch(&mut self, envelope: &Envelope, ctx: &mut C) -> usize {
        let tag = envelope.data_type();
        if !tag.is_recognized() {
            debug!(tag = %tag, "dropping envelope with unrecognised tag");
            return 0;
        }

        let Some(handlers) = self.handlers.get_mut(tag) else {
            debug!(tag = %tag, "no handler registered for envelope");
            return 0;
        };
        for handler in handlers.iter_mut() {
            handler(envelope, ctx);
        }
        handlers.len()
    }

    /// Decode raw transport bytes and route them; malformed input is logged and dropped.
    pub fn dispatch_bytes(&mut self, bytes: &[u8], ctx: &mut C) -> usize {
        match Envelope::decode(bytes) {
            Ok(envelope) => self.dispatch(&envelope, ctx),
            Err(err) => {
                warn!(error = %err, len = bytes.len(), "dropping malformed envelope");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(user: &str, message: &str) -> Envelope {
        ChatMessage {
            user: user.into(),
            message: message.into(),
        }
        .into()
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut dispatcher = Dispatcher::<Vec<&'static str>>::new();
        dispatcher.register(DataType::ChatMessage, |_, log| log.push("first"));
        dispatcher.register(DataType::ChatMessage, |_, log| log.push("second"));
        dispatcher.register(DataType::Ready, |_, log| log.push("ready"));
        assert_eq!(dispatcher.handler_count(&DataType::ChatMessage), 2);
        assert_eq!(dispatcher.handler_count(&DataType::StartGame), 0);

        let mut log = Vec::new();
        let ran = dispatcher.dispatch(&chat("Ada", "hi"), &mut log);

        assert_eq!(ran, 2);
        assert_eq!(log, vec!["first", "second"]);
    }

    #[test]
    fn each_dispatch_invokes_each_handler_once() {
        let mut dispatcher = Dispatcher::<u32>::new();
        dispatcher.register(DataType::ChatMessage, |_, count| *count += 1);

        let mut count = 0;
        dispatcher.dispatch(&chat("Ada", "one"), &mut count);
        dispatcher.dispatch(&chat("Ada", "two"), &mut count);
        assert_eq!(count, 2);
    }

    #[test]
    fn unknown_tags_are_dropped() {
        let mut dispatcher = Dispatcher::<u32>::new();
        dispatcher.register(DataType::ChatMessage, |_, count| *count += 1);

        let mut count = 0;
        let ran = dispatcher.dispatch_bytes(br#"{"DataType":"Emote"}"#, &mut count);
        assert_eq!(ran, 0);
        assert_eq!(count, 0);
    }

    #[test]
    fn unsubscribed_tag_is_dropped() {
        let mut dispatcher = Dispatcher::<u32>::new();
        let mut count = 0;
        assert_eq!(
            dispatcher.dispatch(&StartGameMessage.into(), &mut count),
            0
        );
    }

    #[test]
    fn malformed_bytes_invoke_nothing() {
        let mut dispatcher = Dispatcher::<u32>::new();
        dispatcher.register(DataType::ChatMessage, |_, count| *count += 1);
        dispatcher.register(DataType::Ready, |_, count| *count += 1);

        let mut count = 0;
        for bytes in [
            &b""[..],
            &b"{"[..],
            &br#"{"UserID":"Ada"}"#[..],
            &br#"["ChatMessage"]"#[..],
        ] {
            assert_eq!(dispatcher.dispatch_bytes(bytes, &mut count), 0);
        }
        assert_eq!(count, 0);
    }

    #[test]
    fn handler_sees_payload_fields() {
        let mut dispatcher = Dispatcher::<Vec<String>>::new();
        dispatcher.register(DataType::ChatMessage, |envelope, lines| {
            if let Ok(message) = ChatMessage::try_from(envelope) {
                lines.push(format!("{}: {}", message.user, message.message));
            }
        });

        let mut lines = Vec::new();
        let bytes = chat("Ada", "hello").encode().unwrap();
        dispatcher.dispatch_bytes(&bytes, &mut lines);
        assert_eq!(lines, vec!["Ada: hello".to_string()]);
    }
}
