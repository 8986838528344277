//! The two-part wire message.

use std::borrow::Cow;

/// A `[topic, payload]` pair as it travels over the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Routing key. Subscribers match on byte prefixes of this.
    pub topic: Vec<u8>,
    /// Opaque body; may be empty (e.g. `reset`).
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a message from anything byte-like.
    pub fn new(topic: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Topic rendered for logs. Invalid UTF-8 is replaced, never rejected.
    pub fn topic_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.topic)
    }

    /// Whether this message would be delivered to a subscription on `prefix`.
    pub fn matches(&self, prefix: &[u8]) -> bool {
        self.topic.starts_with(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prefix_matches_everything() {
        let msg = Message::new("output/x", "1.0");
        assert!(msg.matches(b""));
        assert!(msg.matches(b"output"));
        assert!(msg.matches(b"output/x"));
        assert!(!msg.matches(b"input"));
    }

    #[test]
    fn topic_lossy_replaces_invalid_bytes() {
        let msg = Message::new(vec![b'a', 0xff], Vec::new());
        assert_eq!(msg.topic_lossy(), "a\u{fffd}");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_prefix_of_topic_matches(topic in proptest::collection::vec(any::<u8>(), 0..32), cut in 0usize..33) {
                let msg = Message::new(topic.clone(), Vec::new());
                let cut = cut.min(topic.len());
                prop_assert!(msg.matches(&topic[..cut]));
            }

            #[test]
            fn longer_prefix_never_matches(topic in proptest::collection::vec(any::<u8>(), 0..16), extra in any::<u8>()) {
                let msg = Message::new(topic.clone(), Vec::new());
                let mut longer = topic;
                longer.push(extra);
                prop_assert!(!msg.matches(&longer));
            }
        }
    }
}
