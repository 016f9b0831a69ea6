//! Decide which inbound messages reach the subscribers.
//!
//! A [`Filter`] looks at a [`NormalizedMessage`] after it has been acked and
//! decoded. Closures of `Fn(&NormalizedMessage) -> bool` are filters too, and
//! any filter can be combined with [`Filter::and`], [`Filter::or`] and
//! [`Filter::not`]:
//!
//! ```
//! use dmwork::filter::{self, Filter};
//! use dmwork::ws::message::PAYLOAD_TYPE_TEXT;
//!
//! let text_in_dm = filter::payload_type(PAYLOAD_TYPE_TEXT).and(filter::group().not());
//! # let _ = text_in_dm;
//! ```

use crate::ws::message::{ChannelType, NormalizedMessage};

/// Accepts or rejects a message
pub trait Filter {
    /// true to hand the message to subscribers
    fn accept(&self, message: &NormalizedMessage) -> bool;

    /// Accept what `self` rejects
    fn not(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }

    /// Accept only when `self` and `other` both accept, `other` is skipped if `self` rejects
    fn and<F: Filter>(self, other: F) -> And<Self, F>
    where
        Self: Sized,
    {
        And(self, other)
    }

    /// Accept when either side accepts, `other` is skipped if `self` accepts
    fn or<F: Filter>(self, other: F) -> Or<Self, F>
    where
        Self: Sized,
    {
        Or(self, other)
    }
}

impl<F> Filter for F
where
    F: Fn(&NormalizedMessage) -> bool,
{
    fn accept(&self, message: &NormalizedMessage) -> bool {
        self(message)
    }
}

/// See [`Filter::not`]
#[derive(Debug, Copy, Clone)]
pub struct Not<F>(F);

impl<F: Filter> Filter for Not<F> {
    fn accept(&self, message: &NormalizedMessage) -> bool {
        !self.0.accept(message)
    }
}

/// See [`Filter::and`]
#[derive(Debug, Copy, Clone)]
pub struct And<A, B>(A, B);

impl<A: Filter, B: Filter> Filter for And<A, B> {
    fn accept(&self, message: &NormalizedMessage) -> bool {
        self.0.accept(message) && self.1.accept(message)
    }
}

/// See [`Filter::or`]
#[derive(Debug, Copy, Clone)]
pub struct Or<A, B>(A, B);

impl<A: Filter, B: Filter> Filter for Or<A, B> {
    fn accept(&self, message: &NormalizedMessage) -> bool {
        self.0.accept(message) || self.1.accept(message)
    }
}

/// Constant answer, see [`all`] and [`none`]
#[derive(Debug, Copy, Clone)]
pub struct Always(bool);

impl Filter for Always {
    fn accept(&self, _message: &NormalizedMessage) -> bool {
        self.0
    }
}

/// Accept every message, the bot default
pub fn all() -> Always {
    Always(true)
}

/// Reject every message
pub fn none() -> Always {
    Always(false)
}

/// See [`from_user`]
#[derive(Debug, Clone)]
pub struct FromUser(String);

impl Filter for FromUser {
    fn accept(&self, message: &NormalizedMessage) -> bool {
        message.from_uid == self.0
    }
}

/// Messages sent by `uid`
pub fn from_user<S: Into<String>>(uid: S) -> FromUser {
    FromUser(uid.into())
}

/// See [`in_channel`]
#[derive(Debug, Clone)]
pub struct InChannel(String);

impl Filter for InChannel {
    fn accept(&self, message: &NormalizedMessage) -> bool {
        message.channel_id == self.0
    }
}

/// Messages whose reply channel is `channel_id`.
///
/// For a direct message the reply channel is the sender uid.
pub fn in_channel<S: Into<String>>(channel_id: S) -> InChannel {
    InChannel(channel_id.into())
}

/// See [`direct`] and [`group`]
#[derive(Debug, Copy, Clone)]
pub struct OfChannelType(ChannelType);

impl Filter for OfChannelType {
    fn accept(&self, message: &NormalizedMessage) -> bool {
        message.channel_type == self.0
    }
}

/// Direct messages
pub fn direct() -> OfChannelType {
    OfChannelType(ChannelType::Direct)
}

/// Group messages
pub fn group() -> OfChannelType {
    OfChannelType(ChannelType::Group)
}

/// See [`payload_type`]
#[derive(Debug, Copy, Clone)]
pub struct PayloadType(i64);

impl Filter for PayloadType {
    fn accept(&self, message: &NormalizedMessage) -> bool {
        message.payload.r#type == self.0
    }
}

/// Messages with payload type tag `t`, e.g. [`PAYLOAD_TYPE_TEXT`](crate::ws::message::PAYLOAD_TYPE_TEXT)
pub fn payload_type(t: i64) -> PayloadType {
    PayloadType(t)
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::ws::message::{MessageId, Payload, PAYLOAD_TYPE_TEXT};

    fn message(from: &str, channel_type: ChannelType, payload: Payload) -> NormalizedMessage {
        NormalizedMessage {
            message_id: MessageId::Number(1),
            message_seq: 1,
            from_uid: from.to_string(),
            channel_id: match channel_type {
                ChannelType::Direct => from.to_string(),
                ChannelType::Group => "g1".to_string(),
            },
            channel_type,
            timestamp: 0,
            payload,
        }
    }

    fn image() -> Payload {
        Payload {
            r#type: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_message_filters() {
        let dm = message("u1", ChannelType::Direct, Payload::text("hi"));
        let group_image = message("u2", ChannelType::Group, image());

        assert!(all().accept(&dm));
        assert!(!none().accept(&dm));
        assert!(from_user("u1").accept(&dm));
        assert!(!from_user("u1").accept(&group_image));
        assert!(in_channel("u1").accept(&dm));
        assert!(in_channel("g1").accept(&group_image));
        assert!(!in_channel("u2").accept(&group_image));
        assert!(direct().accept(&dm));
        assert!(group().accept(&group_image));
        assert!(payload_type(PAYLOAD_TYPE_TEXT).accept(&dm));
        assert!(!payload_type(PAYLOAD_TYPE_TEXT).accept(&group_image));
    }

    #[test]
    fn test_combine() {
        let dm = message("u1", ChannelType::Direct, Payload::text("hi"));
        let group_text = message("u2", ChannelType::Group, Payload::text("yo"));

        let text_dm = payload_type(PAYLOAD_TYPE_TEXT).and(group().not());
        assert!(text_dm.accept(&dm));
        assert!(!text_dm.accept(&group_text));

        let either = from_user("u1").or(from_user("u2"));
        assert!(either.accept(&dm));
        assert!(either.accept(&group_text));
        assert!(!either.not().accept(&dm));

        let says_yo = |m: &NormalizedMessage| m.payload.content() == Some("yo");
        assert!(says_yo.or(none()).accept(&group_text));
        assert!(!says_yo.and(all()).accept(&dm));
    }

    #[test]
    fn test_combine_short_circuit() {
        let dm = message("u1", ChannelType::Direct, Payload::text("hi"));
        let calls = AtomicUsize::new(0);
        let counted = |_: &NormalizedMessage| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        };

        assert!(!none().and(&counted).accept(&dm));
        assert!(all().or(&counted).accept(&dm));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(all().and(&counted).accept(&dm));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_boxed_filter() {
        let dm = message("u1", ChannelType::Direct, Payload::text("hi"));
        let boxed: Box<dyn Filter + Send + Sync> = Box::new(direct().and(from_user("u1")));
        assert!(boxed.accept(&dm));
    }
}
