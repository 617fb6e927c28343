//! Ledger stream identification and versioning.
//!
//! Every entity that must be serialized independently owns one stream:
//!
//! - `order-{uuid}`: the order and all of its items
//! - `return-{uuid}`: one return/refund request
//! - `payouts-{vendor uuid}`: every payout of a vendor, so that balance checks
//!   and payout inserts for the same vendor are ordered
//! - `notifications-{user uuid}`: read marks on one user's notifications
//!
//! The stream's [`Version`] is the expected-version token used for optimistic
//! concurrency when appending.

use crate::ids::{OrderId, ReturnId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a stream name cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid stream id `{0}`")]
pub struct ParseStreamIdError(String);

/// The entity family a stream belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// `order-{order id}`
    Order,
    /// `return-{return id}`
    Return,
    /// `payouts-{vendor id}`
    Payouts,
    /// `notifications-{recipient id}`
    Notifications,
}

impl StreamKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Return => "return",
            Self::Payouts => "payouts",
            Self::Notifications => "notifications",
        }
    }
}

/// Name of an event stream.
///
/// ```
/// use marketplace_core::ids::OrderId;
/// use marketplace_core::stream::{StreamId, StreamKind};
///
/// let order = OrderId::new();
/// let stream = StreamId::order(order);
/// assert_eq!(stream.kind(), StreamKind::Order);
/// assert!(stream.as_str().starts_with("order-"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Stream holding an order and its items
    #[must_use]
    pub fn order(id: OrderId) -> Self {
        Self::compose(StreamKind::Order, id.as_uuid())
    }

    /// Stream holding a single return request
    #[must_use]
    pub fn return_request(id: ReturnId) -> Self {
        Self::compose(StreamKind::Return, id.as_uuid())
    }

    /// Stream holding every payout of one vendor
    #[must_use]
    pub fn payouts(vendor: UserId) -> Self {
        Self::compose(StreamKind::Payouts, vendor.as_uuid())
    }

    /// Stream holding read marks of one user's notifications
    #[must_use]
    pub fn notifications(recipient: UserId) -> Self {
        Self::compose(StreamKind::Notifications, recipient.as_uuid())
    }

    fn compose(kind: StreamKind, id: &Uuid) -> Self {
        Self(format!("{}-{id}", kind.prefix()))
    }

    /// The stream name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Which entity family the stream belongs to
    #[must_use]
    pub fn kind(&self) -> StreamKind {
        // Names are only built through the constructors or `FromStr`
        if self.0.starts_with("payouts-") {
            StreamKind::Payouts
        } else if self.0.starts_with("return-") {
            StreamKind::Return
        } else if self.0.starts_with("notifications-") {
            StreamKind::Notifications
        } else {
            StreamKind::Order
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, rest) = s
            .split_once('-')
            .ok_or_else(|| ParseStreamIdError(s.to_string()))?;
        let kind = match prefix {
            "order" => StreamKind::Order,
            "return" => StreamKind::Return,
            "payouts" => StreamKind::Payouts,
            "notifications" => StreamKind::Notifications,
            _ => return Err(ParseStreamIdError(s.to_string())),
        };
        let id = Uuid::parse_str(rest).map_err(|_| ParseStreamIdError(s.to_string()))?;
        Ok(Self::compose(kind, &id))
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Number of events in a stream; the expected-version token for appends.
///
/// A stream that has never been written is at [`Version::INITIAL`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a stream with no events
    pub const INITIAL: Self = Self(0);

    /// Creates a version
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Version after one more event
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Version after `count` more events
    #[must_use]
    pub const fn advance(self, count: u64) -> Self {
        Self(self.0 + count)
    }

    /// Whether the stream is empty
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pick_prefix() {
        let vendor = UserId::new();
        let stream = StreamId::payouts(vendor);
        assert_eq!(stream.as_str(), format!("payouts-{vendor}"));
        assert_eq!(stream.kind(), StreamKind::Payouts);

        let request = ReturnId::new();
        assert_eq!(StreamId::return_request(request).kind(), StreamKind::Return);

        let inbox = StreamId::notifications(vendor);
        assert_eq!(inbox.as_str(), format!("notifications-{vendor}"));
        assert_eq!(inbox.kind(), StreamKind::Notifications);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn parse_round_trips_known_kinds() {
        for stream in [
            StreamId::order(OrderId::new()),
            StreamId::notifications(UserId::new()),
        ] {
            let parsed: StreamId = stream.as_str().parse().unwrap();
            assert_eq!(parsed, stream);
        }
    }

    #[test]
    fn parse_rejects_unknown_or_malformed() {
        assert!("".parse::<StreamId>().is_err());
        assert!("cart-123".parse::<StreamId>().is_err());
        assert!("order-not-a-uuid".parse::<StreamId>().is_err());
    }

    #[test]
    fn versions_advance() {
        assert!(Version::INITIAL.is_initial());
        assert_eq!(Version::INITIAL.next(), Version::new(1));
        assert_eq!(Version::new(2).advance(3), Version::new(5));
        assert_eq!(Version::new(7).to_string(), "v7");
    }
}
