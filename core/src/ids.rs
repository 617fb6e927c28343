//! Strongly typed identifiers for ledger entities.
//!
//! Every identifier wraps a [`Uuid`] so that an `OrderId` can never be passed
//! where a `PayoutId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Creates a `", stringify!($name), "` from a UUID")]
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a checkout (one per order)
    OrderId
);
uuid_id!(
    /// Identifier of one vendor's line within an order
    OrderItemId
);
uuid_id!(
    /// Identifier of a customer-initiated return/refund request
    ReturnId
);
uuid_id!(
    /// Identifier of a vendor withdrawal request
    PayoutId
);
uuid_id!(
    /// Identifier of a notification row
    NotificationId
);
uuid_id!(
    /// Identifier of a catalog product (catalog itself is external)
    ProductId
);
uuid_id!(
    /// Identifier of any platform user: customer, vendor, agent or admin
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(OrderId::new(), OrderId::new());
    }

    #[test]
    fn display_matches_uuid() {
        let uuid = Uuid::new_v4();
        let id = ReturnId::from_uuid(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
        assert_eq!(id.as_uuid(), &uuid);
    }
}
