use serde_repr::{Deserialize_repr, Serialize_repr};

/// Message type discriminator carried in the `Protocol` field of every game
/// backend message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u16)]
pub(crate) enum Protocol {
    Init = 6000,
    ProductList = 6001,
    ProductListResponse = 6002,
    Purchase = 6003,
    PurchaseResponse = 6004,
}
