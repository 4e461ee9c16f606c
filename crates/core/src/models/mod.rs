//! Entity types stored in the collections.
//!
//! Each entity is serialised whole into its collection; field names match the JSON that the
//! collections have always contained (`camelCase`).

pub mod address;
pub mod order;
pub mod user;

pub use address::Address;
pub use order::{order_date_base, Order};
pub use user::{User, UserView};
