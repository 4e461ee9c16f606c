//! # Flatshop Core
//!
//! Core storage and business logic for the flatshop backend.
//!
//! This crate contains:
//! - A flat-file document store: named JSON collections under `data_dir`, split into
//!   one-file-per-key shard directories once they outgrow `max_collection_bytes`
//! - Per-collection exclusive access with FIFO hand-off ([`LockManager`])
//! - The domain service ([`DataService`]) for users, addresses, orders and sessions
//! - Hashing, CPF validation and session primitives
//!
//! **No transport concerns**: HTTP routing lives in `api-rest`, outbound email in
//! `flatshop-mailer`. Configuration is resolved by the binaries and passed in as
//! [`CoreConfig`].

pub mod clock;
pub mod collections;
pub mod config;
pub mod constants;
pub mod error;
pub mod hashing;
pub mod lock;
pub mod models;
pub mod notifier;
pub mod service;
pub mod session;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use collections::{Checkout, CollectionStore, Document};
pub use config::CoreConfig;
pub use error::{StoreError, StoreResult};
pub use lock::{LockManager, ResourceGuard};
pub use models::{order_date_base, Address, Order, User, UserView};
pub use notifier::{ConfirmationMessage, LogNotifier, Notifier, NotifyError};
pub use service::{DataService, LoginSession, UserStatus};
pub use session::{validate_session, Session, SessionStatus};

pub use flatshop_types::{digits_only, Cpf, NonEmptyText, TextError};
