//! Domain service.
//!
//! [`DataService`] is the only place business rules live: CPF validation, password checks,
//! address de-duplication, order numbering and session issuance. Every operation goes through
//! the [`CollectionStore`], so each read-modify-write on a collection happens inside a single
//! checkout.
//!
//! Operations touching more than one collection take them one at a time and stop at the first
//! failed write. A crash between two writes can leave an address or order stored without the
//! user record pointing at it.

use crate::clock::{Clock, SystemClock};
use crate::collections::{Checkout, CollectionStore};
use crate::config::CoreConfig;
use crate::constants::{ADDRESSES_COLLECTION, COLLECTIONS, ORDERS_COLLECTION, USERS_COLLECTION};
use crate::error::{StoreError, StoreResult};
use crate::hashing::salted_hash;
use crate::models::{order_date_base, Address, Order, User, UserView};
use crate::notifier::{ConfirmationMessage, Notifier};
use crate::session::validate_session;
use chrono::Local;
use flatshop_types::{Cpf, NonEmptyText};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

const NOT_LOGGED_IN: &str = "you must be logged in to do this";
const NOT_REGISTERED: &str = "this CPF is not registered";
const ALREADY_REGISTERED: &str = "this CPF has already been registered";
const INVALID_CPF: &str = "this CPF is not valid";
const WRONG_PASSWORD: &str = "wrong password";
const MISSING_FIELD: &str = "a required field was not filled";
const NO_ADDRESS_GIVEN: &str = "no address was given";

/// Whether a CPF has an account, and whether its email has been confirmed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UserStatus {
    pub exists: bool,
    pub registered: bool,
}

/// Result of a successful login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoginSession {
    pub hash: String,
    pub user: UserView,
}

/// Service for users, addresses and orders.
#[derive(Clone)]
pub struct DataService {
    cfg: Arc<CoreConfig>,
    store: CollectionStore,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl DataService {
    pub fn new(cfg: Arc<CoreConfig>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_clock(cfg, notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cfg: Arc<CoreConfig>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: CollectionStore::new(Arc::clone(&cfg)),
            cfg,
            notifier,
            clock,
        }
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    /// Creates missing collections and shards oversized ones.
    pub async fn init(&self) -> StoreResult<()> {
        self.store.init(COLLECTIONS).await?;
        tracing::info!(data_dir = %self.cfg.data_dir().display(), "collections ready");
        Ok(())
    }

    async fn users(&self) -> StoreResult<Checkout> {
        self.store.checkout(USERS_COLLECTION).await
    }

    /// Reads one user and releases the collection.
    async fn find_user(&self, cpf: &str) -> StoreResult<Option<User>> {
        self.users().await?.get(cpf)
    }

    /// Checks that `session` is the live session of `cpf`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthenticated` with a readable reason when either argument is
    /// empty or the session check fails.
    pub async fn validate(&self, cpf: &str, session: &str) -> StoreResult<()> {
        if cpf.is_empty() || session.is_empty() {
            return Err(StoreError::Unauthenticated(NOT_LOGGED_IN.into()));
        }

        let user = self.find_user(cpf).await?;
        let status = validate_session(
            user.as_ref(),
            session,
            self.clock.now_millis(),
            self.cfg.session_ttl(),
        );

        match status.message() {
            None => Ok(()),
            Some(reason) => {
                tracing::debug!(cpf, ?status, "session rejected");
                Err(StoreError::Unauthenticated(reason.into()))
            }
        }
    }

    pub async fn user_exists(&self, cpf: &str) -> StoreResult<UserStatus> {
        Ok(match self.find_user(cpf).await? {
            Some(user) => UserStatus {
                exists: true,
                registered: user.confirmed_email,
            },
            None => UserStatus::default(),
        })
    }

    /// Registers a new user and sends the confirmation email.
    ///
    /// Checks run in a fixed order and the first failure wins: name, email, duplicate CPF,
    /// invalid CPF. The duplicate check and the insert share one checkout. Name and email are
    /// stored trimmed.
    pub async fn create_user(
        &self,
        name: &str,
        cpf: &str,
        password: &str,
        email: &str,
    ) -> StoreResult<()> {
        let name = NonEmptyText::new(name)
            .map_err(|_| StoreError::field("name", "a user needs a name"))?;
        let email = NonEmptyText::new(email)
            .map_err(|_| StoreError::field("email", "a user needs an email"))?;

        let mut users = self.users().await?;
        if users.contains(cpf) {
            return Err(StoreError::field("cpf", ALREADY_REGISTERED));
        }
        let cpf = Cpf::parse(cpf).map_err(|_| StoreError::field("cpf", INVALID_CPF))?;

        let user = User::new(
            name.into_inner(),
            cpf.as_str(),
            salted_hash(password),
            email.into_inner(),
            self.clock.now_millis(),
        );
        users.insert(cpf.as_str(), &user)?;
        users.persist().await?;

        tracing::info!(cpf = %cpf, "user registered");
        self.notify(&user);
        Ok(())
    }

    fn notify(&self, user: &User) {
        let message = ConfirmationMessage {
            to: user.email.clone(),
            name: user.name.clone(),
            cpf: user.cpf.clone(),
            code: user.confirm_code.clone(),
        };
        if let Err(e) = self.notifier.send_confirmation(message) {
            tracing::warn!(cpf = %user.cpf, error = %e, "failed to send confirmation email");
        }
    }

    /// Sends the stored confirmation code again.
    pub async fn resend_confirmation(&self, cpf: &str) -> StoreResult<()> {
        let Some(user) = self.find_user(cpf).await? else {
            return Err(StoreError::field("cpf", "this CPF has not been registered"));
        };
        self.notify(&user);
        Ok(())
    }

    /// Marks the email of `cpf` as confirmed if `code` is its confirmation code.
    ///
    /// Confirming an already confirmed account with the right code succeeds without writing.
    pub async fn confirm_email(&self, cpf: &str, code: &str) -> StoreResult<()> {
        let mut users = self.users().await?;
        let Some(mut user) = users.get::<User>(cpf)? else {
            return Err(StoreError::field("cpf", NOT_REGISTERED));
        };
        if user.confirm_code != code {
            return Err(StoreError::field(
                "confirm",
                "the confirmation code does not match",
            ));
        }
        if user.confirmed_email {
            return Ok(());
        }

        user.confirmed_email = true;
        users.insert(cpf, &user)?;
        users.persist().await?;
        tracing::info!(cpf, "email confirmed");
        Ok(())
    }

    /// Stores `address` once, keyed by its content hash, and returns the hash.
    async fn store_address(&self, address: &Address) -> StoreResult<String> {
        let hash = address.content_hash();
        let mut addresses = self.store.checkout(ADDRESSES_COLLECTION).await?;
        if addresses.contains(&hash) {
            tracing::debug!(address = %hash, "address already stored");
            return Ok(hash);
        }

        addresses.insert(hash.clone(), address)?;
        addresses.persist().await?;
        Ok(hash)
    }

    /// Stores `address` and links it to the user. Returns the address hash.
    ///
    /// The postal code is reduced to digits first. Every field except `line2` is required.
    pub async fn set_address(&self, cpf: &str, address: Address) -> StoreResult<String> {
        if self.find_user(cpf).await?.is_none() {
            return Err(StoreError::NotFound(NOT_REGISTERED.into()));
        }

        let address = address.normalised();
        if let Some(missing) = address.missing_required() {
            tracing::debug!(cpf, field = missing, "address rejected");
            return Err(StoreError::Rejected(MISSING_FIELD.into()));
        }

        let hash = self.store_address(&address).await?;

        let mut users = self.users().await?;
        let Some(mut user) = users.get::<User>(cpf)? else {
            return Err(StoreError::NotFound(NOT_REGISTERED.into()));
        };
        user.set_address(hash.clone());
        users.insert(cpf, &user)?;
        users.persist().await?;
        Ok(hash)
    }

    /// The address currently linked to `cpf`.
    pub async fn address_for(&self, cpf: &str) -> StoreResult<Address> {
        let Some(user) = self.find_user(cpf).await? else {
            return Err(StoreError::NotFound(NOT_REGISTERED.into()));
        };
        let Some(hash) = user.address else {
            return Err(StoreError::NotFound(
                "this CPF has no registered address".into(),
            ));
        };

        self.store
            .checkout(ADDRESSES_COLLECTION)
            .await?
            .get::<Address>(&hash)?
            .ok_or_else(|| StoreError::NotFound(format!("address {hash} not found")))
    }

    pub async fn change_password(
        &self,
        cpf: &str,
        old_password: &str,
        new_password: &str,
    ) -> StoreResult<()> {
        let mut users = self.users().await?;
        let Some(mut user) = users.get::<User>(cpf)? else {
            return Err(StoreError::NotFound(NOT_REGISTERED.into()));
        };
        if user.has_blank_password() || user.password_hash() != salted_hash(old_password) {
            return Err(StoreError::Rejected(WRONG_PASSWORD.into()));
        }

        user.password = Some(salted_hash(new_password));
        users.insert(cpf, &user)?;
        users.persist().await?;
        tracing::info!(cpf, "password changed");
        Ok(())
    }

    /// Checks the password and issues a fresh session.
    ///
    /// Accounts holding the blank-password sentinel are reported as not registered.
    pub async fn login(&self, cpf: &str, password: &str) -> StoreResult<LoginSession> {
        let mut users = self.users().await?;
        let user = users
            .get::<User>(cpf)?
            .filter(|user| !user.has_blank_password());
        let Some(mut user) = user else {
            return Err(StoreError::field("cpf", NOT_REGISTERED));
        };
        if user.password_hash() != salted_hash(password) {
            return Err(StoreError::field("pass", WRONG_PASSWORD));
        }

        let hash = user.register_new_session(self.clock.now_millis());
        let view = user.view();
        users.insert(cpf, &user)?;
        users.persist().await?;

        tracing::info!(cpf, "user logged in");
        Ok(LoginSession { hash, user: view })
    }

    /// Stores the delivery address, records a new order and links it to the user.
    ///
    /// Returns the order id, `YYMMDD` of the local date followed by a four digit serial.
    pub async fn place_order(
        &self,
        cpf: &str,
        products: Vec<Value>,
        address: Option<Address>,
    ) -> StoreResult<u64> {
        if self.find_user(cpf).await?.is_none() {
            return Err(StoreError::NotFound(NOT_REGISTERED.into()));
        }
        let Some(address) = address else {
            return Err(StoreError::Rejected(NO_ADDRESS_GIVEN.into()));
        };

        let address_hash = self.store_address(&address.normalised()).await?;

        let day_base = order_date_base(self.clock.now().with_timezone(&Local).date_naive());
        let mut orders = self.store.checkout(ORDERS_COLLECTION).await?;
        let id = Order::next_id(day_base, orders.keys());
        orders.insert(
            id.to_string(),
            &Order::new(id, cpf.to_owned(), address_hash, products),
        )?;
        orders.persist().await?;

        let mut users = self.users().await?;
        let Some(mut user) = users.get::<User>(cpf)? else {
            return Err(StoreError::NotFound(NOT_REGISTERED.into()));
        };
        user.push_order(id);
        users.insert(cpf, &user)?;
        users.persist().await?;

        tracing::info!(cpf, order_id = id, "order placed");
        Ok(id)
    }

    pub async fn order(&self, id: u64) -> StoreResult<Order> {
        self.store
            .checkout(ORDERS_COLLECTION)
            .await?
            .get::<Order>(&id.to_string())?
            .ok_or_else(|| StoreError::NotFound(format!("order {id} not found")))
    }

    /// Ids of every stored order, ascending.
    pub async fn order_ids(&self) -> StoreResult<Vec<u64>> {
        let orders = self.store.read(ORDERS_COLLECTION).await?;
        let mut ids: Vec<u64> = orders.keys().filter_map(|k| k.parse().ok()).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// CPFs of every stored user, ascending.
    pub async fn user_ids(&self) -> StoreResult<Vec<String>> {
        let users = self.store.read(USERS_COLLECTION).await?;
        Ok(users.keys().cloned().collect())
    }

    pub async fn set_order_status(&self, id: u64, status: i64) -> StoreResult<Order> {
        let key = id.to_string();
        let mut orders = self.store.checkout(ORDERS_COLLECTION).await?;
        let Some(mut order) = orders.get::<Order>(&key)? else {
            return Err(StoreError::NotFound(format!("order {id} not found")));
        };

        order.set_status(status);
        orders.insert(key, &order)?;
        orders.persist().await?;
        tracing::info!(order_id = id, status, "order status updated");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::notifier::NotifyError;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ANA: &str = "52998224725";
    const BIA: &str = "11144477735";

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<ConfirmationMessage>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<ConfirmationMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn send_confirmation(&self, message: ConfirmationMessage) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn send_confirmation(&self, _message: ConfirmationMessage) -> Result<(), NotifyError> {
            Err(NotifyError::Unavailable("smtp down".into()))
        }
    }

    struct Harness {
        dir: TempDir,
        service: DataService,
        clock: Arc<FixedClock>,
        notifier: Arc<RecordingNotifier>,
    }

    fn local_noon(year: i32, month: u32, day: u32) -> chrono::DateTime<Utc> {
        Local
            .with_ymd_and_hms(year, month, day, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn harness_with_limit(max_bytes: u64) -> Harness {
        let dir = TempDir::new().unwrap();
        let cfg = CoreConfig::new(dir.path().to_path_buf(), max_bytes, Duration::minutes(10))
            .unwrap();
        let clock = Arc::new(FixedClock::new(local_noon(2026, 10, 19)));
        let notifier = Arc::new(RecordingNotifier::default());
        let service = DataService::with_clock(
            Arc::new(cfg),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        service.init().await.unwrap();
        Harness {
            dir,
            service,
            clock,
            notifier,
        }
    }

    async fn harness() -> Harness {
        harness_with_limit(64 * 1024).await
    }

    fn address(line1: &str, code: &str) -> Address {
        Address {
            line1: Some(line1.into()),
            line2: None,
            neigh: Some("Centro".into()),
            city: Some("São Paulo".into()),
            state: Some("SP".into()),
            code: Some(code.into()),
        }
    }

    async fn stored_user(h: &Harness, cpf: &str) -> User {
        let users = h.service.store().read(USERS_COLLECTION).await.unwrap();
        serde_json::from_value(users[cpf].clone()).unwrap()
    }

    /// Makes the next write of the `addresses` collection fail.
    fn block_address_writes(h: &Harness) {
        std::fs::create_dir(h.dir.path().join("addresses.json.tmp")).unwrap();
    }

    fn assert_field(result: StoreResult<impl std::fmt::Debug>, expected: &str) {
        match result {
            Err(StoreError::Field { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected field error on {expected}, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signup_then_duplicate() {
        let h = harness().await;

        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();
        assert_eq!(
            h.service.user_exists(ANA).await.unwrap(),
            UserStatus {
                exists: true,
                registered: false
            }
        );

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[0].cpf, ANA);

        let users = h.service.store().read(USERS_COLLECTION).await.unwrap();
        let stored: User = serde_json::from_value(users[ANA].clone()).unwrap();
        assert_eq!(stored.password, Some(salted_hash("pw1")));
        assert_eq!(stored.confirm_code, sent[0].code);

        let duplicate = h.service.create_user("Ana", ANA, "pw2", "b@x.com").await;
        assert_field(duplicate, "cpf");
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_create_user_checks_fields_in_order() {
        let h = harness().await;

        assert_field(h.service.create_user("", "123", "pw", "").await, "name");
        assert_field(h.service.create_user("Ana", "123", "pw", " ").await, "email");
        assert_field(
            h.service.create_user("Ana", "12345678900", "pw", "a@x.com").await,
            "cpf",
        );
        assert!(h.service.user_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_user_trims_name_and_email() {
        let h = harness().await;

        assert_field(h.service.create_user("   ", ANA, "pw1", "a@x.com").await, "name");
        h.service
            .create_user(" Ana ", ANA, "pw1", " a@x.com ")
            .await
            .unwrap();

        let stored = stored_user(&h, ANA).await;
        assert_eq!(stored.name, "Ana");
        assert_eq!(stored.email, "a@x.com");
        assert_eq!(h.notifier.sent()[0].name, "Ana");
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_signup() {
        let dir = TempDir::new().unwrap();
        let cfg = CoreConfig::with_data_dir(dir.path().to_path_buf());
        let service = DataService::new(Arc::new(cfg), Arc::new(FailingNotifier));
        service.init().await.unwrap();

        service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();
        assert!(service.user_exists(ANA).await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_concurrent_signup_with_same_cpf_stores_one_user() {
        let h = harness().await;

        let first = h.service.clone();
        let second = h.service.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.create_user("Ana", ANA, "pw1", "a@x.com").await }),
            tokio::spawn(async move { second.create_user("Ana", ANA, "pw2", "b@x.com").await }),
        );
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(h.service.user_ids().await.unwrap(), vec![ANA.to_string()]);
    }

    #[tokio::test]
    async fn test_login_gating_and_projection() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();

        assert_field(h.service.login(ANA, "wrong").await, "pass");
        assert_field(h.service.login(BIA, "pw1").await, "cpf");

        let session = h.service.login(ANA, "pw1").await.unwrap();
        assert_eq!(session.user.name, "Ana");
        assert_eq!(session.user.cpf, ANA);
        assert_eq!(session.user.email, None);
        assert_eq!(session.user.orders, None);

        let code = h.notifier.sent()[0].code.clone();
        h.service.confirm_email(ANA, &code).await.unwrap();
        let session = h.service.login(ANA, "pw1").await.unwrap();
        assert_eq!(session.user.email.as_deref(), Some("a@x.com"));
    }

    #[tokio::test]
    async fn test_blank_password_account_cannot_log_in() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();

        let mut users = h.service.store().checkout(USERS_COLLECTION).await.unwrap();
        let mut user: User = users.get(ANA).unwrap().unwrap();
        user.password = None;
        users.insert(ANA, &user).unwrap();
        users.persist().await.unwrap();

        assert_field(h.service.login(ANA, "").await, "cpf");
        assert!(matches!(
            h.service.change_password(ANA, "", "new").await,
            Err(StoreError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_session_validation_and_expiry() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();
        let session = h.service.login(ANA, "pw1").await.unwrap();

        h.service.validate(ANA, &session.hash).await.unwrap();
        assert!(matches!(
            h.service.validate(ANA, "").await,
            Err(StoreError::Unauthenticated(msg)) if msg == NOT_LOGGED_IN
        ));
        assert!(matches!(
            h.service.validate(ANA, "forged").await,
            Err(StoreError::Unauthenticated(_))
        ));
        assert!(matches!(
            h.service.validate(BIA, &session.hash).await,
            Err(StoreError::Unauthenticated(msg)) if msg == NOT_REGISTERED
        ));

        h.clock.advance(Duration::minutes(10));
        h.service.validate(ANA, &session.hash).await.unwrap();

        h.clock.advance(Duration::milliseconds(1));
        assert!(matches!(
            h.service.validate(ANA, &session.hash).await,
            Err(StoreError::Unauthenticated(msg)) if msg == "the session has expired"
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();

        assert!(matches!(
            h.service.change_password(ANA, "nope", "pw2").await,
            Err(StoreError::Rejected(_))
        ));
        assert!(matches!(
            h.service.change_password(BIA, "pw1", "pw2").await,
            Err(StoreError::NotFound(_))
        ));

        h.service.change_password(ANA, "pw1", "pw2").await.unwrap();
        assert_field(h.service.login(ANA, "pw1").await, "pass");
        h.service.login(ANA, "pw2").await.unwrap();
    }

    #[tokio::test]
    async fn test_confirm_email_and_resend() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();

        assert_field(h.service.confirm_email(ANA, "bad").await, "confirm");
        assert_field(h.service.confirm_email(BIA, "bad").await, "cpf");

        assert_field(h.service.resend_confirmation(BIA).await, "cpf");
        h.service.resend_confirmation(ANA).await.unwrap();
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);

        h.service.confirm_email(ANA, &sent[0].code).await.unwrap();
        h.service.confirm_email(ANA, &sent[0].code).await.unwrap();
        assert!(h.service.user_exists(ANA).await.unwrap().registered);
    }

    #[tokio::test]
    async fn test_set_address_dedups_by_content() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();
        h.service.create_user("Bia", BIA, "pw1", "b@x.com").await.unwrap();

        let a = h
            .service
            .set_address(ANA, address("Rua A, 1", "01310-100"))
            .await
            .unwrap();
        let b = h
            .service
            .set_address(BIA, address("Rua A, 1", "01310100"))
            .await
            .unwrap();
        assert_eq!(a, b);

        let addresses = h.service.store().read(ADDRESSES_COLLECTION).await.unwrap();
        assert_eq!(addresses.len(), 1);

        let stored = h.service.address_for(ANA).await.unwrap();
        assert_eq!(stored.code.as_deref(), Some("01310100"));
        assert_eq!(stored.formatted_code().as_deref(), Some("01310-100"));
    }

    #[tokio::test]
    async fn test_set_address_requires_fields_and_user() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();

        let mut incomplete = address("Rua A, 1", "01310-100");
        incomplete.city = Some("  ".into());
        assert!(matches!(
            h.service.set_address(ANA, incomplete).await,
            Err(StoreError::Rejected(msg)) if msg == MISSING_FIELD
        ));
        assert!(matches!(
            h.service.set_address(BIA, address("Rua A, 1", "1")).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            h.service.address_for(ANA).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(h
            .service
            .store()
            .read(ADDRESSES_COLLECTION)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_order_numbering_within_a_day() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();
        h.service.create_user("Bia", BIA, "pw1", "b@x.com").await.unwrap();

        let products = vec![json!({"sku": "mug", "qty": 1})];
        let first = h
            .service
            .place_order(ANA, products.clone(), Some(address("Rua A, 1", "01310-100")))
            .await
            .unwrap();
        let second = h
            .service
            .place_order(BIA, products.clone(), Some(address("Rua A, 1", "01310100")))
            .await
            .unwrap();
        assert_eq!(first, 2610190000);
        assert_eq!(second, 2610190001);

        h.clock.set(local_noon(2026, 10, 20));
        let next_day = h
            .service
            .place_order(ANA, products, Some(address("Rua A, 1", "01310100")))
            .await
            .unwrap();
        assert_eq!(next_day, 2610200000);

        assert_eq!(
            h.service.order_ids().await.unwrap(),
            vec![first, second, next_day]
        );
        let order = h.service.order(first).await.unwrap();
        assert_eq!(order.cpf, ANA);
        assert_eq!(order.status, 0);
        assert_eq!(h.service.order(second).await.unwrap().cpf, BIA);
        assert_eq!(stored_user(&h, BIA).await.orders, Some(vec![second]));

        let addresses = h.service.store().read(ADDRESSES_COLLECTION).await.unwrap();
        assert_eq!(addresses.len(), 1);
        assert!(addresses.contains_key(&order.address));

        h.service
            .confirm_email(ANA, &h.notifier.sent()[0].code)
            .await
            .unwrap();
        let session = h.service.login(ANA, "pw1").await.unwrap();
        assert_eq!(session.user.orders, Some(vec![first, next_day]));
    }

    #[tokio::test]
    async fn test_place_order_requires_user_and_address() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();

        assert!(matches!(
            h.service.place_order(BIA, vec![], Some(address("x", "1"))).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            h.service.place_order(ANA, vec![], None).await,
            Err(StoreError::Rejected(msg)) if msg == NO_ADDRESS_GIVEN
        ));
        assert!(h.service.order_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_address_write_stops_order() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();
        block_address_writes(&h);

        assert!(matches!(
            h.service
                .place_order(ANA, vec![], Some(address("Rua A, 1", "01310100")))
                .await,
            Err(StoreError::FileWrite(_))
        ));
        assert!(h.service.order_ids().await.unwrap().is_empty());
        assert_eq!(stored_user(&h, ANA).await.orders, None);
    }

    #[tokio::test]
    async fn test_failed_address_write_leaves_user_unlinked() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();
        block_address_writes(&h);

        assert!(matches!(
            h.service
                .set_address(ANA, address("Rua A, 1", "01310100"))
                .await,
            Err(StoreError::FileWrite(_))
        ));
        assert_eq!(stored_user(&h, ANA).await.address, None);
        assert!(matches!(
            h.service.address_for(ANA).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_order_status() {
        let h = harness().await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();
        let id = h
            .service
            .place_order(ANA, vec![], Some(address("Rua A, 1", "01310100")))
            .await
            .unwrap();

        let updated = h.service.set_order_status(id, 2).await.unwrap();
        assert_eq!(updated.status, 2);
        assert_eq!(h.service.order(id).await.unwrap().status, 2);

        assert!(matches!(
            h.service.set_order_status(id + 1, 2).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_users_survive_sharding() {
        let h = harness_with_limit(500).await;
        h.service.create_user("Ana", ANA, "pw1", "a@x.com").await.unwrap();
        h.service.create_user("Bia", BIA, "pw2", "b@x.com").await.unwrap();

        assert_eq!(h.service.user_ids().await.unwrap(), vec![BIA, ANA]);
        assert!(h.dir.path().join("users").join(format!("{ANA}.json")).is_file());
        assert!(!h.dir.path().join("users.json").exists());

        h.service.login(BIA, "pw2").await.unwrap();
        assert!(h.service.user_exists(ANA).await.unwrap().exists);
    }
}
