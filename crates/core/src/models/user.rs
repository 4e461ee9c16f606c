use crate::hashing::{blank_password_hash, salted_hash};
use crate::session::Session;
use serde::{Deserialize, Serialize};

/// A registered customer, keyed by CPF in the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub cpf: String,
    /// Salted password hash. Records written without one behave as unusable passwords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub email: String,
    #[serde(default)]
    pub confirmed_email: bool,
    pub confirm_code: String,
    #[serde(default)]
    pub register_time: i64,
    /// Content hash of the user's address in the `addresses` collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

impl User {
    /// Creates a user registered at `register_time` (ms since epoch).
    ///
    /// `password_hash` must already be salted. The confirmation code is derived from the
    /// registration data and never changes afterwards.
    pub fn new(
        name: impl Into<String>,
        cpf: impl Into<String>,
        password_hash: String,
        email: impl Into<String>,
        register_time: i64,
    ) -> Self {
        let name = name.into();
        let cpf = cpf.into();
        let email = email.into();
        let confirm_code = salted_hash(&format!(
            "email{register_time}{cpf}confirm{password_hash}{email}code"
        ));

        Self {
            name,
            cpf,
            password: Some(password_hash),
            email,
            confirmed_email: false,
            confirm_code,
            register_time,
            address: None,
            orders: None,
            session: None,
        }
    }

    /// Stored password hash, with a missing hash reported as the blank-password sentinel.
    pub fn password_hash(&self) -> String {
        self.password.clone().unwrap_or_else(blank_password_hash)
    }

    /// True if the account cannot log in until a password is set.
    pub fn has_blank_password(&self) -> bool {
        self.password_hash() == blank_password_hash()
    }

    pub fn set_address(&mut self, address_hash: String) {
        self.address = Some(address_hash);
    }

    pub fn push_order(&mut self, order_id: u64) {
        self.orders.get_or_insert_with(Vec::new).push(order_id);
    }

    /// Replaces the current session and returns the new session hash.
    pub fn register_new_session(&mut self, now_millis: i64) -> String {
        let session = Session::issue(now_millis, &self.cpf, &self.name);
        let hash = session.hash.clone().unwrap_or_default();
        self.session = Some(session);
        hash
    }

    /// The part of the record a logged-in caller may see.
    ///
    /// Only name and CPF are disclosed until the email address has been confirmed.
    pub fn view(&self) -> UserView {
        if !self.confirmed_email {
            return UserView {
                name: self.name.clone(),
                cpf: self.cpf.clone(),
                email: None,
                address: None,
                orders: None,
            };
        }

        UserView {
            name: self.name.clone(),
            cpf: self.cpf.clone(),
            email: Some(self.email.clone()),
            address: self.address.clone(),
            orders: self.orders.clone(),
        }
    }
}

/// Projection of a [`User`] returned on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub name: String,
    pub cpf: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders: Option<Vec<u64>>,
}
