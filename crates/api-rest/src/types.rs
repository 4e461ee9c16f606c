//! Request and response bodies for the REST API.
//!
//! Every response is an envelope with `success` and, on failure, `err`. Field validation
//! errors are reported as `{"<field>": "<message>"}`, everything else as a plain string.
//! Optional values are omitted from the JSON rather than sent as `null`.

use flatshop_core::{digits_only, Address, Order, UserView};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

/// Reduces a CPF sent as a JSON string or number to its digits.
pub(crate) fn cpf_from_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => digits_only(s),
        Some(Value::Number(n)) => digits_only(&n.to_string()),
        _ => String::new(),
    }
}

pub(crate) fn cpf_from_query(value: Option<&str>) -> String {
    digits_only(value.unwrap_or_default())
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CpfQuery {
    pub cpf: Option<String>,
}

/// Credentials for session-checked endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionQuery {
    pub cpf: Option<String>,
    pub session: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderQuery {
    pub cpf: Option<String>,
    pub session: Option<String>,
    pub id: Option<String>,
}

/// Parameters of the link sent in the confirmation email.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConfirmQuery {
    pub cpf: Option<String>,
    pub confirm: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CreateUserReq {
    pub name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub cpf: Option<Value>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CpfReq {
    #[schema(value_type = Option<String>)]
    pub cpf: Option<Value>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordReq {
    #[schema(value_type = Option<String>)]
    pub cpf: Option<Value>,
    pub old_pass: Option<String>,
    pub new_pass: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginReq {
    #[schema(value_type = Option<String>)]
    pub cpf: Option<Value>,
    pub password: Option<String>,
}

/// Address as sent by clients. The postal code may be a string or a number.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AddressInput {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub neigh: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[schema(value_type = Option<String>)]
    pub code: Option<Value>,
}

impl From<AddressInput> for Address {
    fn from(input: AddressInput) -> Self {
        Address {
            line1: input.line1,
            line2: input.line2,
            neigh: input.neigh,
            city: input.city,
            state: input.state,
            code: input.code.and_then(scalar_to_string),
        }
    }
}

/// Session credentials may come in the body instead of the query string.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct AddressReq {
    #[schema(value_type = Option<String>)]
    pub cpf: Option<Value>,
    pub session: Option<String>,
    pub address: Option<AddressInput>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct PlaceOrderReq {
    #[schema(value_type = Option<String>)]
    pub cpf: Option<Value>,
    pub session: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub products: Vec<Value>,
    pub address: Option<AddressInput>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusRes {
    pub status: String,
}

/// Envelope for operations with no payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct AckRes {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub err: Option<Value>,
}

/// Returned by session-checked endpoints when the session is missing or invalid.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthFailureRes {
    pub success: bool,
    #[schema(value_type = Object)]
    pub err: Value,
    pub logged: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserExistsRes {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub err: Option<Value>,
    pub exists: bool,
    pub registered: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateUserRes {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub err: Option<Value>,
    pub cpf: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginRes {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub err: Option<Value>,
    pub cpf: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub user: Option<UserView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddressRes {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub err: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub address: Option<Address>,
    pub logged: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderRes {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub err: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub order: Option<Order>,
    pub logged: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlaceOrderRes {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub err: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub logged: bool,
}
