use crate::constants::{ORDER_SERIAL_SPAN, ORDER_STATUS_PLACED};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An order, keyed by its numeric id in the `orders` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    /// CPF of the user who placed the order.
    pub cpf: String,
    /// Content hash of the delivery address.
    pub address: String,
    /// Product lines as sent by the client; not interpreted by the store.
    #[serde(default)]
    pub products: Vec<Value>,
    #[serde(default)]
    pub status: i64,
}

impl Order {
    pub fn new(id: u64, cpf: String, address: String, products: Vec<Value>) -> Self {
        Self {
            id,
            cpf,
            address,
            products,
            status: ORDER_STATUS_PLACED,
        }
    }

    pub fn set_status(&mut self, status: i64) {
        self.status = status;
    }

    /// Next id for the day whose base is `day_base`, given the keys already stored.
    ///
    /// The serial is the number of stored ids at or after `day_base`, so ids sort by
    /// placement within a day. Past 9 999 orders a day the serial runs into the next day's
    /// range; that limit is not enforced here.
    pub fn next_id<'a>(day_base: u64, existing: impl IntoIterator<Item = &'a str>) -> u64 {
        let serial = existing
            .into_iter()
            .filter_map(|key| key.parse::<u64>().ok())
            .filter(|id| *id >= day_base)
            .count() as u64;
        day_base + serial
    }
}

/// `YYMMDD * 10000` for `date`, the first id of that day.
pub fn order_date_base(date: NaiveDate) -> u64 {
    let yy = u64::try_from(date.year().rem_euclid(100)).unwrap_or_default();
    let date_code = yy * 10_000 + u64::from(date.month()) * 100 + u64::from(date.day());
    date_code * ORDER_SERIAL_SPAN
}
