//! Person records as returned by `/api/people`

use serde::{Deserialize, Serialize};

/// One person entry
///
/// All fields are kept as the strings the API sends; `created` is a date and
/// `balance` a formatted currency amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first: String,
    pub last: String,
    pub email: String,
    pub address: String,
    pub created: String,
    pub balance: String,
}

impl Person {
    /// "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first, self.last)
    }
}
