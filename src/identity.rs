//! Users and referral links

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Base58 wallet; owner of the referrer's fee token accounts
    pub wallet_address: String,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A referral link and the fee terms it carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: String,
    /// Owner of the link, paid the referrer share
    pub user_id: String,
    pub slug: String,
    pub platform_fee_bps: u16,
    pub referrer_fee_bps: u16,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl Referral {
    /// Inactive or deleted links are treated as if they did not exist
    pub fn is_usable(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}
