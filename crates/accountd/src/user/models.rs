//! User data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User entity from database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub last_login_time: Option<String>,
    pub last_login_ip: Option<String>,
    pub created_at: String,
}

/// Public identity fields (safe to return to clients).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Last login details for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LoginInfo {
    pub last_login_time: Option<String>,
    pub last_login_ip: Option<String>,
}

/// Default page number when pagination is requested.
pub const DEFAULT_PAGE: i64 = 1;

/// Default page size when pagination is requested.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// User list query parameters.
///
/// Both fields are kept as raw strings so that malformed values fall back to
/// the defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default, rename = "pageSize")]
    pub page_size: Option<String>,
}

impl UserListQuery {
    pub fn paged(page: i64, page_size: i64) -> Self {
        Self {
            page: Some(page.to_string()),
            page_size: Some(page_size.to_string()),
        }
    }

    /// Resolve the requested page window, or `None` for an unpaginated listing.
    pub fn pagination(&self) -> Option<Pagination> {
        let page = non_empty(self.page.as_deref());
        let page_size = non_empty(self.page_size.as_deref());

        if page.is_none() && page_size.is_none() {
            return None;
        }

        Some(Pagination {
            page: parse_positive(page).unwrap_or(DEFAULT_PAGE),
            page_size: parse_positive(page_size).unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse the leading integer of `value` (`"2abc"` and `"2.5"` both give 2),
/// keeping it only when it is at least 1.
fn parse_positive(value: Option<&str>) -> Option<i64> {
    let value = value?;
    let unsigned = value.strip_prefix('+').unwrap_or(value);
    if unsigned.starts_with('-') {
        return None;
    }
    let digits = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .map_or(unsigned, |end| &unsigned[..end]);
    digits.parse::<i64>().ok().filter(|n| *n >= 1)
}

/// A resolved page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Result of a user listing.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UserListing {
    /// Every user, no pagination requested.
    All { data: Vec<UserInfo> },
    /// One page of users plus the full row count.
    Page {
        total: i64,
        page: i64,
        #[serde(rename = "pageSize")]
        page_size: i64,
        data: Vec<UserInfo>,
    },
}

impl UserListing {
    pub fn items(&self) -> &[UserInfo] {
        match self {
            Self::All { data } | Self::Page { data, .. } => data,
        }
    }
}

/// Request body for a password change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
}
