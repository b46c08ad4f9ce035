//! User management module.
//!
//! Provides profile lookups, login bookkeeping, password changes and the
//! paginated user directory.

mod models;
mod password;
mod repository;
mod service;

pub use models::{
    ChangePasswordRequest, DEFAULT_PAGE, DEFAULT_PAGE_SIZE, LoginInfo, Pagination, User, UserInfo,
    UserListQuery, UserListing,
};
pub use password::{MIN_PASSWORD_LEN, hash_password, verify_password};
pub use repository::UserRepository;
pub use service::UserService;
