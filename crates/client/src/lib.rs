//! DingTalk open API client
//!
//! Thin per-endpoint layer over `dingtalk-session`: each method builds one
//! HTTP request and lets the session's invoker supply the access token,
//! refreshing it when the service reports it expired.

pub mod client;
pub mod types;

pub use client::{Client, ClientOptions};
pub use types::{DepartmentLeader, DepartmentOrder, UnionIdUser, User, UserInfo, UserRole};

pub use dingtalk_auth::{Credentials, LoginCredentials, Token};
pub use dingtalk_session::{Error, ErrorKind, Result};
