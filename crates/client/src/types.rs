//! Request and response bodies for the supported endpoints

use serde::{Deserialize, Serialize};

/// `GET /user/get_org_user_count`
#[derive(Debug, Deserialize)]
pub(crate) struct OrgUserCount {
    #[serde(default)]
    pub count: u64,
}

/// Body of `POST /topapi/v2/user/get`.
#[derive(Debug, Serialize)]
pub(crate) struct UserGetRequest<'a> {
    pub userid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<&'a str>,
}

/// Body of `POST /topapi/user/getbyunionid`.
#[derive(Debug, Serialize)]
pub(crate) struct UnionIdRequest<'a> {
    pub unionid: &'a str,
}

/// Body of `POST /sns/getuserinfo_bycode`.
#[derive(Debug, Serialize)]
pub(crate) struct AuthCodeRequest<'a> {
    pub tmp_auth_code: &'a str,
}

/// Responses that wrap their payload in `result`.
#[derive(Debug, Deserialize)]
pub(crate) struct ResultEnvelope<T> {
    pub result: Option<T>,
}

/// `POST /sns/getuserinfo_bycode` wraps its payload in `user_info`.
#[derive(Debug, Deserialize)]
pub(crate) struct UserInfoEnvelope {
    pub user_info: Option<UserInfo>,
}

/// Department order of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentOrder {
    pub dept_id: i64,
    pub order: i64,
}

/// Whether a user leads a department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentLeader {
    pub dept_id: i64,
    pub leader: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub group_name: String,
}

/// User detail from `/topapi/v2/user/get`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub userid: String,
    pub unionid: String,
    pub name: String,
    pub avatar: String,
    /// International dialing code
    pub state_code: String,
    pub mobile: String,
    pub hide_mobile: bool,
    pub telephone: String,
    pub job_number: String,
    pub title: String,
    pub email: String,
    pub org_email: String,
    pub work_place: String,
    pub remark: String,
    pub dept_id_list: Vec<i64>,
    pub dept_order_list: Vec<DepartmentOrder>,
    pub extension: String,
    /// Milliseconds since the Unix epoch
    pub hired_date: Option<i64>,
    pub active: bool,
    pub real_authed: bool,
    pub senior: bool,
    pub admin: bool,
    pub boss: bool,
    pub leader_in_dept: Vec<DepartmentLeader>,
    pub role_list: Vec<UserRole>,
}

/// Result of `/topapi/user/getbyunionid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnionIdUser {
    /// 0 for internal staff, 1 for external contacts
    pub contact_type: i64,
    pub userid: String,
}

/// Login user resolved from a temporary auth code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    pub nick: String,
    pub unionid: String,
    pub openid: String,
    pub main_org_auth_high_level: bool,
}
