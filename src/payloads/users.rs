use crate::model::Role;
use serde::{Deserialize, Serialize};

/// Identity-provider event: a user was created.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserPayload {
    pub clerk_id: String,
    pub role: Role,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UpdateRolePayload {
    pub role: Role,
}
