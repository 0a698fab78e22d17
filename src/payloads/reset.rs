use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct RequestResetPayload {
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RedeemResetPayload {
    pub token: String,
}
