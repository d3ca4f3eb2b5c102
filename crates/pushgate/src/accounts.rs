//! User and device binding routes.
//!
//! Storage, key sealing and signature checks belong to collaborators behind
//! [`AccountService`] and [`SignatureVerifier`]. This module only decodes
//! the request, calls them in order and shapes the `{res, msg}` replies.

use std::sync::Arc;

use base64::Engine as _;
use hyper::StatusCode;
use pushgate_script::RequestContext;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors reported by an account store.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid user id: {0}")]
    InvalidUser(String),

    #[error("user not found: {0}")]
    NotFound(String),

    #[error("account store error: {0}")]
    Store(String),
}

/// A registered user as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    /// Key the user signature is checked against.
    pub public_key: String,
    /// Bound without a device.
    pub serverless: bool,
    /// User secret already sealed to the user's public key.
    pub sealed_secret: Vec<u8>,
}

/// Persistent user and device state.
pub trait AccountService: Send + Sync {
    fn upsert_user(&self, uid: &str, public_key: &str, serverless: bool) -> Result<User, AccountError>;

    fn bind_device(&self, uid: &str, device: &str, device_key: &str) -> Result<(), AccountError>;

    fn get_user(&self, uid: &str) -> Result<User, AccountError>;

    fn unbind_device(&self, uid: &str, device: &str) -> Result<(), AccountError>;

    fn update_push_token(
        &self,
        uid: &str,
        device: &str,
        token: &str,
        sandbox: bool,
    ) -> Result<(), AccountError>;
}

/// Checks the signatures a client attaches to account requests.
///
/// A bind request carries a user signature and, when a device is bound, a
/// separate device signature. Each is checked against its own key.
pub trait SignatureVerifier: Send + Sync {
    /// Whether the request is signed by the holder of the user's `public_key`.
    fn validate_user(&self, request: &RequestContext, public_key: &str) -> bool;

    /// Whether the request is signed by the device owning `device_key`.
    fn validate_device(&self, request: &RequestContext, device_key: &str) -> bool;
}

/// Status plus JSON body for an account route.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountReply {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl AccountReply {
    fn ok(body: serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn fail(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            body: json!({ "res": status.as_u16(), "msg": msg }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct BindUser {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    key: String,
}

#[derive(Debug, Deserialize)]
struct BindDevice {
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    key: String,
    #[serde(default, rename = "push-token")]
    push_token: String,
    #[serde(default)]
    sandbox: bool,
}

#[derive(Debug, Deserialize)]
struct BindParams {
    #[serde(default)]
    user: BindUser,
    #[serde(default)]
    device: Option<BindDevice>,
}

#[derive(Debug, Deserialize)]
struct UnbindParams {
    #[serde(default)]
    device: String,
    #[serde(default)]
    user: String,
}

/// Account routes wired to their collaborators.
#[derive(Clone)]
pub struct Accounts {
    service: Arc<dyn AccountService>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl Accounts {
    pub fn new(service: Arc<dyn AccountService>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { service, verifier }
    }

    /// `POST /v1/bind-user`
    pub fn bind_user(&self, request: &RequestContext) -> AccountReply {
        let params: BindParams = match serde_json::from_slice(request.body()) {
            Ok(params) => params,
            Err(_) => return AccountReply::fail(StatusCode::BAD_REQUEST, "invalid params"),
        };

        if !self.verifier.validate_user(request, &params.user.key) {
            return AccountReply::fail(StatusCode::UNAUTHORIZED, "invalid user sign");
        }
        if let Some(device) = &params.device {
            if !self.verifier.validate_device(request, &device.key) {
                return AccountReply::fail(StatusCode::UNAUTHORIZED, "invalid device sign");
            }
        }

        let uid = params.user.uid.as_str();
        let serverless = params.device.is_none();
        let user = match self.service.upsert_user(uid, &params.user.key, serverless) {
            Ok(user) => user,
            Err(e) => {
                tracing::debug!(uid, error = %e, "upsert user failed");
                return AccountReply::fail(StatusCode::BAD_REQUEST, "invalid user id");
            }
        };

        match &params.device {
            None => tracing::info!(uid, "bound serverless user"),
            Some(device) => {
                if let Err(e) = self.service.bind_device(uid, &device.uuid, &device.key) {
                    tracing::debug!(uid, device = %device.uuid, error = %e, "bind device failed");
                    return AccountReply::fail(StatusCode::BAD_REQUEST, "bind user device failed");
                }
                tracing::info!(uid, device = %device.uuid, "bound user device");

                if !device.push_token.is_empty() {
                    if let Err(e) = self.service.update_push_token(
                        uid,
                        &device.uuid,
                        &device.push_token,
                        device.sandbox,
                    ) {
                        tracing::warn!(uid, device = %device.uuid, error = %e, "push token update failed");
                    }
                }
            }
        }

        let key = base64::engine::general_purpose::STANDARD.encode(&user.sealed_secret);
        AccountReply::ok(json!({ "key": key }))
    }

    /// `POST /v1/unbind-user`
    pub fn unbind_user(&self, request: &RequestContext) -> AccountReply {
        let params: UnbindParams = match serde_json::from_slice(request.body()) {
            Ok(params) => params,
            Err(_) => {
                return AccountReply::fail(StatusCode::BAD_REQUEST, "unbind user device failed")
            }
        };

        if let Ok(user) = self.service.get_user(&params.user) {
            if !user.serverless && !self.verifier.validate_user(request, &user.public_key) {
                return AccountReply::fail(StatusCode::UNAUTHORIZED, "invalid user sign");
            }
        }

        if let Err(e) = self.service.unbind_device(&params.user, &params.device) {
            tracing::warn!(uid = %params.user, device = %params.device, error = %e, "unbind device failed");
        }

        AccountReply::ok(json!({ "uuid": params.device, "uid": params.user }))
    }
}
