//! Session handling and method invocation over HTTP POST
//!
//! Two logical endpoints: `/xmlrpc/2/common` for authentication and
//! `/xmlrpc/2/object` for `execute_kw` calls. The client never retries on
//! its own; transient failures are the retry queue's job.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::ConnectionConfig;
use crate::util::compact_text;
use crate::wire::{decode_response, encode_call, Value};

const COMMON_ENDPOINT: &str = "/xmlrpc/2/common";
const OBJECT_ENDPOINT: &str = "/xmlrpc/2/object";
const RPC_TIMEOUT_SECS: u64 = 30;

/// Stateless RPC client; session ids are cached in the tenant's
/// [`ConnectionConfig`] by the caller, not here.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
}

impl RemoteClient {
    /// Build a client with the protocol's fixed request timeout.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http })
    }

    /// Authenticate against the common endpoint; a positive integer uid
    /// is a valid session id, anything else is an auth failure.
    pub async fn authenticate(
        &self,
        remote_url: &str,
        database: &str,
        username: &str,
        secret: &str,
    ) -> Result<i64> {
        let body = encode_call(
            "authenticate",
            &[
                Value::string(database),
                Value::string(username),
                Value::string(secret),
                Value::Struct(Vec::new()),
            ],
        );

        let response = self.post(remote_url, COMMON_ENDPOINT, body).await?;
        session_from_value(&decode_response(&response)?)
    }

    /// Session id from the config's cache, authenticating when absent.
    pub async fn ensure_session(&self, config: &ConnectionConfig) -> Result<i64> {
        match config.session_id {
            Some(uid) => Ok(uid),
            None => {
                self.authenticate(
                    &config.remote_url,
                    &config.database,
                    &config.username,
                    &config.secret,
                )
                .await
            }
        }
    }

    /// Invoke `model.method(args)` through `execute_kw`.
    ///
    /// Fault responses surface as [`Error::Fault`]; transport problems
    /// as [`Error::Api`].
    pub async fn call(
        &self,
        config: &ConnectionConfig,
        model: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let uid = self.ensure_session(config).await?;
        let body = encode_call("execute_kw", &execute_params(config, uid, model, method, args));

        let response = self.post(&config.remote_url, OBJECT_ENDPOINT, body).await?;
        match decode_response(&response)? {
            Value::Fault(message) => {
                tracing::error!(model, method, "remote call faulted: {message}");
                Err(Error::Fault(message))
            }
            value => Ok(value),
        }
    }

    /// `search_read` convenience: a domain filter plus a field list,
    /// returning the decoded record structs.
    pub async fn search_read(
        &self,
        config: &ConnectionConfig,
        model: &str,
        domain: Value,
        fields: &[&str],
    ) -> Result<Vec<Value>> {
        let field_values = Value::Array(fields.iter().map(|f| Value::string(*f)).collect());
        let result = self
            .call(config, model, "search_read", vec![domain, field_values])
            .await?;

        match result {
            Value::Array(records) => Ok(records),
            other => Err(Error::Api(format!(
                "search_read on {model} returned a non-array value: {other:?}"
            ))),
        }
    }

    /// `create` convenience: returns the new remote record id.
    pub async fn create(
        &self,
        config: &ConnectionConfig,
        model: &str,
        record: Value,
    ) -> Result<i64> {
        let result = self.call(config, model, "create", vec![record]).await?;
        result.as_i64().ok_or_else(|| {
            Error::Api(format!("create on {model} returned a non-integer id: {result:?}"))
        })
    }

    async fn post(&self, base_url: &str, endpoint: &str, body: String) -> Result<String> {
        let url = format!("{}{endpoint}", base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    Error::Api("timeout".to_string())
                } else {
                    Error::Api(error.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| Error::Api(error.to_string()))?;

        if !status.is_success() {
            return Err(Error::Api(format!(
                "HTTP {}: {}",
                status.as_u16(),
                compact_text(&text)
            )));
        }

        Ok(text)
    }
}

/// The execute envelope: `(db, uid, secret, model, method, args)`.
fn execute_params(
    config: &ConnectionConfig,
    uid: i64,
    model: &str,
    method: &str,
    args: Vec<Value>,
) -> Vec<Value> {
    vec![
        Value::string(&*config.database),
        Value::Int(uid),
        Value::string(&*config.secret),
        Value::string(model),
        Value::string(method),
        Value::Array(args),
    ]
}

/// A session id is a positive integer; the remote returns boolean-false
/// for bad credentials.
fn session_from_value(value: &Value) -> Result<i64> {
    match value {
        Value::Int(uid) if *uid > 0 => Ok(*uid),
        Value::Fault(message) => Err(Error::Auth(message.clone())),
        _ => Err(Error::Auth("invalid credentials".to_string())),
    }
}
