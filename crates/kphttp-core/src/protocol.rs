use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ProtocolError;
use crate::handshake::{self, VerifiedRequest};
use crate::request::{
    Associate, GetLogins, GetLoginsCount, Request, RequestType, SetLogin, PROTOCOL_VERSION,
};
use crate::response::{AuthenticatedResponse, Response};
use crate::store::{CredentialStore, KeyStore, LoginEntry, NewLogin, PasswordGenerator, SearchQuery};

pub const DEFAULT_PORT: u16 = 19455;

/// A request/response protocol that can be exposed by the HTTP listener.
#[async_trait::async_trait]
pub trait Protocol: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn default_port(&self) -> u16;
    /// Must always produce a reply; failures are expressed in the body.
    async fn handle(&self, request: Value) -> Value;
}

pub struct KeePassHttpProtocol {
    key_store: Arc<dyn KeyStore>,
    generator: Arc<dyn PasswordGenerator>,
    store: Arc<dyn CredentialStore>,
}

impl KeePassHttpProtocol {
    pub fn new(
        key_store: Arc<dyn KeyStore>,
        generator: Arc<dyn PasswordGenerator>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            key_store,
            generator,
            store,
        }
    }

    pub async fn handle_request(&self, body: &Value) -> Response {
        let Some(request) = Request::classify(body) else {
            debug!("rejecting unclassifiable request");
            return Response::ProtocolError;
        };
        let request_type = request.request_type();
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    ProtocolError::Collaborator(inner) => {
                        warn!(request_type = %request_type, error = %inner, "collaborator failed")
                    }
                    other => debug!(request_type = %request_type, error = %other, "request failed"),
                }
                Response::failure(request_type, Some(err.to_string()))
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response, ProtocolError> {
        let client_id = match &request {
            Request::Associate(associate) => Some(self.associate_client(associate).await?),
            other => other.header().id.clone(),
        };
        let verified = handshake::verify(
            request.request_type(),
            request.header(),
            client_id,
            self.key_store.as_ref(),
        )
        .await?;

        let response = match &request {
            Request::TestAssociate(_) | Request::Associate(_) => self.handle_noop(&verified).await?,
            Request::GetLogins(r) => self.handle_get_logins(&verified, r).await?,
            Request::GetLoginsCount(r) => self.handle_get_logins_count(&verified, r).await?,
            Request::GetAllLogins(_) => self.handle_get_all_logins(&verified).await?,
            Request::SetLogin(r) => self.handle_set_login(&verified, r).await?,
            Request::GeneratePassword(_) => self.handle_generate_password(&verified).await?,
        };
        Ok(Response::Authenticated(response))
    }

    async fn associate_client(&self, request: &Associate) -> Result<String, ProtocolError> {
        let encoded = request
            .key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ProtocolError::MissingKey)?;
        let key = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| ProtocolError::MissingKey)?;
        match self.key_store.associate(&key).await {
            Ok(id) => {
                info!(client = %id, "client associated");
                Ok(id)
            }
            Err(err) => {
                info!(error = %err, "association rejected");
                Err(ProtocolError::AssociationRejected)
            }
        }
    }

    async fn handle_noop(
        &self,
        request: &VerifiedRequest,
    ) -> Result<AuthenticatedResponse, ProtocolError> {
        let hash = self.store.fingerprint().await?;
        Ok(AuthenticatedResponse::new(request, hash))
    }

    async fn handle_get_logins(
        &self,
        request: &VerifiedRequest,
        body: &GetLogins,
    ) -> Result<AuthenticatedResponse, ProtocolError> {
        let query = SearchQuery {
            url: request.decrypt_field(body.url.as_deref())?,
            submit_url: request.decrypt_field(body.submit_url.as_deref())?,
            realm: request.decrypt_field(body.realm.as_deref())?,
        };
        let entries = self.store.search(&query).await?;
        let hash = self.store.fingerprint().await?;
        Ok(AuthenticatedResponse::with_entries(request, hash, entries))
    }

    async fn handle_get_logins_count(
        &self,
        request: &VerifiedRequest,
        body: &GetLoginsCount,
    ) -> Result<AuthenticatedResponse, ProtocolError> {
        let query = SearchQuery {
            url: request.decrypt_field(body.url.as_deref())?,
            submit_url: request.decrypt_field(body.submit_url.as_deref())?,
            realm: request.decrypt_field(body.realm.as_deref())?,
        };
        let count = self.store.search(&query).await?.len();
        let hash = self.store.fingerprint().await?;
        Ok(AuthenticatedResponse::with_count(request, hash, count))
    }

    async fn handle_get_all_logins(
        &self,
        request: &VerifiedRequest,
    ) -> Result<AuthenticatedResponse, ProtocolError> {
        let entries = self.store.search(&SearchQuery::all()).await?;
        let hash = self.store.fingerprint().await?;
        Ok(AuthenticatedResponse::with_entries(request, hash, entries))
    }

    async fn handle_set_login(
        &self,
        request: &VerifiedRequest,
        body: &SetLogin,
    ) -> Result<AuthenticatedResponse, ProtocolError> {
        let url = request.decrypt_field(body.url.as_deref())?;
        let submit_url = request.decrypt_field(body.submit_url.as_deref())?;
        let login = request.decrypt_field(body.login.as_deref())?;
        let password = request.decrypt_field(body.password.as_deref())?;
        let uuid = request.decrypt_field(body.uuid.as_deref())?;
        let realm = request.decrypt_field(body.realm.as_deref())?;

        let (Some(url), Some(login), Some(password)) = (
            url.filter(|v| !v.is_empty()),
            login.filter(|v| !v.is_empty()),
            password.filter(|v| !v.is_empty()),
        ) else {
            return Err(ProtocolError::MissingLoginFields);
        };

        match uuid.filter(|v| !v.is_empty()) {
            Some(uuid) => {
                self.store.update(&uuid, &login, &password).await?;
                info!(client = %request.id(), "updated login entry");
            }
            None => {
                self.store
                    .create(NewLogin {
                        url,
                        login,
                        password,
                        submit_url,
                        realm,
                    })
                    .await?;
                info!(client = %request.id(), "created login entry");
            }
        }

        let hash = self.store.fingerprint().await?;
        Ok(AuthenticatedResponse::new(request, hash))
    }

    // Legacy clients only understand login lists, so the generated password
    // travels as a synthetic entry with the quality estimate in `Login`.
    async fn handle_generate_password(
        &self,
        request: &VerifiedRequest,
    ) -> Result<AuthenticatedResponse, ProtocolError> {
        let password = self.generator.generate().await?;
        let quality = self.generator.estimate_quality_bits(&password).await?;
        let tag = RequestType::GeneratePassword.as_str();
        let entry = LoginEntry {
            name: tag.to_string(),
            login: quality.to_string(),
            password,
            uuid: tag.to_string(),
            string_fields: Vec::new(),
        };
        let hash = self.store.fingerprint().await?;
        Ok(AuthenticatedResponse::with_entries(request, hash, vec![entry]))
    }
}

#[async_trait::async_trait]
impl Protocol for KeePassHttpProtocol {
    fn name(&self) -> &str {
        "keepasshttp"
    }

    fn version(&self) -> &str {
        PROTOCOL_VERSION
    }

    fn default_port(&self) -> u16 {
        DEFAULT_PORT
    }

    async fn handle(&self, request: Value) -> Value {
        let response = self.handle_request(&request).await;
        match serde_json::to_value(&response) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "failed to serialize response");
                serde_json::to_value(Response::ProtocolError).unwrap_or(Value::Null)
            }
        }
    }
}
