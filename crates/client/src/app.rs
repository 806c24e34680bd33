//! The authenticated request pipeline.

use std::collections::HashMap;
use std::time::Duration;

use forcekit_auth::{
    AuthError, ConnectedAppConfig, Credential, CredentialManager, CredentialStore, LoginSurface,
};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::records::{Identity, InsertResult, Limit, QueryResult, Record, SearchResult};
use crate::resource::Resource;

/// Per-request knobs.
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    /// Whether this request may fall back to interactive login when no
    /// usable credential exists. Off, the request fails with
    /// [`AuthError::UserAuthenticationRequired`] instead of prompting,
    /// which suits background work.
    pub allows_login: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { allows_login: true }
    }
}

/// An authenticated REST client for one connected app.
///
/// Every request follows the same pipeline: take the stored credential
/// (acquiring one first if the store is empty), send, and on an
/// unauthorized answer renew the credential and retry exactly once. A
/// second unauthorized answer fails the request instead of looping.
///
/// ```no_run
/// use forcekit_auth::testing::{MemoryStore, ScriptedLoginSurface};
/// use forcekit_auth::ConnectedAppConfig;
/// use forcekit_client::ConnectedApp;
/// use url::Url;
///
/// # let outcome = tokio_test::block_on(async {
/// let config = ConnectedAppConfig::new(
///     "3MVG9A2kN3Bn17hueVTGrrV0TNbxiJCMGHPQ9XU",
///     Url::parse("myapp://auth/callback").unwrap(),
/// );
/// let app = ConnectedApp::new(config, MemoryStore::new(), ScriptedLoginSurface::new());
/// let accounts = app.query("SELECT Id, Name FROM Account").await?;
/// println!("{} accounts", accounts.total_size);
/// # Ok::<(), forcekit_client::ClientError>(())
/// # });
/// # outcome.unwrap();
/// ```
pub struct ConnectedApp<S, L> {
    manager: CredentialManager<S, L>,
    http: Client,
}

impl<S, L> Clone for ConnectedApp<S, L> {
    fn clone(&self) -> Self {
        Self { manager: self.manager.clone(), http: self.http.clone() }
    }
}

impl<S, L> ConnectedApp<S, L>
where
    S: CredentialStore + 'static,
    L: LoginSurface + 'static,
{
    /// Build a client over the given store and login surface.
    #[must_use]
    pub fn new(config: ConnectedAppConfig, store: S, surface: L) -> Self {
        Self::with_manager(CredentialManager::new(config, store, surface))
    }

    /// Build a client around an existing credential manager.
    #[must_use]
    pub fn with_manager(manager: CredentialManager<S, L>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { manager, http }
    }

    /// The credential manager behind this client.
    #[must_use]
    pub fn manager(&self) -> &CredentialManager<S, L> {
        &self.manager
    }

    /// Send `resource` and decode the answer into `T`.
    pub async fn request<T>(
        &self,
        resource: &Resource,
        options: RequestOptions,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let body = self.execute(resource, options).await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Decoding(e.to_string()))
    }

    /// Send `resource`, discarding any answer body.
    ///
    /// Suits operations whose success answer is empty, such as record
    /// updates and deletes.
    pub async fn send(
        &self,
        resource: &Resource,
        options: RequestOptions,
    ) -> Result<(), ClientError> {
        self.execute(resource, options).await?;
        Ok(())
    }

    async fn execute(
        &self,
        resource: &Resource,
        options: RequestOptions,
    ) -> Result<Vec<u8>, ClientError> {
        let credential = match self.manager.cached_credential().await? {
            Some(credential) => credential,
            None => {
                self.manager
                    .grant_credential(None, options.allows_login)
                    .await?
            }
        };

        let first = self.dispatch(resource, &credential).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Self::classify(first).await;
        }

        debug!("request unauthorized, renewing credential and retrying once");
        let fresh = self
            .manager
            .grant_credential(Some(credential), options.allows_login)
            .await?;
        let second = self.dispatch(resource, &fresh).await?;
        if second.status() == StatusCode::UNAUTHORIZED {
            warn!("request unauthorized after credential renewal");
            return Err(AuthError::UserAuthenticationRequired.into());
        }
        Self::classify(second).await
    }

    async fn dispatch(
        &self,
        resource: &Resource,
        credential: &Credential,
    ) -> Result<Response, ClientError> {
        let request = resource.build(&self.http, credential, &self.manager.config().api_version)?;
        Ok(request.send().await?)
    }

    async fn classify(response: Response) -> Result<Vec<u8>, ClientError> {
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return Ok(body.to_vec());
        }
        Err(ClientError::from_response(status.as_u16(), &body))
    }

    /// Run a SOQL query.
    pub async fn query(&self, soql: &str) -> Result<QueryResult, ClientError> {
        self.query_as(soql).await
    }

    /// Run a SOQL query, decoding records into `T`.
    pub async fn query_as<T>(&self, soql: &str) -> Result<QueryResult<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        let resource = Resource::Query { soql: soql.to_string(), batch_size: None };
        self.request(&resource, RequestOptions::default()).await
    }

    /// Fetch the next batch of an earlier query.
    pub async fn query_next(&self, next_records_url: &str) -> Result<QueryResult, ClientError> {
        let resource = Resource::QueryNext { path: next_records_url.to_string() };
        self.request(&resource, RequestOptions::default()).await
    }

    /// Run a SOSL search and return the matching records.
    pub async fn search(&self, sosl: &str) -> Result<Vec<Record>, ClientError> {
        let resource = Resource::Search { sosl: sosl.to_string() };
        let result: SearchResult = self.request(&resource, RequestOptions::default()).await?;
        Ok(result.search_records)
    }

    /// Fetch the authenticated user's identity.
    pub async fn identity(&self) -> Result<Identity, ClientError> {
        self.request(&Resource::Identity, RequestOptions::default()).await
    }

    /// Fetch the org's API limits, keyed by limit name.
    pub async fn limits(&self) -> Result<HashMap<String, Limit>, ClientError> {
        self.request(&Resource::Limits, RequestOptions::default()).await
    }

    /// Fetch the org's object catalog.
    pub async fn describe_global(&self) -> Result<serde_json::Value, ClientError> {
        self.request(&Resource::DescribeGlobal, RequestOptions::default()).await
    }

    /// Fetch one object type's metadata.
    pub async fn describe(&self, object: &str) -> Result<serde_json::Value, ClientError> {
        let resource = Resource::Describe { object: object.to_string() };
        self.request(&resource, RequestOptions::default()).await
    }

    /// Fetch one record by id, decoded into `T`.
    pub async fn retrieve<T>(
        &self,
        object: &str,
        id: &str,
        fields: &[&str],
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let resource = Resource::Retrieve {
            object: object.to_string(),
            id: id.to_string(),
            fields: fields.iter().map(|field| (*field).to_string()).collect(),
        };
        self.request(&resource, RequestOptions::default()).await
    }

    /// Create a record and return its id.
    pub async fn insert(
        &self,
        object: &str,
        record: impl Serialize,
    ) -> Result<String, ClientError> {
        let record = serde_json::to_value(record)
            .map_err(|e| ClientError::Decoding(format!("record not serializable: {e}")))?;
        let resource = Resource::Insert { object: object.to_string(), record };
        let created: InsertResult = self.request(&resource, RequestOptions::default()).await?;
        Ok(created.id)
    }

    /// Change fields of an existing record.
    pub async fn update(
        &self,
        object: &str,
        id: &str,
        record: impl Serialize,
    ) -> Result<(), ClientError> {
        let record = serde_json::to_value(record)
            .map_err(|e| ClientError::Decoding(format!("record not serializable: {e}")))?;
        let resource = Resource::Update {
            object: object.to_string(),
            id: id.to_string(),
            record,
        };
        self.send(&resource, RequestOptions::default()).await
    }

    /// Delete a record.
    pub async fn delete(&self, object: &str, id: &str) -> Result<(), ClientError> {
        let resource = Resource::Delete { object: object.to_string(), id: id.to_string() };
        self.send(&resource, RequestOptions::default()).await
    }

    /// Call a custom Apex REST endpoint, decoding the answer into `T`.
    pub async fn apex<T>(
        &self,
        method: Method,
        path: &str,
        parameters: HashMap<String, String>,
        body: Option<serde_json::Value>,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let resource = Resource::Apex { method, path: path.to_string(), parameters, body };
        self.request(&resource, RequestOptions::default()).await
    }

    /// Revoke and delete the current credential.
    pub async fn log_out(&self) -> Result<(), ClientError> {
        self.manager.log_out().await?;
        Ok(())
    }
}
