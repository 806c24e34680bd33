//! Typed descriptors for every REST request the pipeline can make.

use std::collections::HashMap;

use forcekit_auth::Credential;
use reqwest::{header, Client, Method, RequestBuilder};
use url::Url;

use crate::error::ClientError;

/// One REST request, described independently of any credential.
///
/// A descriptor holds everything about a request except who sends it; the
/// pipeline later binds it to a credential, which supplies the instance
/// host and the bearer token. `Authorization` and `Accept` headers are
/// always set by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    /// GET the credential's identity URL.
    Identity,

    /// GET `limits`: the org's API allowances.
    Limits,

    /// GET `query`: run a SOQL query.
    Query {
        /// The SOQL statement.
        soql: String,
        /// Server-side batch size hint, 200 to 2000.
        batch_size: Option<u32>,
    },

    /// GET a continuation batch of an earlier query.
    QueryNext {
        /// Server-relative `nextRecordsUrl` from the previous batch.
        path: String,
    },

    /// GET `search`: run a SOSL search.
    Search {
        /// The SOSL statement.
        sosl: String,
    },

    /// GET `sobjects`: every object type in the org.
    DescribeGlobal,

    /// GET one object type's metadata.
    Describe {
        /// Object API name, such as `Account`.
        object: String,
    },

    /// GET one record by id.
    Retrieve {
        /// Object API name.
        object: String,
        /// Record id.
        id: String,
        /// Fields to select; empty selects everything.
        fields: Vec<String>,
    },

    /// POST a new record.
    Insert {
        /// Object API name.
        object: String,
        /// Field values of the new record.
        record: serde_json::Value,
    },

    /// PATCH an existing record.
    Update {
        /// Object API name.
        object: String,
        /// Record id.
        id: String,
        /// Field values to change.
        record: serde_json::Value,
    },

    /// DELETE a record.
    Delete {
        /// Object API name.
        object: String,
        /// Record id.
        id: String,
    },

    /// Call a custom Apex REST endpoint under `/services/apexrest`.
    Apex {
        /// HTTP method the endpoint expects.
        method: Method,
        /// Path below `/services/apexrest`.
        path: String,
        /// Query parameters.
        parameters: HashMap<String, String>,
        /// JSON body, for methods that carry one.
        body: Option<serde_json::Value>,
    },

    /// Escape hatch for endpoints the closed set does not cover.
    Custom {
        /// HTTP method.
        method: Method,
        /// Base URL; the credential's instance URL when `None`.
        base_url: Option<Url>,
        /// Path joined onto the base URL.
        path: String,
        /// Query parameters.
        parameters: HashMap<String, String>,
        /// Extra headers, applied on top of the pipeline's.
        headers: HashMap<String, String>,
        /// JSON body, for methods that carry one.
        body: Option<serde_json::Value>,
    },
}

impl Resource {
    /// Bind this descriptor to `credential` and produce the request.
    pub(crate) fn build(
        &self,
        http: &Client,
        credential: &Credential,
        api_version: &str,
    ) -> Result<RequestBuilder, ClientError> {
        let request = match self {
            Self::Identity => http.get(credential.identity_url.clone()),
            Self::Limits => http.get(data_url(credential, api_version, "limits")?),
            Self::Query { soql, batch_size } => {
                let mut request = http
                    .get(data_url(credential, api_version, "query")?)
                    .query(&[("q", soql.as_str())]);
                if let Some(batch) = batch_size {
                    request = request.header("Sforce-Query-Options", format!("batchSize={batch}"));
                }
                request
            }
            Self::QueryNext { path } => http.get(join_instance(credential, path)?),
            Self::Search { sosl } => http
                .get(data_url(credential, api_version, "search")?)
                .query(&[("q", sosl.as_str())]),
            Self::DescribeGlobal => http.get(data_url(credential, api_version, "sobjects")?),
            Self::Describe { object } => {
                http.get(data_url(credential, api_version, &format!("sobjects/{object}/describe"))?)
            }
            Self::Retrieve { object, id, fields } => {
                let mut request =
                    http.get(data_url(credential, api_version, &format!("sobjects/{object}/{id}"))?);
                if !fields.is_empty() {
                    request = request.query(&[("fields", fields.join(","))]);
                }
                request
            }
            Self::Insert { object, record } => http
                .post(data_url(credential, api_version, &format!("sobjects/{object}"))?)
                .json(record),
            Self::Update { object, id, record } => http
                .patch(data_url(credential, api_version, &format!("sobjects/{object}/{id}"))?)
                .json(record),
            Self::Delete { object, id } => {
                http.delete(data_url(credential, api_version, &format!("sobjects/{object}/{id}"))?)
            }
            Self::Apex { method, path, parameters, body } => {
                let url = join_instance(
                    credential,
                    &format!("/services/apexrest/{}", path.trim_start_matches('/')),
                )?;
                let mut request = http.request(method.clone(), url);
                if !parameters.is_empty() {
                    request = request.query(parameters);
                }
                if let Some(body) = body {
                    request = request.json(body);
                }
                request
            }
            Self::Custom { method, base_url, path, parameters, headers, body } => {
                let base = base_url
                    .clone()
                    .unwrap_or_else(|| credential.instance_url.clone());
                let mut request = http.request(method.clone(), base.join(path)?);
                if !parameters.is_empty() {
                    request = request.query(parameters);
                }
                for (name, value) in headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                if let Some(body) = body {
                    request = request.json(body);
                }
                request
            }
        };

        Ok(request
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", credential.access_token),
            )
            .header(header::ACCEPT, "application/json"))
    }
}

fn data_url(
    credential: &Credential,
    api_version: &str,
    suffix: &str,
) -> Result<Url, ClientError> {
    join_instance(credential, &format!("/services/data/{api_version}/{suffix}"))
}

fn join_instance(credential: &Credential, path: &str) -> Result<Url, ClientError> {
    credential.instance_url.join(path).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    //! Unit tests for resource.
    use super::*;

    fn credential() -> Credential {
        Credential::new(
            "tok".to_string(),
            Url::parse("https://na1.example.com").expect("valid URL"),
            Url::parse("https://login.example.com/id/00Dx0000000BV7z/005x00000012Q9P")
                .expect("valid URL"),
            None,
            None,
        )
    }

    fn build(resource: &Resource) -> reqwest::Request {
        resource
            .build(&Client::new(), &credential(), "v59.0")
            .expect("descriptor builds")
            .build()
            .expect("request builds")
    }

    fn query_value(request: &reqwest::Request, name: &str) -> Option<String> {
        request
            .url()
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Validates `Resource::Query` request building for the SOQL scenario.
    ///
    /// Assertions:
    /// - Confirms the URL targets the versioned query endpoint.
    /// - Confirms the statement rides in the `q` parameter.
    /// - Confirms the bearer and accept headers are present.
    #[test]
    fn test_query_request() {
        let request = build(&Resource::Query {
            soql: "SELECT Id, Name FROM Account".to_string(),
            batch_size: None,
        });

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().path(), "/services/data/v59.0/query");
        assert_eq!(request.url().host_str(), Some("na1.example.com"));
        assert_eq!(
            query_value(&request, "q").as_deref(),
            Some("SELECT Id, Name FROM Account")
        );
        assert_eq!(
            request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
            Some("Bearer tok")
        );
        assert_eq!(
            request
                .headers()
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    /// Validates `Resource::Query` request building for the batch size
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the hint becomes a `Sforce-Query-Options` header.
    #[test]
    fn test_query_batch_size_header() {
        let request = build(&Resource::Query {
            soql: "SELECT Id FROM Account".to_string(),
            batch_size: Some(200),
        });

        assert_eq!(
            request
                .headers()
                .get("Sforce-Query-Options")
                .and_then(|v| v.to_str().ok()),
            Some("batchSize=200")
        );
    }

    /// Validates `Resource::QueryNext` request building for the continuation
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the server-relative path lands on the instance host.
    #[test]
    fn test_query_next_joins_instance() {
        let request = build(&Resource::QueryNext {
            path: "/services/data/v59.0/query/01gx-2000".to_string(),
        });

        assert_eq!(
            request.url().as_str(),
            "https://na1.example.com/services/data/v59.0/query/01gx-2000"
        );
    }

    /// Validates `Resource::Identity` request building for the identity URL
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the request targets the credential's identity URL, not the
    ///   instance.
    #[test]
    fn test_identity_targets_identity_url() {
        let request = build(&Resource::Identity);

        assert_eq!(
            request.url().as_str(),
            "https://login.example.com/id/00Dx0000000BV7z/005x00000012Q9P"
        );
    }

    /// Validates `Resource::Retrieve` request building for the field list
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the fields join into one comma-separated parameter.
    /// - Confirms an empty list adds no parameter.
    #[test]
    fn test_retrieve_fields_parameter() {
        let with_fields = build(&Resource::Retrieve {
            object: "Account".to_string(),
            id: "001x000003DGb0AAG".to_string(),
            fields: vec!["Id".to_string(), "Name".to_string()],
        });
        assert_eq!(
            with_fields.url().path(),
            "/services/data/v59.0/sobjects/Account/001x000003DGb0AAG"
        );
        assert_eq!(query_value(&with_fields, "fields").as_deref(), Some("Id,Name"));

        let bare = build(&Resource::Retrieve {
            object: "Account".to_string(),
            id: "001x000003DGb0AAG".to_string(),
            fields: Vec::new(),
        });
        assert_eq!(bare.url().query(), None);
    }

    /// Validates `Resource::Insert` request building for the JSON body
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the method is POST on the object collection.
    /// - Confirms the record serializes into the body.
    #[test]
    fn test_insert_posts_record_json() {
        let record = serde_json::json!({"Name": "Acme"});
        let request = build(&Resource::Insert {
            object: "Account".to_string(),
            record: record.clone(),
        });

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().path(), "/services/data/v59.0/sobjects/Account");
        let body = request
            .body()
            .and_then(reqwest::Body::as_bytes)
            .expect("body present");
        assert_eq!(body, serde_json::to_vec(&record).expect("serializes").as_slice());
    }

    /// Validates `Resource::Update` and `Resource::Delete` request building
    /// for the record mutation scenario.
    ///
    /// Assertions:
    /// - Confirms update uses PATCH and delete uses DELETE on the record
    ///   path.
    #[test]
    fn test_update_and_delete_methods() {
        let update = build(&Resource::Update {
            object: "Account".to_string(),
            id: "001x000003DGb0AAG".to_string(),
            record: serde_json::json!({"Name": "Acme Holdings"}),
        });
        assert_eq!(update.method(), Method::PATCH);
        assert_eq!(
            update.url().path(),
            "/services/data/v59.0/sobjects/Account/001x000003DGb0AAG"
        );

        let delete = build(&Resource::Delete {
            object: "Account".to_string(),
            id: "001x000003DGb0AAG".to_string(),
        });
        assert_eq!(delete.method(), Method::DELETE);
        assert_eq!(
            delete.url().path(),
            "/services/data/v59.0/sobjects/Account/001x000003DGb0AAG"
        );
    }

    /// Validates `Resource::Apex` request building for the custom endpoint
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the path lands under `/services/apexrest` with or without
    ///   a leading slash.
    /// - Confirms parameters become the query string.
    #[test]
    fn test_apex_request() {
        let request = build(&Resource::Apex {
            method: Method::POST,
            path: "/echo".to_string(),
            parameters: HashMap::from([("verbose".to_string(), "true".to_string())]),
            body: Some(serde_json::json!({"ping": 1})),
        });

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().path(), "/services/apexrest/echo");
        assert_eq!(query_value(&request, "verbose").as_deref(), Some("true"));
    }

    /// Validates `Resource::Custom` request building for the base override
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms an explicit base URL replaces the instance host.
    /// - Confirms extra headers ride along.
    #[test]
    fn test_custom_base_override() {
        let request = build(&Resource::Custom {
            method: Method::GET,
            base_url: Some(Url::parse("https://other.example.com").expect("valid URL")),
            path: "/services/oauth2/userinfo".to_string(),
            parameters: HashMap::new(),
            headers: HashMap::from([("X-PrettyPrint".to_string(), "1".to_string())]),
            body: None,
        });

        assert_eq!(request.url().host_str(), Some("other.example.com"));
        assert_eq!(request.url().path(), "/services/oauth2/userinfo");
        assert_eq!(
            request
                .headers()
                .get("X-PrettyPrint")
                .and_then(|v| v.to_str().ok()),
            Some("1")
        );
    }
}
