use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde_json::json;

use crate::error::RemoteError;

use super::drive::{DriveApi, DriveFile};
use super::object_store::ObjectStore;
use super::sigv4::{self, encode_path, sha256_hex, AwsCredentials, SignedRequest};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

fn build_client() -> Result<Client, RemoteError> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()?)
}

fn send(request: RequestBuilder) -> Result<Response, RemoteError> {
    let response = request.send()?;
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let text = response.text().unwrap_or_default();
        tracing::debug!(%status, %text, "remote call rejected");
        Err(RemoteError::UnexpectedStatus { status, text })
    }
}

fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RemoteError> {
    Ok(send(request)?.json()?)
}

/// How object-store writes are authenticated.
#[derive(Debug, Clone, Default)]
pub enum ObjectStoreAuth {
    /// AWS Signature Version 4 with an access key pair
    SigV4(AwsCredentials),
    /// `Authorization: Bearer`, for custom endpoints (gateways) only
    Bearer(String),
    /// No credentials; the bucket policy must accept the write
    #[default]
    Anonymous,
}

/// Object store reached over HTTP PUT.
pub struct HttpObjectStore {
    client: Client,
    endpoint: Option<String>,
    region: String,
    acl: Option<String>,
    auth: ObjectStoreAuth,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: Option<String>,
        region: impl Into<String>,
        acl: Option<String>,
        auth: ObjectStoreAuth,
    ) -> Result<Self, RemoteError> {
        let auth = match auth {
            ObjectStoreAuth::Bearer(_) if endpoint.is_none() => {
                tracing::warn!("S3 does not accept bearer tokens; sending unsigned requests");
                ObjectStoreAuth::Anonymous
            }
            other => other,
        };
        Ok(Self {
            client: build_client()?,
            endpoint,
            region: region.into(),
            acl,
            auth,
        })
    }

    /// Where the PUT goes: the regional virtual-hosted bucket, or `{endpoint}/{key}`.
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        let key = encode_path(key);
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.region, key),
        }
    }

    /// Headers carrying the SigV4 signature for a PUT of `body` to `url`.
    fn signed_headers(
        &self,
        credentials: &AwsCredentials,
        url: &Url,
        content_type: &str,
        body: &[u8],
        at: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, RemoteError> {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(RemoteError::Malformed(format!("no host in {}", url))),
        };
        let payload_hash = sha256_hex(body);
        let amz_date = at.format("%Y%m%dT%H%M%SZ").to_string();

        let mut extra = vec![
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date),
        ];
        if let Some(session) = &credentials.session_token {
            extra.push(("x-amz-security-token".to_string(), session.clone()));
        }

        let mut signed = vec![
            ("host".to_string(), host),
            ("content-type".to_string(), content_type.to_string()),
        ];
        if let Some(acl) = &self.acl {
            signed.push(("x-amz-acl".to_string(), acl.clone()));
        }
        signed.extend(extra.iter().cloned());

        let request = SignedRequest {
            method: "PUT",
            path: url.path(),
            headers: signed,
            payload_hash: &payload_hash,
        };
        let authorization = sigv4::authorization(&request, credentials, &self.region, "s3", at);
        extra.push(("authorization".to_string(), authorization));
        Ok(extra)
    }
}

impl ObjectStore for HttpObjectStore {
    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), RemoteError> {
        let url = self.object_url(bucket, key);
        let url = Url::parse(&url).map_err(|e| RemoteError::Malformed(format!("bad object URL {}: {}", url, e)))?;

        let headers = match &self.auth {
            ObjectStoreAuth::SigV4(credentials) => {
                self.signed_headers(credentials, &url, content_type, &body, Utc::now())?
            }
            _ => Vec::new(),
        };

        let mut request = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type);
        if let Some(acl) = &self.acl {
            request = request.header("x-amz-acl", acl);
        }
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let ObjectStoreAuth::Bearer(token) = &self.auth {
            request = request.bearer_auth(token);
        }
        send(request.body(body))?;
        Ok(())
    }
}

/// Drive v3 REST client authenticated with an OAuth access token.
pub struct HttpDrive {
    client: Client,
    token: String,
    api_base: String,
    upload_base: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebViewLink {
    web_view_link: Option<String>,
}

impl HttpDrive {
    pub fn new(token: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_base_urls(token, DRIVE_API, DRIVE_UPLOAD_API)
    }

    /// Talk to another host serving the Drive v3 API and its upload endpoint.
    pub fn with_base_urls(
        token: impl Into<String>,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client()?,
            token: token.into(),
            api_base: api_base.into(),
            upload_base: upload_base.into(),
        })
    }

    fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&self.token);
        send(request)?;
        Ok(())
    }
}

/// Drive query for an exact name, skipping trashed files.
pub fn name_query(name: &str, parent: Option<&str>) -> String {
    let mut q = format!("name = '{}' and trashed = false", escape_query(name));
    if let Some(parent) = parent {
        q.push_str(&format!(" and '{}' in parents", escape_query(parent)));
    }
    q
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

impl DriveApi for HttpDrive {
    fn find_by_name(&self, name: &str, parent: Option<&str>) -> Result<Vec<DriveFile>, RemoteError> {
        let q = name_query(name, parent);
        let request = self
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&self.token)
            .query(&[("q", q.as_str()), ("spaces", "drive"), ("fields", "files(id, name)")]);
        let list: FileList = send_json(request)?;
        Ok(list.files)
    }

    fn create_folder(&self, name: &str) -> Result<DriveFile, RemoteError> {
        let request = self
            .client
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&self.token)
            .query(&[("fields", "id, name")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME }));
        send_json(request)
    }

    fn upload_file(&self, name: &str, parent: &str, body: Vec<u8>, content_type: &str) -> Result<DriveFile, RemoteError> {
        // Create the named file inside the folder first so it never exists anywhere else
        let request = self
            .client
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&self.token)
            .query(&[("fields", "id, name")])
            .json(&json!({ "name": name, "parents": [parent] }));
        let created: DriveFile = send_json(request)?;

        let request = self
            .client
            .patch(format!("{}/files/{}", self.upload_base, created.id))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "media"), ("fields", "id")])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        if let Err(e) = send(request) {
            // An empty file left behind would be picked up by the name lookup on the next run
            if let Err(cleanup) = self.delete_file(&created.id) {
                tracing::warn!(id = %created.id, error = %cleanup, "could not remove empty upload");
            }
            return Err(e);
        }
        Ok(created)
    }

    fn grant_public_read(&self, file_id: &str) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(format!("{}/files/{}/permissions", self.api_base, file_id))
            .bearer_auth(&self.token)
            .json(&json!({ "role": "reader", "type": "anyone" }));
        send(request)?;
        Ok(())
    }

    fn web_view_link(&self, file_id: &str) -> Result<String, RemoteError> {
        let request = self
            .client
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&self.token)
            .query(&[("fields", "webViewLink")]);
        let link: WebViewLink = send_json(request)?;
        link.web_view_link
            .ok_or_else(|| RemoteError::Malformed(format!("no webViewLink for {}", file_id)))
    }
}
