use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use tracing::{debug, error, trace};

use super::RecordStore;
use crate::RelayError;

/// Records held in a bucket of an S3-compatible HTTP object store.
///
/// Objects live at `{endpoint}/{bucket}/{key}`. Listing uses the
/// `list-type=2` query and follows continuation tokens.
#[derive(Clone)]
pub struct ObjectRecords {
    client: Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl ObjectRecords {
    pub fn new(client: Client, endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            token: None,
        }
    }

    /// Send `token` as a bearer credential on every request.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket)
    }

    /// URL of `key` with the key escaped as a single path segment, so ids
    /// holding `?`, `#` or `%` never alias another object.
    fn object_url(&self, key: &str) -> Result<Url, RelayError> {
        let mut url = Url::parse(&self.bucket_url())
            .map_err(|e| RelayError::storage(format!("invalid object store endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| RelayError::storage("object store endpoint cannot hold a path"))?
            .push(key);
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn fail(resp: reqwest::Response, action: &str) -> RelayError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        error!(%status, %body, action, "object store error");
        RelayError::storage(format!("{action} failed with {status}"))
    }
}

fn transport(action: &str, err: reqwest::Error) -> RelayError {
    RelayError::storage(format!("{action}: {err}"))
}

/// One page of a `ListBucketResult` document.
#[derive(Debug, Default, PartialEq)]
struct ListPage {
    keys: Vec<String>,
    next_token: Option<String>,
}

fn parse_list_page(xml: &str) -> Result<ListPage, RelayError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut page = ListPage::default();
    let mut truncated = false;
    let mut current: Option<Vec<u8>> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => current = Some(e.local_name().as_ref().to_vec()),
            Ok(Event::End(_)) => current = None,
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| RelayError::storage(format!("bad listing: {e}")))?
                    .into_owned();
                match current.as_deref() {
                    Some(b"Key") => page.keys.push(text),
                    Some(b"IsTruncated") => truncated = text == "true",
                    Some(b"NextContinuationToken") => page.next_token = Some(text),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(RelayError::storage(format!("bad listing: {e}"))),
        }
    }
    if !truncated {
        page.next_token = None;
    }
    Ok(page)
}

#[async_trait]
impl RecordStore for ObjectRecords {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RelayError> {
        let url = self.object_url(key)?;
        trace!(%url, "get object");
        let resp = self
            .authorize(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|e| transport("get object", e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(%url, "object absent");
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "get object").await);
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| transport("read object", e))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn put(&self, key: &str, body: &[u8]) -> Result<(), RelayError> {
        let url = self.object_url(key)?;
        trace!(%url, len = body.len(), "put object");
        let resp = self
            .authorize(self.client.put(url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| transport("put object", e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::fail(resp, "put object").await)
        }
    }

    async fn list(&self) -> Result<Vec<String>, RelayError> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query = vec![("list-type", "2".to_string())];
            if let Some(t) = &token {
                query.push(("continuation-token", t.clone()));
            }
            let resp = self
                .authorize(self.client.get(self.bucket_url()).query(&query))
                .send()
                .await
                .map_err(|e| transport("list objects", e))?;
            if !resp.status().is_success() {
                return Err(Self::fail(resp, "list objects").await);
            }
            let text = resp
                .text()
                .await
                .map_err(|e| transport("read listing", e))?;
            let page = parse_list_page(&text)?;
            keys.extend(page.keys);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(keys)
    }
}
