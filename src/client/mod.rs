//! Search Client
//! =============
//!
//! The handful of Elasticsearch REST calls a test suite needs to seed data,
//! query it and wipe it again, typed over [`HttpClient`]. Responses keep only
//! the fields that are stable across 5.x – 8.x; `_source` and query bodies
//! stay as [`serde_json::Value`].

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::FixtureResult,
    server::ipc::{http::HttpClient, ClientError, ServerClient, ServerClientExt},
};

/// `GET /`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub name: String,
    pub cluster_name: String,
    #[serde(default)]
    pub cluster_uuid: Option<String>,
    pub version: VersionInfo,
    #[serde(default)]
    pub tagline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub number: String,
    #[serde(default)]
    pub lucene_version: Option<String>,
}

/// `GET /_cluster/health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub cluster_name: String,
    /// `green`, `yellow` or `red`.
    pub status: String,
    #[serde(default)]
    pub timed_out: bool,
    pub number_of_nodes: u32,
    #[serde(default)]
    pub active_shards: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledged {
    pub acknowledged: bool,
}

/// Reply to indexing a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexResponse {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version", default)]
    pub version: Option<u64>,
    /// `created` or `updated`.
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResponse {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    pub found: bool,
    #[serde(rename = "_source", default)]
    pub source: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub took: u64,
    pub timed_out: bool,
    pub hits: Hits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    pub total: TotalHits,
    pub hits: Vec<Hit>,
}

/// 6.x reports a bare number, 7.x and later an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Object { value: u64, relation: String },
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Count(value) | TotalHits::Object { value, .. } => *value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Option<Value>,
}

/// Path from raw segments, each percent-encoded.
fn path(segments: &[&str]) -> Result<String, ClientError> {
    let mut url = url::Url::parse("http://localhost/").map_err(|e| ClientError::Setup {
        reason: format!("bad URI: {e}"),
    })?;
    url.path_segments_mut()
        .map_err(|()| ClientError::Setup {
            reason: "base URL cannot have path segments".to_string(),
        })?
        .clear()
        .extend(segments);
    Ok(url.path().to_string())
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    http: HttpClient,
}

impl SearchClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(host, port, timeout),
        }
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    pub fn info(&self) -> FixtureResult<InfoResponse> {
        Ok(self.http.get("/")?)
    }

    pub fn cluster_health(&self) -> FixtureResult<ClusterHealth> {
        Ok(self.http.get("/_cluster/health")?)
    }

    /// `body` carries settings and mappings; `Value::Null` sends none.
    pub fn create_index(&self, index: &str, body: &Value) -> FixtureResult<Acknowledged> {
        let path = path(&[index])?;
        if body.is_null() {
            let bytes = self.http.put_raw(&path, &[])?;
            return Ok(serde_json::from_slice(&bytes).map_err(ClientError::from)?);
        }
        Ok(self.http.put(&path, body)?)
    }

    /// Store `document`; with `id == None` the server assigns one.
    pub fn index_document<D: Serialize>(
        &self,
        index: &str,
        id: Option<&str>,
        document: &D,
    ) -> FixtureResult<IndexResponse> {
        Ok(match id {
            Some(id) => self.http.put(&path(&[index, "_doc", id])?, document)?,
            None => self.http.post(&path(&[index, "_doc"])?, document)?,
        })
    }

    /// `None` when the document or the whole index does not exist.
    pub fn get_document(&self, index: &str, id: &str) -> FixtureResult<Option<GetResponse>> {
        match self.http.get::<GetResponse>(&path(&[index, "_doc", id])?) {
            Ok(doc) if doc.found => Ok(Some(doc)),
            Ok(_) => Ok(None),
            Err(ClientError::Remote { code: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Make everything indexed so far visible to search.
    pub fn refresh(&self, index: &str) -> FixtureResult<()> {
        self.http.post_raw(&path(&[index, "_refresh"])?, &[])?;
        Ok(())
    }

    pub fn search(&self, index: &str, query: &Value) -> FixtureResult<SearchResponse> {
        Ok(self.http.post(&path(&[index, "_search"])?, query)?)
    }

    /// Names of all indices, from `GET /_alias`.
    pub fn indices(&self) -> FixtureResult<Vec<String>> {
        let aliases: BTreeMap<String, Value> = self.http.get("/_alias")?;
        Ok(aliases.into_keys().collect())
    }

    pub fn delete_index(&self, index: &str) -> FixtureResult<Acknowledged> {
        Ok(self.http.delete(&path(&[index])?)?)
    }

    /// Delete every index except dot-prefixed system indices, returning the
    /// names removed.
    pub fn delete_all_indices(&self) -> FixtureResult<Vec<String>> {
        let mut deleted = Vec::new();
        for index in self.indices()? {
            if index.starts_with('.') {
                crate::trace!("Keeping system index {index}");
                continue;
            }
            self.delete_index(&index)?;
            deleted.push(index);
        }
        if !deleted.is_empty() {
            crate::debug!("Deleted indices: {deleted:?}");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::FixtureError;

    fn client_for(server: &mockito::Server) -> SearchClient {
        let addr = server.socket_address();
        SearchClient::new(&addr.ip().to_string(), addr.port(), Duration::from_secs(5))
    }

    #[test]
    fn paths_are_encoded() {
        assert_eq!(path(&["books"]).unwrap(), "/books");
        assert_eq!(path(&["books", "_doc", "a b/c"]).unwrap(), "/books/_doc/a%20b%2Fc");
    }

    #[test]
    fn info_and_health() {
        let mut server = mockito::Server::new();
        let _info = server
            .mock("GET", "/")
            .with_body(
                json!({
                    "name": "node-1",
                    "cluster_name": "elasticsearch_cluster_9201",
                    "cluster_uuid": "abc",
                    "version": {"number": "7.9.0", "lucene_version": "8.6.0", "build_flavor": "default"},
                    "tagline": "You Know, for Search"
                })
                .to_string(),
            )
            .create();
        let _health = server
            .mock("GET", "/_cluster/health")
            .with_body(
                json!({
                    "cluster_name": "elasticsearch_cluster_9201",
                    "status": "green",
                    "timed_out": false,
                    "number_of_nodes": 1,
                    "number_of_data_nodes": 1,
                    "active_shards": 0
                })
                .to_string(),
            )
            .create();

        let client = client_for(&server);
        let info = client.info().unwrap();
        assert_eq!(info.version.number, "7.9.0");
        assert_eq!(info.cluster_name, "elasticsearch_cluster_9201");
        let health = client.cluster_health().unwrap();
        assert_eq!(health.status, "green");
        assert_eq!(health.number_of_nodes, 1);
    }

    #[test]
    fn document_round_trip_calls() {
        let mut server = mockito::Server::new();
        let create = server
            .mock("PUT", "/books")
            .match_body(Matcher::Json(json!({"mappings": {"properties": {"title": {"type": "text"}}}})))
            .with_body(r#"{"acknowledged":true,"shards_acknowledged":true,"index":"books"}"#)
            .create();
        let index = server
            .mock("PUT", "/books/_doc/1")
            .match_body(Matcher::Json(json!({"title": "Dune"})))
            .with_status(201)
            .with_body(r#"{"_index":"books","_id":"1","_version":1,"result":"created"}"#)
            .create();
        let auto_id = server
            .mock("POST", "/books/_doc")
            .with_status(201)
            .with_body(r#"{"_index":"books","_id":"xyz","result":"created"}"#)
            .create();
        let refresh = server
            .mock("POST", "/books/_refresh")
            .with_body(r#"{"_shards":{"total":2,"successful":1,"failed":0}}"#)
            .create();
        let get = server
            .mock("GET", "/books/_doc/1")
            .with_body(r#"{"_index":"books","_id":"1","found":true,"_source":{"title":"Dune"}}"#)
            .create();

        let client = client_for(&server);
        assert!(client
            .create_index(
                "books",
                &json!({"mappings": {"properties": {"title": {"type": "text"}}}})
            )
            .unwrap()
            .acknowledged);
        let created = client
            .index_document("books", Some("1"), &json!({"title": "Dune"}))
            .unwrap();
        assert_eq!(created.result, "created");
        assert_eq!(created.version, Some(1));
        let generated = client
            .index_document("books", None, &json!({"title": "Emma"}))
            .unwrap();
        assert_eq!(generated.id, "xyz");
        client.refresh("books").unwrap();
        let doc = client.get_document("books", "1").unwrap().unwrap();
        assert_eq!(doc.source, Some(json!({"title": "Dune"})));

        for m in [create, index, auto_id, refresh, get] {
            m.assert();
        }
    }

    #[test]
    fn create_index_without_body() {
        let mut server = mockito::Server::new();
        let create = server
            .mock("PUT", "/empty")
            .match_body("")
            .with_body(r#"{"acknowledged":true}"#)
            .create();
        let client = client_for(&server);
        assert!(client.create_index("empty", &Value::Null).unwrap().acknowledged);
        create.assert();
    }

    #[test]
    fn missing_documents_are_none() {
        let mut server = mockito::Server::new();
        let _not_found = server
            .mock("GET", "/books/_doc/2")
            .with_status(404)
            .with_body(r#"{"_index":"books","_id":"2","found":false}"#)
            .create();
        let _no_index = server
            .mock("GET", "/nope/_doc/1")
            .with_status(404)
            .with_body(r#"{"error":{"type":"index_not_found_exception"},"status":404}"#)
            .create();
        let client = client_for(&server);
        assert_eq!(client.get_document("books", "2").unwrap(), None);
        assert_eq!(client.get_document("nope", "1").unwrap(), None);
    }

    #[test]
    fn search_reads_both_total_shapes() {
        let mut server = mockito::Server::new();
        let _v7 = server
            .mock("POST", "/books/_search")
            .match_body(Matcher::Json(json!({"query": {"match_all": {}}})))
            .with_body(
                r#"{"took":3,"timed_out":false,"hits":{"total":{"value":1,"relation":"eq"},
                   "hits":[{"_index":"books","_id":"1","_score":1.0,"_source":{"title":"Dune"}}]}}"#,
            )
            .create();
        let _v6 = server
            .mock("POST", "/legacy/_search")
            .with_body(r#"{"took":1,"timed_out":false,"hits":{"total":4,"hits":[]}}"#)
            .create();

        let client = client_for(&server);
        let res = client
            .search("books", &json!({"query": {"match_all": {}}}))
            .unwrap();
        assert_eq!(res.hits.total.value(), 1);
        assert_eq!(res.hits.hits[0].id, "1");
        let legacy = client.search("legacy", &json!({})).unwrap();
        assert_eq!(legacy.hits.total, TotalHits::Count(4));
    }

    #[test]
    fn delete_all_skips_system_indices() {
        let mut server = mockito::Server::new();
        let _alias = server
            .mock("GET", "/_alias")
            .with_body(r#"{"books":{"aliases":{}},".geoip_databases":{"aliases":{}},"authors":{"aliases":{"writers":{}}}}"#)
            .create();
        let books = server
            .mock("DELETE", "/books")
            .with_body(r#"{"acknowledged":true}"#)
            .create();
        let authors = server
            .mock("DELETE", "/authors")
            .with_body(r#"{"acknowledged":true}"#)
            .create();
        let system = server
            .mock("DELETE", "/.geoip_databases")
            .expect(0)
            .create();

        let client = client_for(&server);
        assert_eq!(client.indices().unwrap(), [".geoip_databases", "authors", "books"]);
        assert_eq!(client.delete_all_indices().unwrap(), ["authors", "books"]);
        books.assert();
        authors.assert();
        system.assert();
    }

    #[test]
    fn remote_errors_surface_as_client_errors() {
        let mut server = mockito::Server::new();
        let _exists = server
            .mock("PUT", "/books")
            .with_status(400)
            .with_body(r#"{"error":{"type":"resource_already_exists_exception"},"status":400}"#)
            .create();
        let client = client_for(&server);
        match client.create_index("books", &json!({})) {
            Err(FixtureError::Client(ClientError::Remote { code, message })) => {
                assert_eq!(code, 400);
                assert!(message.contains("resource_already_exists_exception"));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }
}
