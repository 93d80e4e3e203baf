//! Server IPC
//! ==========
//!
//! [`ServerClient`] moves bytes; [`ServerClientExt`] adds JSON on both ends.
//! [`http::HttpClient`] is the only transport: Elasticsearch has no other.

pub mod error;
pub mod http;

use serde::{de::DeserializeOwned, Serialize};

pub use error::ClientError;
use error::Result;

pub trait ServerClient: std::fmt::Display + std::fmt::Debug + Send + Sync {
    fn get_raw(&self, path: &str) -> Result<Vec<u8>>;
    fn put_raw(&self, path: &str, body: &[u8]) -> Result<Vec<u8>>;
    fn post_raw(&self, path: &str, body: &[u8]) -> Result<Vec<u8>>;
    fn delete_raw(&self, path: &str) -> Result<Vec<u8>>;
}

fn decode<R: DeserializeOwned>(reply: Result<Vec<u8>>) -> Result<R> {
    Ok(serde_json::from_slice(&reply?)?)
}

pub trait ServerClientExt: ServerClient {
    fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        decode(self.get_raw(path))
    }

    fn put<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        decode(self.put_raw(path, &serde_json::to_vec(body)?))
    }

    fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        decode(self.post_raw(path, &serde_json::to_vec(body)?))
    }

    fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        decode(self.delete_raw(path))
    }
}

impl<T: ServerClient + ?Sized> ServerClientExt for T {}
