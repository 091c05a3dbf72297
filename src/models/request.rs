// Intercepted request descriptors
// Author: kelexine (https://github.com/kelexine)

use crate::error::{CoordinatorError, Result};
use bytes::Bytes;
use phf::phf_map;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// What the client intends to do with the response (`Sec-Fetch-Dest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    Worker,
    Empty,
    Other,
}

/// `Sec-Fetch-Dest` header values → destination
static DESTINATIONS: phf::Map<&'static str, Destination> = phf_map! {
    "document" => Destination::Document,
    "iframe" => Destination::Document,
    "script" => Destination::Script,
    "style" => Destination::Style,
    "image" => Destination::Image,
    "font" => Destination::Font,
    "manifest" => Destination::Manifest,
    "worker" => Destination::Worker,
    "sharedworker" => Destination::Worker,
    "serviceworker" => Destination::Worker,
    "empty" => Destination::Empty,
};

impl Destination {
    /// Parse a `Sec-Fetch-Dest` value; unknown values map to `Other`.
    pub fn from_fetch_dest(value: &str) -> Self {
        DESTINATIONS
            .get(value.trim().to_ascii_lowercase().as_str())
            .copied()
            .unwrap_or(Destination::Other)
    }

    /// Navigation requests load a whole document.
    pub fn is_navigation(&self) -> bool {
        matches!(self, Destination::Document)
    }
}

/// A single outgoing request as seen by the coordinator.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
    /// Headers forwarded to the network as-is.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RequestDescriptor {
    /// Build a bodiless GET request.
    pub fn get(url: &str, destination: Destination) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| CoordinatorError::InvalidRequest(format!("invalid URL '{}': {}", url, e)))?;
        Ok(Self {
            method: "GET".to_string(),
            url,
            destination,
            headers: Vec::new(),
            body: Bytes::new(),
        })
    }

    /// GET for an origin-relative path under `origin`.
    pub fn for_path(origin: &Url, path: &str, destination: Destination) -> Result<Self> {
        let url = origin
            .join(path)
            .map_err(|e| CoordinatorError::InvalidRequest(format!("invalid path '{}': {}", path, e)))?;
        Self::get(url.as_str(), destination)
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// ASCII serialization of the request origin (`scheme://host[:port]`).
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Path plus query, the part forwarded upstream.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Identity under which a response is stored: method plus URL without fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_parsing() {
        assert_eq!(Destination::from_fetch_dest("document"), Destination::Document);
        assert_eq!(Destination::from_fetch_dest(" Image "), Destination::Image);
        assert_eq!(Destination::from_fetch_dest("audioworklet"), Destination::Other);
        assert!(Destination::from_fetch_dest("iframe").is_navigation());
        assert!(!Destination::Script.is_navigation());
    }

    #[test]
    fn test_cache_key_ignores_fragment() {
        let a = RequestDescriptor::get("http://localhost:8080/app.js#top", Destination::Script).unwrap();
        let b = RequestDescriptor::get("http://localhost:8080/app.js", Destination::Script).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(b.cache_key(), "GET http://localhost:8080/app.js");
    }

    #[test]
    fn test_origin_and_path() {
        let base = Url::parse("http://localhost:8080").unwrap();
        let req = RequestDescriptor::for_path(&base, "/calorie-calculator?x=1", Destination::Document).unwrap();
        assert_eq!(req.origin(), "http://localhost:8080");
        assert_eq!(req.path(), "/calorie-calculator");
        assert_eq!(req.path_and_query(), "/calorie-calculator?x=1");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RequestDescriptor::get("not a url", Destination::Other).is_err());
    }
}
