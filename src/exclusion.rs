//! Paths that bypass instrumentation entirely.
//!
//! Entries are validated as URLs and stored as their path component, so
//! `exclude("http://example.com/ping")` and `exclude("/ping")` are the same
//! entry. Matching is exact against the request path; the query string
//! never takes part.
//!
//! The path must be spelled out: `http://example.com` and `example.com:8080`
//! are rejected rather than read as `/`. Exclude the root with
//! `http://example.com/` or `/`.

use std::collections::HashSet;

use http::Uri;
use parking_lot::RwLock;

use crate::error::Error;

/// A concurrency-safe set of excluded request paths.
#[derive(Debug, Default)]
pub struct ExclusionSet {
    paths: RwLock<HashSet<String>>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `url` and adds its path to the set.
    ///
    /// On error the set is left untouched.
    pub fn exclude(&self, url: &str) -> Result<(), Error> {
        let path = normalize(url)?;
        self.paths.write().insert(path);
        Ok(())
    }

    /// Removes a previously excluded URL. Returns whether it was present.
    pub fn include(&self, url: &str) -> Result<bool, Error> {
        let path = normalize(url)?;
        Ok(self.paths.write().remove(&path))
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.paths.read().contains(path)
    }

    /// Snapshot of the current entries, in no particular order.
    pub fn excluded(&self) -> Vec<String> {
        self.paths.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.paths.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.read().is_empty()
    }
}

fn normalize(url: &str) -> Result<String, Error> {
    let uri: Uri = url.parse().map_err(|e| Error::invalid_url(url, e))?;
    // `Uri::path` reports "/" for `http://host`; look at what was written
    let written = uri.path_and_query().map_or("", |pq| pq.as_str());
    if written.is_empty() || written.starts_with('?') {
        return Err(Error::invalid_url(url, "missing path"));
    }
    Ok(uri.path().to_owned())
}
