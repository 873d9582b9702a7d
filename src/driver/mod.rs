//! Graph database driver abstraction.
//!
//! Defines the [`GraphDriver`] trait that all backend implementations must
//! satisfy, plus the bolt-protocol implementation. The driver is a black-box
//! executor of parameterized queries; every query string lives in
//! [`crate::repo`].

pub mod neo4j;

use serde_json::{Map, Value};

use crate::errors::Result;

/// One result row, keyed by the RETURN aliases of the query.
#[derive(Debug, Clone, Default)]
pub struct Record {
    values: Map<String, Value>,
}

impl Record {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Raw value for a column, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value for a column; `None` for absent or non-string values.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// String value for a column, defaulting to `""` for absent or null.
    ///
    /// Stores report unset string properties as null; for our schema the
    /// empty string and null both mean "unset".
    pub fn get_str_or_empty(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    /// List-of-strings value for a column; non-string elements are skipped.
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        self.values
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Eagerly collected result of one query.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub records: Vec<Record>,
}

/// Trait representing a graph database backend.
///
/// Required capabilities: merge-by-property writes, directed typed
/// relationships with properties, list and scalar parameter binding, ordered
/// record retrieval, and index creation on label+property. Implementations
/// must be safe for concurrent calls; the engine shares one handle across
/// its fan-out paths.
#[allow(async_fn_in_trait)]
pub trait GraphDriver: Send + Sync {
    /// Execute one parameterized query and eagerly collect its records.
    async fn execute(&self, query: &str, params: Map<String, Value>) -> Result<QueryResult>;

    /// Close the connection pool / session.
    async fn close(&self) -> Result<()>;
}
