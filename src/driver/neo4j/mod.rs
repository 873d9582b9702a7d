//! Bolt-protocol graph driver implementation.
//!
//! Uses `neo4rs` for async, pooled Bolt connections. Works against Neo4j and
//! Memgraph; the engine never talks to it directly, only through
//! [`crate::repo::GraphRepository`].

use neo4rs::{BoltType, Graph};
use serde_json::{Map, Value};

use crate::driver::{GraphDriver, QueryResult, Record};
use crate::errors::{EpigraphError, Result};

/// Bolt driver implementing [`GraphDriver`].
pub struct Neo4jDriver {
    graph: Graph,
}

impl Neo4jDriver {
    /// Connect and verify the bolt endpoint.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| EpigraphError::Driver(e.to_string()))?;
        Ok(Self { graph })
    }
}

/// Convert a JSON parameter value into its bolt representation.
///
/// Objects have no direct bolt mapping in our schema; they are bound as their
/// JSON text, matching the repository's attribute-serialization contract.
fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(neo4rs::BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => {
            BoltType::from(items.iter().map(json_to_bolt).collect::<Vec<BoltType>>())
        }
        Value::Object(_) => BoltType::from(value.to_string().as_str()),
    }
}

impl GraphDriver for Neo4jDriver {
    async fn execute(&self, query: &str, params: Map<String, Value>) -> Result<QueryResult> {
        let mut q = neo4rs::query(query);
        for (key, value) in &params {
            q = q.param(key.as_str(), json_to_bolt(value));
        }

        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(|e| EpigraphError::Driver(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| EpigraphError::Driver(e.to_string()))?
        {
            let value: Value = row
                .to()
                .map_err(|e| EpigraphError::Driver(e.to_string()))?;
            match value {
                Value::Object(map) => records.push(Record::new(map)),
                other => {
                    return Err(EpigraphError::Driver(format!(
                        "unexpected non-map row: {other}"
                    )))
                }
            }
        }

        Ok(QueryResult { records })
    }

    async fn close(&self) -> Result<()> {
        // neo4rs drops its pool with the Graph handle.
        Ok(())
    }
}
