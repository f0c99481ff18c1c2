//! Connection string handed to the test process.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::NodeSpec;

/// Read preference carried in the connection string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::PrimaryPreferred => "primaryPreferred",
            ReadPreference::Secondary => "secondary",
            ReadPreference::SecondaryPreferred => "secondaryPreferred",
            ReadPreference::Nearest => "nearest",
        }
    }
}

/// `mongodb://` URI pointing at the primary node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub replica_set: String,
    pub read_preference: ReadPreference,
    pub direct_connection: bool,
}

impl ConnectionString {
    /// URI for `primary` in set `replica_set`, with the defaults the test
    /// runner expects (`readPreference=primary`, `directConnection=true`).
    pub fn for_primary(primary: &NodeSpec, replica_set: &str) -> Self {
        Self {
            host: primary.host.clone(),
            port: primary.port,
            database: None,
            replica_set: replica_set.to_string(),
            read_preference: ReadPreference::Primary,
            direct_connection: true,
        }
    }

    pub fn with_database(mut self, database: Option<String>) -> Self {
        self.database = database.filter(|d| !d.is_empty());
        self
    }

    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }

    pub fn with_direct_connection(mut self, direct_connection: bool) -> Self {
        self.direct_connection = direct_connection;
        self
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mongodb://{}:{}/{}?replicaSet={}&readPreference={}&directConnection={}",
            self.host,
            self.port,
            self.database.as_deref().unwrap_or(""),
            self.replica_set,
            self.read_preference.as_str(),
            self.direct_connection
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uri() {
        let node = NodeSpec::new("mongo1", "localhost", 27017);
        let uri = ConnectionString::for_primary(&node, "rs0");
        assert_eq!(
            uri.to_string(),
            "mongodb://localhost:27017/?replicaSet=rs0&readPreference=primary&directConnection=true"
        );
    }

    #[test]
    fn test_uri_with_database_and_options() {
        let node = NodeSpec::new("mongo1", "127.0.0.1", 30001);
        let uri = ConnectionString::for_primary(&node, "dev")
            .with_database(Some("app_test".to_string()))
            .with_read_preference(ReadPreference::PrimaryPreferred)
            .with_direct_connection(false);
        assert_eq!(
            uri.to_string(),
            "mongodb://127.0.0.1:30001/app_test?replicaSet=dev&readPreference=primaryPreferred&directConnection=false"
        );
    }

    #[test]
    fn test_empty_database_ignored() {
        let node = NodeSpec::new("mongo1", "localhost", 27017);
        let uri = ConnectionString::for_primary(&node, "rs0").with_database(Some(String::new()));
        assert!(uri.database.is_none());
    }

    #[test]
    fn test_read_preference_serde() {
        let pref: ReadPreference = serde_json::from_str("\"secondaryPreferred\"").unwrap();
        assert_eq!(pref, ReadPreference::SecondaryPreferred);
    }
}
