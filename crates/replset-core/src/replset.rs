//! Replica-set topology and the admin seam that applies it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::{EnvError, Result};
use crate::node::NodeSpec;

/// Default replica-set name.
pub const DEFAULT_SET_ID: &str = "rs0";

/// How long the init script waits for the connected node to become a
/// writable primary after reconfiguring.
pub const PRIMARY_ELECTION_TIMEOUT_MS: u64 = 30_000;

/// One member entry of a replica-set configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberConfig {
    #[serde(rename = "_id")]
    pub id: u32,
    pub host: String,
    pub priority: u32,
}

/// Desired replication topology. Built once, applied once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaSetConfig {
    #[serde(rename = "_id")]
    pub id: String,
    pub members: Vec<MemberConfig>,
}

impl ReplicaSetConfig {
    /// Build the config from declared nodes, numbering members in order.
    pub fn from_nodes(set_id: &str, nodes: &[NodeSpec]) -> Result<Self> {
        let members = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| MemberConfig {
                id: i as u32,
                host: n.member_address(),
                priority: n.priority,
            })
            .collect();
        let config = Self {
            id: set_id.to_string(),
            members,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EnvError::InvalidConfig("replica set id is empty".to_string()));
        }
        if self.members.is_empty() {
            return Err(EnvError::InvalidConfig(format!(
                "replica set {} has no members",
                self.id
            )));
        }
        for (i, member) in self.members.iter().enumerate() {
            if self.members[..i].iter().any(|m| m.host == member.host) {
                return Err(EnvError::InvalidConfig(format!(
                    "duplicate member host {}",
                    member.host
                )));
            }
            if self.members[..i].iter().any(|m| m.id == member.id) {
                return Err(EnvError::InvalidConfig(format!(
                    "duplicate member id {}",
                    member.id
                )));
            }
        }
        if !self.members.iter().any(|m| m.priority > 0) {
            return Err(EnvError::InvalidConfig(format!(
                "replica set {} has no member that can become primary",
                self.id
            )));
        }
        Ok(())
    }

    /// Canonical JSON document accepted by `rs.initiate` / `rs.reconfig`.
    pub fn to_document(&self) -> serde_json::Value {
        json!({
            "_id": self.id,
            "members": self.members,
        })
    }

    /// SHA-256 of the canonical document; equal configs share a digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_document().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Membership the cluster should report once this config is applied.
    pub fn expected_membership(&self) -> MembershipState {
        MembershipState {
            set_id: self.id.clone(),
            members: self
                .members
                .iter()
                .map(|m| MemberState {
                    host: m.host.clone(),
                    priority: m.priority,
                })
                .collect(),
        }
    }

    /// mongosh script applying this config: initiate (tolerating an already
    /// initiated set), force-reconfigure to the same document, wait until the
    /// connected node is a writable primary, pin the shell read preference
    /// and cluster default concerns, then print the observed membership as
    /// one JSON line.
    ///
    /// `rs.initiate` returns before the election finishes; writes such as
    /// `setDefaultRWConcern` fail with NotWritablePrimary until it does.
    pub fn init_script(&self) -> String {
        format!(
            r#"const cfg = {doc};
try {{
  rs.initiate(cfg);
}} catch (e) {{
  if (e.codeName !== "AlreadyInitialized") {{ throw e; }}
}}
rs.reconfig(cfg, {{ force: true }});
const electionDeadline = Date.now() + {election_ms};
while (!db.hello().isWritablePrimary) {{
  if (Date.now() > electionDeadline) {{
    throw new Error("no writable primary after {election_ms}ms");
  }}
  sleep(500);
}}
db.getMongo().setReadPref("primary");
db.adminCommand({{ setDefaultRWConcern: 1, defaultReadConcern: {{ level: "majority" }}, defaultWriteConcern: {{ w: "majority" }} }});
const conf = rs.conf();
print(JSON.stringify({{ set_id: conf._id, members: conf.members.map((m) => ({{ host: m.host, priority: Math.round(m.priority) }})) }}));
"#,
            doc = self.to_document(),
            election_ms = PRIMARY_ELECTION_TIMEOUT_MS
        )
    }
}

/// Observed membership of one replica-set member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberState {
    pub host: String,
    pub priority: u32,
}

/// Membership the cluster reports after a config was applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembershipState {
    pub set_id: String,
    pub members: Vec<MemberState>,
}

/// Issues the one-time administrative command declaring membership.
///
/// Implementations must be idempotent: applying the same config twice
/// leaves the same membership.
#[async_trait]
pub trait ReplicaSetAdmin: Send + Sync {
    async fn apply(&self, config: &ReplicaSetConfig) -> Result<MembershipState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<NodeSpec> {
        vec![
            NodeSpec::new("mongo1", "localhost", 27017).with_priority(2),
            NodeSpec::new("mongo2", "localhost", 27018).with_priority(1),
        ]
    }

    #[test]
    fn test_from_nodes_numbers_members_in_order() {
        let config = ReplicaSetConfig::from_nodes("rs0", &nodes()).unwrap();
        assert_eq!(config.members[0].id, 0);
        assert_eq!(config.members[1].id, 1);
        assert_eq!(config.members[1].host, "localhost:27018");
    }

    #[test]
    fn test_empty_members_rejected() {
        let err = ReplicaSetConfig::from_nodes("rs0", &[]).unwrap_err();
        assert!(matches!(err, EnvError::InvalidConfig(_)));
    }

    #[test]
    fn test_duplicate_hosts_rejected() {
        let dup = vec![
            NodeSpec::new("a", "localhost", 27017),
            NodeSpec::new("b", "localhost", 27017),
        ];
        assert!(ReplicaSetConfig::from_nodes("rs0", &dup).is_err());
    }

    #[test]
    fn test_no_primary_candidate_rejected() {
        let passive = vec![NodeSpec::new("a", "localhost", 27017).with_priority(0)];
        assert!(ReplicaSetConfig::from_nodes("rs0", &passive).is_err());
    }

    #[test]
    fn test_document_uses_mongo_field_names() {
        let config = ReplicaSetConfig::from_nodes("rs0", &nodes()).unwrap();
        let doc = config.to_document();
        assert_eq!(doc["_id"], "rs0");
        assert_eq!(doc["members"][0]["_id"], 0);
        assert_eq!(doc["members"][0]["priority"], 2);
    }

    #[test]
    fn test_digest_deterministic_and_topology_sensitive() {
        let a = ReplicaSetConfig::from_nodes("rs0", &nodes()).unwrap();
        let b = ReplicaSetConfig::from_nodes("rs0", &nodes()).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);

        let mut reordered = nodes();
        reordered.reverse();
        let c = ReplicaSetConfig::from_nodes("rs0", &reordered).unwrap();
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_init_script_contains_pattern() {
        let config = ReplicaSetConfig::from_nodes("rs0", &nodes()).unwrap();
        let script = config.init_script();
        let initiate = script.find("rs.initiate(cfg)").unwrap();
        let reconfig = script.find("rs.reconfig(cfg, { force: true })").unwrap();
        let read_pref = script.find("setReadPref(\"primary\")").unwrap();
        assert!(initiate < reconfig && reconfig < read_pref);
        assert!(script.contains("\"_id\":\"rs0\""));
    }

    #[test]
    fn test_init_script_waits_for_primary() {
        let config = ReplicaSetConfig::from_nodes("rs0", &nodes()).unwrap();
        let script = config.init_script();
        let reconfig = script.find("rs.reconfig(cfg, { force: true })").unwrap();
        let wait = script.find("while (!db.hello().isWritablePrimary)").unwrap();
        let concerns = script.find("setDefaultRWConcern").unwrap();
        let membership = script.find("rs.conf()").unwrap();
        assert!(reconfig < wait, "wait follows the reconfig");
        assert!(wait < concerns, "concerns are written on a primary");
        assert!(wait < membership);
        assert!(script.contains("Date.now() + 30000"));
        assert!(script.contains("no writable primary after 30000ms"));
    }

    #[test]
    fn test_expected_membership_mirrors_members() {
        let config = ReplicaSetConfig::from_nodes("rs0", &nodes()).unwrap();
        let state = config.expected_membership();
        assert_eq!(state.set_id, "rs0");
        assert_eq!(state.members.len(), 2);
        assert_eq!(state.members[0].priority, 2);
    }
}
