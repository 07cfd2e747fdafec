//! Strongly typed form of a cluster YAML file.
//!
//! ```yaml
//! cluster:
//!   name: hdfs_test
//!   package: { name: hadoop.tar.gz, checksum: 0f3a... }
//!   dependencies: [zookeeper/zk_test]
//! jobs:
//!   namenode:
//!     super_job: base
//!     hosts: ["h1:9001/id=0/base_port=10000"]
//!     main_entry: { command: org.Main, extra_args: "--port %{namenode.x.base_port}" }
//!     config:
//!       core-site.xml: ["fs.defaultFS=hdfs://%{namenode.0.host}"]
//!       log4j.properties: { file: log4j.properties }
//! ```

use crate::topology::{MainEntry, PackageSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Root of a cluster file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterFile {
    /// Cluster level settings
    #[serde(default)]
    pub cluster: ClusterSection,

    /// Job definitions keyed by job name
    #[serde(default)]
    pub jobs: BTreeMap<String, JobSection>,
}

/// The `cluster:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterSection {
    /// Cluster name, defaults to the file stem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Default package for every job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageSpec>,

    /// Dependency clusters as `project/cluster`, or a bare cluster name in the same project
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// One entry of the `jobs:` map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSection {
    /// Parent job within the same cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_job: Option<String>,

    /// Executable to launch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,

    /// Package override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageSpec>,

    /// Host keys
    #[serde(default)]
    pub hosts: Vec<String>,

    /// VM flags
    #[serde(default)]
    pub vm_opts: Vec<Scalar>,

    /// System properties, without `-D`
    #[serde(default)]
    pub system_properties: Vec<Scalar>,

    /// Classpath entries
    #[serde(default)]
    pub classpath: Vec<Scalar>,

    /// Entry command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_entry: Option<MainEntry>,

    /// Config files keyed by name; a null body is skipped
    #[serde(default)]
    pub config: BTreeMap<String, Option<ConfigSource>>,

    /// Hook scripts keyed by hook name
    #[serde(default)]
    pub hooks: BTreeMap<String, String>,
}

/// Where a config file's lines come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigSource {
    /// Lines listed inline
    Inline(Vec<Scalar>),
    /// Lines read from a file, relative to the cluster file's directory
    File {
        /// Path of the line file
        file: PathBuf,
    },
}

/// A list entry written either as a string or a bare integer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Integer entry
    Integer(i64),
    /// String entry
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

/// Stringify a scalar list
pub fn scalars_to_strings(values: &[Scalar]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_job() {
        let yaml = r#"
cluster:
  name: zk_test
  package: { name: zookeeper.tar.gz, checksum: abc }
jobs:
  zk:
    hosts: ["h1:9001/id=0", "h2:9001/id=1"]
    vm_opts: [-Xmx1g, 42]
    main_entry: { command: org.Main, extra_args: "--x" }
    config:
      zoo.cfg: ["tickTime=2000", 7]
      empty:
      myid: { file: myid.txt }
    hooks: { pre_start: "echo hi" }
"#;
        let file: ClusterFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.cluster.name.as_deref(), Some("zk_test"));
        let zk = &file.jobs["zk"];
        assert_eq!(scalars_to_strings(&zk.vm_opts), vec!["-Xmx1g", "42"]);
        assert!(matches!(
            zk.config["zoo.cfg"],
            Some(ConfigSource::Inline(ref lines)) if lines.len() == 2
        ));
        assert!(zk.config["empty"].is_none());
        assert!(matches!(zk.config["myid"], Some(ConfigSource::File { .. })));
        assert_eq!(zk.hooks["pre_start"], "echo hi");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = "jobs:\n  zk:\n    hostz: []\n";
        assert!(serde_yaml::from_str::<ClusterFile>(yaml).is_err());

        let yaml = "cluster:\n  nam: x\n";
        assert!(serde_yaml::from_str::<ClusterFile>(yaml).is_err());
    }
}
