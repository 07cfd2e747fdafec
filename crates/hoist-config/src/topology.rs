//! Resolved topology types: clusters, jobs, hosts and config files.

use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Task id used when a host key has no `id` segment
pub const DEFAULT_TASK_ID: u32 = 0;

/// Base port used when a host key has no `base_port` segment
pub const DEFAULT_BASE_PORT: u32 = 10000;

/// Executable launched when neither a job nor its super job names one
pub const DEFAULT_BINARY: &str = "java";

/// One task of a job, bound to a supervisor address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Hostname the supervisor listens on
    pub hostname: String,
    /// Supervisor port
    pub port: u16,
    /// Task id, unique within the job
    pub task_id: u32,
    /// First port the task itself may bind
    pub base_port: u32,
    /// Every `key=value` segment of the host key, plus `host`, `port`, `id` and `base_port`
    pub attributes: BTreeMap<String, String>,
}

impl Host {
    /// Parse a host key of the form `hostname:port[/key=value]*`.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |segment: &str, reason: &str| ConfigError::InvalidHost {
            key: key.to_string(),
            segment: segment.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = key.split('/');
        let address = segments.next().unwrap_or_default();
        let (hostname, port) = address
            .split_once(':')
            .ok_or_else(|| invalid(address, "must be hostname:port"))?;
        if hostname.is_empty() {
            return Err(invalid(address, "has an empty hostname"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| invalid(address, "has a non-integer port"))?;

        let mut attributes = BTreeMap::new();
        let mut task_id = DEFAULT_TASK_ID;
        let mut base_port = DEFAULT_BASE_PORT;

        for segment in segments {
            let (name, value) = segment
                .split_once('=')
                .filter(|(name, value)| !name.is_empty() && !value.contains('='))
                .ok_or_else(|| invalid(segment, "must be a single key=value"))?;
            match name {
                "id" => {
                    let id: i64 = value
                        .parse()
                        .map_err(|_| invalid(segment, "has a non-integer task id"))?;
                    task_id = u32::try_from(id)
                        .map_err(|_| invalid(segment, "task id must be >= 0"))?;
                }
                "base_port" => {
                    let port: i64 = value
                        .parse()
                        .map_err(|_| invalid(segment, "has a non-integer base port"))?;
                    base_port = u32::try_from(port)
                        .ok()
                        .filter(|port| *port > 0)
                        .ok_or_else(|| invalid(segment, "base port must be > 0"))?;
                }
                _ => {}
            }
            attributes.insert(name.to_string(), value.to_string());
        }

        attributes.insert("host".to_string(), hostname.to_string());
        attributes.insert("port".to_string(), port.to_string());
        attributes.insert("id".to_string(), task_id.to_string());
        attributes.insert("base_port".to_string(), base_port.to_string());

        Ok(Self {
            hostname: hostname.to_string(),
            port,
            task_id,
            base_port,
            attributes,
        })
    }

    /// Canonical key, `hostname:port/id=<task id>`
    pub fn to_key(&self) -> String {
        format!("{}:{}/id={}", self.hostname, self.port, self.task_id)
    }

    /// Address of the supervisor owning this task
    pub fn supervisor_addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A named config file made of `key=value` style lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// File name, relative to the task's `conf` dir unless absolute
    pub name: String,
    /// Lines in declaration order
    pub lines: Vec<String>,
}

impl ConfigFile {
    /// Create a config file from its lines
    pub fn new(name: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }

    /// Merge with the parent's file of the same name.
    ///
    /// Own lines come first; parent lines follow unless a line with the same
    /// key (text before the first `=`) is already present.
    pub fn merge_with(&self, parent: &ConfigFile) -> ConfigFile {
        let mut keys: HashSet<&str> = self.lines.iter().map(|line| line_key(line)).collect();
        let mut lines = self.lines.clone();
        for line in &parent.lines {
            if keys.insert(line_key(line)) {
                lines.push(line.clone());
            }
        }
        ConfigFile::new(self.name.clone(), lines)
    }

    /// File body: lines joined by newlines with a trailing newline
    pub fn to_content(&self) -> String {
        let mut content = self.lines.join("\n");
        content.push('\n');
        content
    }
}

fn line_key(line: &str) -> &str {
    line.split_once('=').map_or(line, |(key, _)| key).trim()
}

/// Child entries first, then parent entries the child does not already list.
fn merge_list(child: &[String], parent: &[String]) -> Vec<String> {
    let mut merged = child.to_vec();
    for entry in parent {
        if !merged.contains(entry) {
            merged.push(entry.clone());
        }
    }
    merged
}

/// Package archive descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    /// Archive name on the package server
    pub name: String,
    /// Expected blake3 checksum, hex encoded
    pub checksum: String,
}

/// Main class or entry command plus its extra argument string
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MainEntry {
    /// Entry command, e.g. a main class
    #[serde(default)]
    pub command: String,
    /// Whitespace separated arguments appended after the command
    #[serde(default)]
    pub extra_args: String,
}

/// A role within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Job {
    /// Job name, unique within the cluster
    pub name: String,
    /// Parent job this one inherits from
    pub super_job: Option<String>,
    /// Executable to launch
    pub binary: Option<String>,
    /// Package override for this job
    pub package: Option<PackageSpec>,
    /// Hosts sorted by task id
    pub hosts: Vec<Host>,
    /// VM flags
    pub vm_opts: Vec<String>,
    /// `-D` system properties, without the prefix
    pub system_properties: Vec<String>,
    /// Classpath entries
    pub classpath: Vec<String>,
    /// Entry command
    pub main_entry: Option<MainEntry>,
    /// Config files keyed by name
    pub config_files: BTreeMap<String, ConfigFile>,
    /// Hook scripts keyed by hook name
    pub hooks: BTreeMap<String, String>,
}

impl Job {
    /// Create a job, sorting its hosts by task id.
    pub fn new(name: impl Into<String>, mut hosts: Vec<Host>) -> Result<Self> {
        let name = name.into();
        hosts.sort_by_key(|host| host.task_id);
        if let Some(pair) = hosts.windows(2).find(|pair| pair[0].task_id == pair[1].task_id) {
            return Err(ConfigError::DuplicateTaskId {
                job: name,
                task_id: pair[0].task_id,
            });
        }
        Ok(Self {
            name,
            hosts,
            ..Default::default()
        })
    }

    /// Merge this job with its declared super job.
    ///
    /// Hosts are never inherited.
    pub fn merge_with(&self, parent: &Job) -> Result<Job> {
        if self.super_job.as_deref() != Some(parent.name.as_str()) {
            return Err(ConfigError::NotInherited {
                job: self.name.clone(),
                parent: parent.name.clone(),
            });
        }

        let mut merged = self.clone();
        merged.vm_opts = merge_list(&self.vm_opts, &parent.vm_opts);
        merged.system_properties = merge_list(&self.system_properties, &parent.system_properties);
        merged.classpath = merge_list(&self.classpath, &parent.classpath);

        for (name, file) in &parent.config_files {
            let file = match self.config_files.get(name) {
                Some(own) => own.merge_with(file),
                None => file.clone(),
            };
            merged.config_files.insert(name.clone(), file);
        }
        for (name, script) in &parent.hooks {
            merged
                .hooks
                .entry(name.clone())
                .or_insert_with(|| script.clone());
        }

        if merged.binary.is_none() {
            merged.binary = parent.binary.clone();
        }
        if merged.package.is_none() {
            merged.package = parent.package.clone();
        }
        if merged.main_entry.is_none() {
            merged.main_entry = parent.main_entry.clone();
        }
        Ok(merged)
    }

    /// Host running the given task, if any
    pub fn host(&self, task_id: u32) -> Option<&Host> {
        self.hosts.iter().find(|host| host.task_id == task_id)
    }

    /// Executable name, falling back to [`DEFAULT_BINARY`]
    pub fn binary(&self) -> &str {
        self.binary.as_deref().unwrap_or(DEFAULT_BINARY)
    }

    /// Launch arguments before rendering.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = non_empty(&self.vm_opts).map(str::to_string).collect();
        args.extend(non_empty(&self.system_properties).map(|prop| format!("-D{prop}")));
        let classpath: Vec<&str> = non_empty(&self.classpath).collect();
        if !classpath.is_empty() {
            args.push("-cp".to_string());
            args.push(classpath.join(":"));
        }
        if let Some(entry) = &self.main_entry {
            if !entry.command.is_empty() {
                args.push(entry.command.clone());
            }
            args.extend(entry.extra_args.split_whitespace().map(str::to_string));
        }
        args
    }

    /// Config file bodies keyed by file name
    pub fn config_map(&self) -> BTreeMap<String, String> {
        self.config_files
            .iter()
            .map(|(name, file)| (name.clone(), file.to_content()))
            .collect()
    }

    /// `host:base_port` of every host, comma separated, in task order
    pub fn server_list(&self) -> String {
        self.hosts
            .iter()
            .map(|host| format!("{}:{}", host.hostname, host.base_port))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A deployment unit: jobs plus the clusters it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Project (directory) the cluster belongs to
    pub project: String,
    /// Cluster name
    pub name: String,
    /// Package used by jobs without their own
    pub package: Option<PackageSpec>,
    /// Resolved jobs keyed by name
    pub jobs: BTreeMap<String, Job>,
    /// Dependency clusters, index addressable
    pub dependencies: Vec<Cluster>,
}

impl Cluster {
    /// Build a cluster, merging every job with its super job.
    ///
    /// Inheritance is one hop: a child is merged with its parent as declared,
    /// not with the parent's own resolved form.
    pub fn new(
        project: impl Into<String>,
        name: impl Into<String>,
        package: Option<PackageSpec>,
        jobs: Vec<Job>,
        dependencies: Vec<Cluster>,
    ) -> Result<Self> {
        let mut declared = BTreeMap::new();
        for job in jobs {
            if declared.contains_key(&job.name) {
                return Err(ConfigError::DuplicateJob(job.name));
            }
            declared.insert(job.name.clone(), job);
        }

        let mut resolved = BTreeMap::new();
        for (name, job) in &declared {
            let job = match &job.super_job {
                Some(super_job) => {
                    let parent =
                        declared
                            .get(super_job)
                            .ok_or_else(|| ConfigError::UnknownSuperJob {
                                job: name.clone(),
                                super_job: super_job.clone(),
                            })?;
                    job.merge_with(parent)?
                }
                None => job.clone(),
            };
            resolved.insert(name.clone(), job);
        }

        Ok(Self {
            project: project.into(),
            name: name.into(),
            package,
            jobs: resolved,
            dependencies,
        })
    }

    /// Job by name
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    /// Dependency cluster by index
    pub fn dependency(&self, index: usize) -> Option<&Cluster> {
        self.dependencies.get(index)
    }

    /// Package for a job: its own, else the cluster default
    pub fn package_for<'a>(&'a self, job: &'a Job) -> Option<&'a PackageSpec> {
        job.package.as_ref().or(self.package.as_ref())
    }
}

fn non_empty(items: &[String]) -> impl Iterator<Item = &str> {
    items.iter().map(|item| item.trim()).filter(|item| !item.is_empty())
}
