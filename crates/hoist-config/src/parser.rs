//! Cluster file loader
//!
//! Cluster files live at `<conf_dir>/<project>/<cluster>.yaml`. Loading a
//! cluster also loads its dependency clusters, depth first.

use crate::schema::{ClusterFile, ConfigSource, JobSection, scalars_to_strings};
use crate::topology::{Cluster, ConfigFile, Host, Job};
use crate::{ConfigError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Load a cluster and, recursively, its dependencies.
pub fn load_cluster(conf_dir: &Path, project: &str, cluster: &str) -> Result<Cluster> {
    let mut visiting = Vec::new();
    load_recursive(conf_dir, project, cluster, &mut visiting)
}

/// Load every cluster found under `conf_dir`, ordered by project then file name.
pub fn list_clusters(conf_dir: &Path) -> Result<Vec<Cluster>> {
    let mut clusters = Vec::new();
    for project_dir in sorted_entries(conf_dir)? {
        if !project_dir.is_dir() {
            continue;
        }
        let Some(project) = file_name(&project_dir) else {
            continue;
        };
        for path in sorted_entries(&project_dir)? {
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext));
            if !is_yaml || !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            clusters.push(load_cluster(conf_dir, &project, stem)?);
        }
    }
    Ok(clusters)
}

/// Read and parse a single cluster file without resolving it
pub fn read_cluster_file(path: &Path) -> Result<ClusterFile> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlError {
        path: path.to_path_buf(),
        source,
    })
}

/// Turn a parsed cluster file into a resolved [`Cluster`].
///
/// `base_dir` anchors relative `file:` config sources.
pub fn build_cluster(
    project: &str,
    default_name: &str,
    file: ClusterFile,
    base_dir: &Path,
    dependencies: Vec<Cluster>,
) -> Result<Cluster> {
    let name = file
        .cluster
        .name
        .unwrap_or_else(|| default_name.to_string());

    let jobs = file
        .jobs
        .into_iter()
        .map(|(job_name, section)| build_job(&job_name, section, base_dir))
        .collect::<Result<Vec<_>>>()?;

    Cluster::new(project, name, file.cluster.package, jobs, dependencies)
}

fn load_recursive(
    conf_dir: &Path,
    project: &str,
    cluster: &str,
    visiting: &mut Vec<String>,
) -> Result<Cluster> {
    let key = format!("{project}/{cluster}");
    if visiting.contains(&key) {
        let mut chain = visiting.clone();
        chain.push(key);
        return Err(ConfigError::DependencyCycle(chain.join(" -> ")));
    }

    let path = cluster_path(conf_dir, project, cluster).ok_or_else(|| {
        ConfigError::ClusterNotFound {
            project: project.to_string(),
            cluster: cluster.to_string(),
        }
    })?;
    debug!("Loading cluster {} from {}", key, path.display());
    let file = read_cluster_file(&path)?;

    visiting.push(key);
    let mut dependencies = Vec::with_capacity(file.cluster.dependencies.len());
    for dependency in &file.cluster.dependencies {
        let (dep_project, dep_cluster) = split_dependency(project, dependency)?;
        dependencies.push(load_recursive(conf_dir, dep_project, dep_cluster, visiting)?);
    }
    visiting.pop();

    let base_dir = path.parent().unwrap_or(conf_dir);
    build_cluster(project, cluster, file, base_dir, dependencies)
}

fn build_job(name: &str, section: JobSection, base_dir: &Path) -> Result<Job> {
    let hosts = section
        .hosts
        .iter()
        .map(|key| Host::parse(key))
        .collect::<Result<Vec<_>>>()?;

    let mut job = Job::new(name, hosts)?;
    job.super_job = section.super_job;
    job.binary = section.binary;
    job.package = section.package;
    job.vm_opts = scalars_to_strings(&section.vm_opts);
    job.system_properties = scalars_to_strings(&section.system_properties);
    job.classpath = scalars_to_strings(&section.classpath);
    job.main_entry = section.main_entry;
    job.hooks = section.hooks;

    for (file_name, source) in section.config {
        let lines = match source {
            Some(ConfigSource::Inline(lines)) => scalars_to_strings(&lines),
            Some(ConfigSource::File { file }) => read_line_file(&base_dir.join(file))?,
            None => {
                warn!("Config file {} of job {} has no body, skipping", file_name, name);
                continue;
            }
        };
        job.config_files
            .insert(file_name.clone(), ConfigFile::new(file_name, lines));
    }
    Ok(job)
}

/// Lines of a line file, trimmed, skipping blanks and `#` comments.
fn read_line_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn split_dependency<'a>(project: &'a str, dependency: &'a str) -> Result<(&'a str, &'a str)> {
    let (dep_project, dep_cluster) = dependency.split_once('/').unwrap_or((project, dependency));
    if dep_project.is_empty() || dep_cluster.is_empty() || dep_cluster.contains('/') {
        return Err(ConfigError::ValidationError(format!(
            "dependency '{dependency}' must be <project>/<cluster>"
        )));
    }
    Ok((dep_project, dep_cluster))
}

fn cluster_path(conf_dir: &Path, project: &str, cluster: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| conf_dir.join(project).join(format!("{cluster}.{ext}")))
        .find(|path| path.is_file())
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::ReadError {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = entries
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|source| ConfigError::ReadError {
            path: dir.to_path_buf(),
            source,
        })?;
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}
