//! Placeholder renderer
//!
//! Expands `%{...}` references in config bodies, config names and arguments
//! against a resolved [`Cluster`].
//!
//! Global forms, applied in this order:
//! - `%{cluster.name}`
//! - `%{<job>.<task id>.<attribute>}`
//! - `%{<job>.<task id>.<attribute>+<n>}`
//! - `%{dependencies.<index>.<job>.server_list}`
//! - `%{<job>.server_list}`
//!
//! Host forms, applied afterwards for one task:
//! - `%{<job>.x.<attribute>}`
//! - `%{<job>.x.<attribute>+<n>}`

use crate::topology::Cluster;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;

/// Rendering error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Job not part of the cluster
    #[error("Invalid job name '{job}' in {placeholder}")]
    UnknownJob {
        /// Referenced job
        job: String,
        /// Placeholder text
        placeholder: String,
    },

    /// Task id is neither an integer nor `x`
    #[error("Task id should be an integer in {placeholder}")]
    InvalidTaskId {
        /// Placeholder text
        placeholder: String,
    },

    /// Job has no host with that task id
    #[error("Task {task_id} not found in {placeholder}")]
    TaskNotFound {
        /// Requested task id
        task_id: u32,
        /// Placeholder text
        placeholder: String,
    },

    /// Host has no such attribute
    #[error("Attribute '{attribute}' does not exist in {placeholder}")]
    MissingAttribute {
        /// Requested attribute
        attribute: String,
        /// Placeholder text
        placeholder: String,
    },

    /// Increment applied to a non-integer attribute
    #[error("Attribute '{attribute}' is not an integer in {placeholder}")]
    NotAnInteger {
        /// Attribute that failed to parse
        attribute: String,
        /// Placeholder text
        placeholder: String,
    },

    /// Dependency index past the end of the dependency list
    #[error("Dependency index {index} out of range in {placeholder}")]
    DependencyOutOfRange {
        /// Requested index
        index: usize,
        /// Placeholder text
        placeholder: String,
    },
}

/// Result type for rendering
pub type Result<T> = std::result::Result<T, RenderError>;

const CLUSTER_NAME: &str = "%{cluster.name}";
const CURRENT_TASK: &str = "x";

fn pattern(source: &str) -> Regex {
    let source = source
        .replace("JOB", r"([A-Za-z_][A-Za-z0-9_-]*)")
        .replace("ATTR", r"([A-Za-z_][A-Za-z0-9_]*)");
    Regex::new(&source).expect("placeholder patterns are valid")
}

static HOST_ATTR: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"%\{JOB\.([A-Za-z0-9_-]+)\.ATTR\}"));
static HOST_ATTR_INC: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"%\{JOB\.([A-Za-z0-9_-]+)\.ATTR\+([0-9]+)\}"));
static DEPENDENCY_SERVER_LIST: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"%\{dependencies\.([0-9]+)\.JOB\.server_list\}"));
static SERVER_LIST: LazyLock<Regex> = LazyLock::new(|| pattern(r"%\{JOB\.server_list\}"));
static CURRENT_ATTR: LazyLock<Regex> = LazyLock::new(|| pattern(r"%\{JOB\.x\.ATTR\}"));
static CURRENT_ATTR_INC: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"%\{JOB\.x\.ATTR\+([0-9]+)\}"));

/// Global then host render for one task
pub fn render(cluster: &Cluster, task_id: u32, input: &str) -> Result<String> {
    let output = render_global(cluster, input)?;
    render_host(cluster, task_id, &output)
}

/// Expand every task independent placeholder.
///
/// `%{<job>.x.<attribute>}` forms are left for [`render_host`].
pub fn render_global(cluster: &Cluster, input: &str) -> Result<String> {
    let output = input.replace(CLUSTER_NAME, &cluster.name);

    let output = replace_each(&HOST_ATTR, &output, |caps| {
        let Some(task_id) = task_ref(&caps[2], &caps[0])? else {
            return Ok(None);
        };
        host_attribute(cluster, &caps[1], task_id, &caps[3], &caps[0])
            .map(|value| Some(value.to_string()))
    })?;

    let output = replace_each(&HOST_ATTR_INC, &output, |caps| {
        let Some(task_id) = task_ref(&caps[2], &caps[0])? else {
            return Ok(None);
        };
        let value = host_attribute(cluster, &caps[1], task_id, &caps[3], &caps[0])?;
        increment(value, &caps[4], &caps[3], &caps[0]).map(Some)
    })?;

    let output = replace_each(&DEPENDENCY_SERVER_LIST, &output, |caps| {
        let placeholder = &caps[0];
        let dependency = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|index| cluster.dependency(index))
            .ok_or_else(|| RenderError::DependencyOutOfRange {
                index: caps[1].parse().unwrap_or(usize::MAX),
                placeholder: placeholder.to_string(),
            })?;
        server_list(dependency, &caps[2], placeholder).map(Some)
    })?;

    replace_each(&SERVER_LIST, &output, |caps| {
        server_list(cluster, &caps[1], &caps[0]).map(Some)
    })
}

/// Expand `%{<job>.x.<attribute>}` forms with the given task id.
pub fn render_host(cluster: &Cluster, task_id: u32, input: &str) -> Result<String> {
    let output = replace_each(&CURRENT_ATTR, input, |caps| {
        host_attribute(cluster, &caps[1], task_id, &caps[2], &caps[0])
            .map(|value| Some(value.to_string()))
    })?;

    replace_each(&CURRENT_ATTR_INC, &output, |caps| {
        let value = host_attribute(cluster, &caps[1], task_id, &caps[2], &caps[0])?;
        increment(value, &caps[3], &caps[2], &caps[0]).map(Some)
    })
}

/// Replace every occurrence of each match with the resolved value.
///
/// A resolver returning `None` leaves that placeholder untouched.
fn replace_each<F>(pattern: &Regex, input: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(&Captures<'_>) -> Result<Option<String>>,
{
    let mut output = input.to_string();
    for caps in pattern.captures_iter(input) {
        if let Some(value) = resolve(&caps)? {
            output = output.replace(&caps[0], &value);
        }
    }
    Ok(output)
}

/// `Some(id)` for a numeric task id, `None` for the current-task marker.
fn task_ref(raw: &str, placeholder: &str) -> Result<Option<u32>> {
    if raw == CURRENT_TASK {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| RenderError::InvalidTaskId {
            placeholder: placeholder.to_string(),
        })
}

fn host_attribute<'a>(
    cluster: &'a Cluster,
    job: &str,
    task_id: u32,
    attribute: &str,
    placeholder: &str,
) -> Result<&'a str> {
    let job = cluster.job(job).ok_or_else(|| RenderError::UnknownJob {
        job: job.to_string(),
        placeholder: placeholder.to_string(),
    })?;
    let host = job.host(task_id).ok_or_else(|| RenderError::TaskNotFound {
        task_id,
        placeholder: placeholder.to_string(),
    })?;
    host.attribute(attribute)
        .ok_or_else(|| RenderError::MissingAttribute {
            attribute: attribute.to_string(),
            placeholder: placeholder.to_string(),
        })
}

fn increment(value: &str, by: &str, attribute: &str, placeholder: &str) -> Result<String> {
    let not_an_integer = || RenderError::NotAnInteger {
        attribute: attribute.to_string(),
        placeholder: placeholder.to_string(),
    };
    let value: i64 = value.trim().parse().map_err(|_| not_an_integer())?;
    let by: i64 = by.parse().map_err(|_| not_an_integer())?;
    value
        .checked_add(by)
        .map(|sum| sum.to_string())
        .ok_or_else(not_an_integer)
}

fn server_list(cluster: &Cluster, job: &str, placeholder: &str) -> Result<String> {
    cluster
        .job(job)
        .map(|job| job.server_list())
        .ok_or_else(|| RenderError::UnknownJob {
            job: job.to_string(),
            placeholder: placeholder.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Host, Job};

    fn job(name: &str, hosts: &[&str]) -> Job {
        Job::new(
            name,
            hosts.iter().map(|key| Host::parse(key).unwrap()).collect(),
        )
        .unwrap()
    }

    fn fixture() -> Cluster {
        let zk = Cluster::new(
            "zookeeper",
            "zk_test",
            None,
            vec![job("zk", &["z1:9001/id=0/base_port=2181", "z2:9001/id=1/base_port=2181"])],
            vec![],
        )
        .unwrap();
        Cluster::new(
            "hdfs",
            "hdfs_test",
            None,
            vec![
                job("nn", &["h1:9001/id=0", "h2:9001/id=1/rack=r2"]),
                job("dn", &["d1:9001/id=0", "d2:9001/id=1", "d3:9001/id=2"]),
            ],
            vec![zk],
        )
        .unwrap()
    }

    #[test]
    fn test_cluster_name() {
        let cluster = fixture();
        assert_eq!(
            render_global(&cluster, "%{cluster.name}/%{cluster.name}").unwrap(),
            "hdfs_test/hdfs_test"
        );
    }

    #[test]
    fn test_attribute_and_increment() {
        let cluster = fixture();
        assert_eq!(
            render_global(&cluster, "%{nn.0.base_port+5}").unwrap(),
            "10005"
        );
        assert_eq!(
            render_global(&cluster, "http://%{nn.1.host}:%{nn.1.port} rack=%{nn.1.rack}").unwrap(),
            "http://h2:9001 rack=r2"
        );
    }

    #[test]
    fn test_server_lists() {
        let cluster = fixture();
        assert_eq!(
            render_global(&cluster, "%{nn.server_list}").unwrap(),
            "h1:10000,h2:10000"
        );
        assert_eq!(
            render_global(&cluster, "zk=%{dependencies.0.zk.server_list}").unwrap(),
            "zk=z1:2181,z2:2181"
        );
    }

    #[test]
    fn test_host_render_uses_current_task() {
        let cluster = fixture();
        let input = "--bind %{dn.x.host}:%{dn.x.base_port+1} --nn %{nn.0.host}";
        assert_eq!(
            render(&cluster, 2, input).unwrap(),
            "--bind d3:10001 --nn h1"
        );
        assert_eq!(
            render_global(&cluster, "%{dn.x.host}").unwrap(),
            "%{dn.x.host}"
        );
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let cluster = fixture();
        assert_eq!(
            render(&cluster, 1, "%{nn.x.host} %{nn.x.host} %{nn.0.host} %{nn.0.host}").unwrap(),
            "h2 h2 h1 h1"
        );
    }

    #[test]
    fn test_errors_name_the_placeholder() {
        let cluster = fixture();

        let err = render_global(&cluster, "a %{web.0.host} b").unwrap_err();
        assert!(matches!(err, RenderError::UnknownJob { ref job, .. } if job == "web"));
        assert!(err.to_string().contains("%{web.0.host}"));

        let err = render_global(&cluster, "%{nn.first.host}").unwrap_err();
        assert_eq!(
            err,
            RenderError::InvalidTaskId {
                placeholder: "%{nn.first.host}".into()
            }
        );

        let err = render_global(&cluster, "%{nn.5.host}").unwrap_err();
        assert!(matches!(err, RenderError::TaskNotFound { task_id: 5, .. }));

        let err = render_global(&cluster, "%{nn.0.rack}").unwrap_err();
        assert!(err.to_string().contains("%{nn.0.rack}"));

        let err = render_global(&cluster, "%{nn.0.host+1}").unwrap_err();
        assert!(matches!(err, RenderError::NotAnInteger { ref attribute, .. } if attribute == "host"));

        let err = render_global(&cluster, "%{dependencies.3.zk.server_list}").unwrap_err();
        assert!(matches!(err, RenderError::DependencyOutOfRange { index: 3, .. }));

        let err = render_global(&cluster, "%{dependencies.0.kafka.server_list}").unwrap_err();
        assert!(matches!(err, RenderError::UnknownJob { ref job, .. } if job == "kafka"));
    }

    #[test]
    fn test_host_render_missing_task() {
        let cluster = fixture();
        let err = render(&cluster, 2, "%{nn.x.host}").unwrap_err();
        assert!(matches!(err, RenderError::TaskNotFound { task_id: 2, .. }));
    }

    #[test]
    fn test_plain_text_untouched() {
        let cluster = fixture();
        let input = "no placeholders, ${HOME} and %{unknown} stay";
        assert_eq!(render(&cluster, 0, input).unwrap(), input);
    }
}
