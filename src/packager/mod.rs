//! Packager & executor (spec.md §4.7, C6).
//!
//! Turns a [`crate::builder::BuildOutput`] into an isolated workspace on
//! disk, builds a container image from it, and runs that image with
//! host networking. The only container-runtime verbs this module ever
//! invokes are `build`, `run --network host`, `rm`, `rmi` (spec.md §6
//! "Container runtime (collaborator)").

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use include_dir::{include_dir, Dir};
use tracing::{info, warn};

use crate::builder::BuildOutput;
use crate::config::Settings;
use crate::errors::{FlowsmithError, Result};
use crate::ir::emit::emit_file;
use crate::model::DbKind;

/// The embedded runtime library, copied verbatim into every workspace's
/// `lib/` directory (spec.md §6 "on-disk layout of a workspace").
static RUNTIME_LIB: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/go-runtime");

/// The module name every generated workspace uses (spec.md §6: "a
/// module manifest naming the module `test`").
const WORKSPACE_MODULE: &str = "test";

/// Go version the module manifest declares and the container recipe
/// builds with.
const GO_VERSION: &str = "1.22";

/// The runtime library's own dependency, needed by every job that opens
/// a progress bus (i.e. every job with at least one launch).
const NATS_MODULE: (&str, &str) = ("github.com/nats-io/nats.go", "v1.37.0");

/// A materialized, still-on-disk workspace ready to be built into a
/// container image.
pub struct Workspace {
    pub root: PathBuf,
    /// `Some` only when [`RunMode::Dev`] retained the directory; an
    /// inner `TempDir` auto-removes on drop otherwise.
    _guard: Option<tempfile::TempDir>,
}

impl Workspace {
    pub fn main_path(&self) -> PathBuf {
        self.root.join("main.go")
    }
}

/// Writes the emitted program, the runtime lib, and the dependency
/// manifest into a fresh workspace directory (spec.md §4.7, first
/// sentence).
pub fn materialize(build: &BuildOutput, job_id: &str, settings: &Settings) -> Result<Workspace> {
    let (root, guard) = if settings.run_mode.is_dev() {
        let root = std::env::temp_dir()
            .join("flowsmith-dev")
            .join(job_id);
        std::fs::create_dir_all(&root)?;
        (root, None)
    } else {
        let dir = tempfile::Builder::new()
            .prefix("flowsmith-")
            .tempdir()?;
        let root = dir.path().to_path_buf();
        (root, Some(dir))
    };

    let emitted = emit_file(&build.file);
    if !emitted.formatted {
        warn!(job_id, "gofmt unavailable or rejected input; writing unformatted source");
    }
    std::fs::write(root.join("main.go"), emitted.source)?;

    let lib_dir = root.join("lib");
    std::fs::create_dir_all(&lib_dir)?;
    extract_dir(&RUNTIME_LIB, &lib_dir)?;

    std::fs::write(root.join("go.mod"), render_go_mod(build))?;
    std::fs::write(root.join("Dockerfile"), render_dockerfile())?;

    info!(job_id, workspace = %root.display(), "materialized workspace");
    Ok(Workspace { root, _guard: guard })
}

fn extract_dir(dir: &Dir<'_>, dest: &Path) -> Result<()> {
    for file in dir.files() {
        let target = dest.join(file.path().file_name().expect("embedded file has a name"));
        std::fs::write(target, file.contents())?;
    }
    for sub in dir.dirs() {
        let target = dest.join(sub.path().file_name().expect("embedded dir has a name"));
        std::fs::create_dir_all(&target)?;
        extract_dir(sub, &target)?;
    }
    Ok(())
}

/// Builds the `go.mod` text: the module name, the runtime version, and
/// a pinned require line per DB driver actually referenced by the job
/// plus the NATS client the progress bus needs (spec.md §4.7: "a pinned
/// version for each DB driver referenced by the job").
fn render_go_mod(build: &BuildOutput) -> String {
    let mut kinds: Vec<DbKind> = build.connections.iter().map(|c| c.kind).collect();
    kinds.sort_by_key(|k| k.as_str());
    kinds.dedup_by_key(|k| k.as_str());

    let mut requires = String::new();
    if !build.launches.is_empty() {
        requires.push_str(&format!("require {} {}\n", NATS_MODULE.0, NATS_MODULE.1));
    }
    for kind in kinds {
        let (module, version) = kind.driver_module_and_version();
        requires.push_str(&format!("require {module} {version}\n"));
    }

    format!(
        "module {WORKSPACE_MODULE}\n\ngo {GO_VERSION}\n\n{requires}"
    )
}

/// Container recipe: copies the workspace, resolves dependencies,
/// builds a static binary, sets it as entrypoint (spec.md §4.7).
fn render_dockerfile() -> String {
    format!(
        "FROM golang:{GO_VERSION}-alpine AS build\n\
         WORKDIR /src\n\
         COPY . .\n\
         RUN go mod tidy\n\
         RUN CGO_ENABLED=0 go build -o /out/run ./main.go\n\n\
         FROM alpine:3.20\n\
         COPY --from=build /out/run /run\n\
         ENTRYPOINT [\"/run\"]\n"
    )
}

/// Runs a materialized workspace to completion: builds a uniquely
/// tagged image, runs it with host networking under a job-scoped
/// container name, then tears down the image/container per
/// [`RunMode`] (spec.md §4.7 last two sentences).
pub struct Executor {
    settings: Settings,
}

impl Executor {
    pub fn new(settings: Settings) -> Self {
        Executor { settings }
    }

    /// Builds and runs `workspace`, returning once the container exits.
    /// Non-zero container exit status is surfaced as a
    /// [`FlowsmithError::PackagingError`]; this does not distinguish a
    /// row-level worker error from an infra failure, since the
    /// container's stderr carries the distinguishing text already
    /// (spec.md §7 "Executions record the verbatim error text").
    pub fn run(&self, workspace: &Workspace, job_id: &str) -> Result<()> {
        let tag = format!("flowsmith/{job_id}:{}", unique_suffix(job_id));
        let container_name = format!("flowsmith-run-{job_id}");

        let build_result = self.build_image(&tag, &workspace.root);
        let run_result = build_result.and_then(|_| {
            self.run_container(&tag, &container_name, job_id)
        });

        if !self.settings.run_mode.is_dev() {
            self.rm_container(&container_name);
            self.rmi_image(&tag);
        } else {
            info!(job_id, tag, "dev mode: retaining image and container for inspection");
        }

        run_result
    }

    fn build_image(&self, tag: &str, workspace_root: &Path) -> Result<()> {
        let output = Command::new("docker")
            .arg("build")
            .arg("-t")
            .arg(tag)
            .arg(workspace_root)
            .output()?;
        check_status(output, "docker build")
    }

    fn run_container(&self, tag: &str, name: &str, job_id: &str) -> Result<()> {
        let output = Command::new("docker")
            .args(["run", "--network", "host", "--name", name])
            .arg("-e")
            .arg(format!("FLOWSMITH_BUS_URL={}", self.settings.bus_url))
            .arg("-e")
            .arg(format!("FLOWSMITH_TENANT_ID={}", self.settings.tenant_id))
            .arg(tag)
            .output()?;
        check_status(output, "docker run").map_err(|e| {
            FlowsmithError::PackagingError(format!("job {job_id} container failed: {e}"))
        })
    }

    fn rm_container(&self, name: &str) {
        if let Err(e) = Command::new("docker").args(["rm", "-f", name]).output() {
            warn!(name, error = %e, "failed to remove container");
        }
    }

    fn rmi_image(&self, tag: &str) {
        if let Err(e) = Command::new("docker").args(["rmi", "-f", tag]).output() {
            warn!(tag, error = %e, "failed to remove image");
        }
    }
}

fn check_status(output: Output, verb: &str) -> Result<()> {
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(FlowsmithError::PackagingError(format!(
            "{verb} failed: {stderr}"
        )))
    }
}

/// Short, deterministic-enough-for-a-single-run suffix distinguishing
/// this job's image tag from any previous build of the same job.
/// Collisions across concurrent runs of the same job are acceptable:
/// `docker build -t` on an existing tag simply replaces it, and this
/// module never relies on the old tag surviving.
fn unique_suffix(job_id: &str) -> String {
    format!("{:x}", md5_like_hash(job_id))
}

fn md5_like_hash(s: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::connection::{DbConnection, TlsMode};
    use crate::planner::Plan;

    fn empty_plan() -> Plan {
        Plan {
            steps: vec![],
            unreachable: vec![],
        }
    }

    fn conn(kind: DbKind) -> DbConnection {
        DbConnection {
            kind,
            host: "db".into(),
            port: 5432,
            database: "d".into(),
            user: "u".into(),
            password: "p".into(),
            tls_mode: TlsMode::Disable,
            extra: None,
        }
    }

    #[test]
    fn go_mod_declares_module_test_and_pinned_drivers() {
        let build = BuildOutput {
            file: crate::ir::File::new("main"),
            channels: vec![],
            connections: vec![conn(DbKind::Postgres), conn(DbKind::Mysql)],
            launches: vec![],
            plan: empty_plan(),
        };
        let manifest = render_go_mod(&build);
        assert!(manifest.starts_with("module test\n"));
        assert!(manifest.contains("github.com/jackc/pgx/v5 v5.6.0"));
        assert!(manifest.contains("github.com/go-sql-driver/mysql v1.8.1"));
        assert!(!manifest.contains("nats.go"));
    }

    #[test]
    fn go_mod_adds_nats_dependency_only_when_launches_exist() {
        let mut build = BuildOutput {
            file: crate::ir::File::new("main"),
            channels: vec![],
            connections: vec![],
            launches: vec![],
            plan: empty_plan(),
        };
        assert!(!render_go_mod(&build).contains("nats.go"));

        build.launches.push(crate::codegen::LaunchDescriptor {
            node_id: "n1".into(),
            func_name: "runN1".into(),
            args: vec![],
            closes_channel: None,
            needs_connections: vec![],
        });
        assert!(render_go_mod(&build).contains("github.com/nats-io/nats.go"));
    }

    #[test]
    fn dockerfile_builds_static_binary_and_sets_entrypoint() {
        let recipe = render_dockerfile();
        assert!(recipe.contains("CGO_ENABLED=0"));
        assert!(recipe.contains("ENTRYPOINT"));
    }
}
