//! Docker engine adapter
//!
//! Archives are staged in a host scratch directory and moved between the
//! host and this process's container with `docker cp`, since the container
//! has no volume shared with the host.
//!
//! Docker lists familiar names (`nginx:1.25`); each is also registered under
//! its other spellings so pod specs naming the qualified or untagged form
//! still match.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use forklift_common::{archive_file_name, Image, ImageSet};
use tracing::{debug, warn};

use crate::exec::args;
use crate::reference::aliases;
use crate::{HostExec, ImageRuntime, RuntimeError};

const DOCKER: &str = "docker";

/// `docker images` output: one `repo:tag digest` pair per line
const LIST_FORMAT: &str = "{{.Repository}}:{{.Tag}} {{.Digest}}";

/// Placeholder docker prints for missing repository, tag, or digest
const NONE: &str = "<none>";

/// [`ImageRuntime`] backed by the host's docker CLI
pub struct DockerRuntime {
    exec: Arc<dyn HostExec>,
    container_id: String,
    host_scratch_dir: PathBuf,
}

impl DockerRuntime {
    /// Create an adapter for the container `container_id` on this host
    pub fn new(
        exec: Arc<dyn HostExec>,
        container_id: impl Into<String>,
        host_scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            exec,
            container_id: container_id.into(),
            host_scratch_dir: host_scratch_dir.into(),
        }
    }

    fn scratch_path(&self, image: &str) -> String {
        self.host_scratch_dir
            .join(archive_file_name(image))
            .to_string_lossy()
            .into_owned()
    }

    /// `<container-id>:<path>` as understood by `docker cp`
    fn container_path(&self, path: &Path) -> String {
        format!("{}:{}", self.container_id, path.display())
    }

    async fn docker(&self, argv: Vec<String>) -> Result<String, RuntimeError> {
        self.exec.run(DOCKER, &argv).await
    }

    async fn remove_scratch(&self, scratch: &str) {
        if let Err(e) = self.exec.run("rm", &args(["-f", scratch])).await {
            warn!(path = %scratch, error = %e, "Failed to remove host scratch archive");
        }
    }
}

#[async_trait]
impl ImageRuntime for DockerRuntime {
    async fn list_images(&self) -> Result<ImageSet, RuntimeError> {
        let output = self
            .docker(args(["images", "--format", LIST_FORMAT]))
            .await?;
        Ok(parse_image_list(&output))
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.docker(args(["pull", image]))
            .await
            .map_err(|e| e.during("pull image", image))?;
        Ok(())
    }

    async fn export_image(&self, image: &str, dest_dir: &Path) -> Result<(), RuntimeError> {
        let scratch = self.scratch_path(image);
        let target = self.container_path(&dest_dir.join(archive_file_name(image)));

        let result = async {
            self.docker(args(["save", "-o", scratch.as_str(), image]))
                .await?;
            self.docker(args(["cp", scratch.as_str(), target.as_str()]))
                .await?;
            Ok::<(), RuntimeError>(())
        }
        .await;

        self.remove_scratch(&scratch).await;
        result.map_err(|e| e.during("export image", image))?;
        debug!(image = %image, target = %target, "Exported image");
        Ok(())
    }

    async fn load_image(&self, image: &str, source: &Path) -> Result<(), RuntimeError> {
        let scratch = self.scratch_path(image);
        let origin = self.container_path(source);

        let result = async {
            self.docker(args(["cp", origin.as_str(), scratch.as_str()]))
                .await?;
            self.docker(args(["load", "-i", scratch.as_str()])).await?;
            Ok::<(), RuntimeError>(())
        }
        .await;

        self.remove_scratch(&scratch).await;
        result.map_err(|e| e.during("load image", image))?;
        debug!(image = %image, "Loaded image");
        Ok(())
    }
}

/// Parse `docker images` output in [`LIST_FORMAT`].
///
/// Lines without exactly two fields and dangling images are skipped. Each
/// image is listed under all of its [`aliases`].
pub fn parse_image_list(output: &str) -> ImageSet {
    let mut images = ImageSet::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, digest] = fields.as_slice() else {
            if !line.trim().is_empty() {
                debug!(line = %line, "Skipping malformed docker images line");
            }
            continue;
        };
        if name.contains(NONE) {
            continue;
        }

        for alias in aliases(name) {
            let image = match *digest {
                NONE => Image::new(alias),
                digest => Image::new(alias).with_digest(digest),
            };
            images.insert(image);
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExec;
    use crate::exec::MockHostExec;

    fn runtime(exec: Arc<ScriptedExec>) -> DockerRuntime {
        DockerRuntime::new(exec, "deadbeef", "/tmp")
    }

    #[test]
    fn parse_skips_malformed_and_dangling() {
        let output = "\
nginx:1.25 sha256:aaa
registry.io/ns/app:v1 <none>
<none>:<none> <none>
app:<none> sha256:bbb
garbage
too many fields here

nginx:1.25 sha256:ccc
";
        let images = parse_image_list(output);
        assert_eq!(
            images.names(),
            vec![
                "nginx:1.25",
                "docker.io/library/nginx:1.25",
                "registry.io/ns/app:v1"
            ]
        );

        let first: Vec<&Image> = images.iter().collect();
        assert_eq!(first[0].digest.as_deref(), Some("sha256:aaa"));
        assert_eq!(first[1].digest.as_deref(), Some("sha256:aaa"));
        assert_eq!(first[2].digest, None);
    }

    #[test]
    fn parse_matches_qualified_and_untagged_spellings() {
        let output = "\
nginx:latest sha256:aaa
nginx:1.25 sha256:bbb
team/app:v2 <none>
";
        let images = parse_image_list(output);

        assert!(images.contains("nginx"));
        assert!(images.contains("nginx:latest"));
        assert!(images.contains("docker.io/library/nginx"));
        assert!(images.contains("docker.io/library/nginx:latest"));
        assert!(images.contains("docker.io/library/nginx:1.25"));
        assert!(images.contains("docker.io/team/app:v2"));
        assert!(!images.contains("team/app"));
    }

    #[tokio::test]
    async fn list_runs_images_with_format() {
        let exec = Arc::new(ScriptedExec::new().ok("busybox:1.36 sha256:123\n"));
        let images = runtime(exec.clone()).list_images().await.unwrap();

        assert!(images.contains("busybox:1.36"));
        assert_eq!(
            exec.calls(),
            vec!["docker images --format {{.Repository}}:{{.Tag}} {{.Digest}}"]
        );
    }

    #[tokio::test]
    async fn list_fails_when_command_fails() {
        let exec = Arc::new(ScriptedExec::new().fail("Cannot connect to the Docker daemon"));
        let err = runtime(exec).list_images().await.unwrap_err();
        assert!(matches!(err, RuntimeError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn export_saves_copies_and_cleans_up() {
        let exec = Arc::new(ScriptedExec::new());
        runtime(exec.clone())
            .export_image("registry.io/ns/app:v1", Path::new("/var/lib/forklift"))
            .await
            .unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "docker save -o /tmp/registry.io-ns-app:v1.tar registry.io/ns/app:v1",
                "docker cp /tmp/registry.io-ns-app:v1.tar deadbeef:/var/lib/forklift/registry.io-ns-app:v1.tar",
                "rm -f /tmp/registry.io-ns-app:v1.tar",
            ]
        );
    }

    #[tokio::test]
    async fn export_failure_stops_and_still_cleans_up() {
        let exec = Arc::new(ScriptedExec::new().fail("No such image: app:v1"));
        let err = runtime(exec.clone())
            .export_image("app:v1", Path::new("/data"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::Operation { operation: "export image", .. }
        ));
        assert_eq!(
            exec.calls(),
            vec!["docker save -o /tmp/app:v1.tar app:v1", "rm -f /tmp/app:v1.tar"]
        );
    }

    #[tokio::test]
    async fn load_copies_out_then_loads() {
        let exec = Arc::new(ScriptedExec::new());
        runtime(exec.clone())
            .load_image("app:v1", Path::new("/downloads/app:v1.tar"))
            .await
            .unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "docker cp deadbeef:/downloads/app:v1.tar /tmp/app:v1.tar",
                "docker load -i /tmp/app:v1.tar",
                "rm -f /tmp/app:v1.tar",
            ]
        );
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_fail_load() {
        let exec = Arc::new(ScriptedExec::new().ok("").ok("").fail("rm: read-only"));
        runtime(exec)
            .load_image("app:v1", Path::new("/downloads/app:v1.tar"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pull_wraps_failure_with_image() {
        let mut exec = MockHostExec::new();
        exec.expect_run()
            .withf(|program, argv| program == "docker" && argv.join(" ") == "pull app:v1")
            .times(1)
            .returning(|_, _| {
                Err(RuntimeError::CommandFailed {
                    command: "docker pull app:v1".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "manifest unknown".to_string(),
                })
            });

        let runtime = DockerRuntime::new(Arc::new(exec), "deadbeef", "/tmp");
        let err = runtime.pull_image("app:v1").await.unwrap_err();
        assert!(err.to_string().starts_with("pull image app:v1:"));
    }
}
