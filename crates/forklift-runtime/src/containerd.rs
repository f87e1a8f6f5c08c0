//! containerd adapter
//!
//! `ctr` has no copy-in/copy-out command, so files in this process's
//! container are addressed through `/proc/<pid>/root` of its task, which the
//! host mount namespace can see. The PID is looked up on every transfer
//! because a restarted container gets a new one.
//!
//! Pod specs usually carry familiar names (`nginx:1.25`) while containerd
//! stores fully qualified references (`docker.io/library/nginx:1.25`), so
//! names are qualified before calling `ctr`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use forklift_common::{archive_file_name, Image, ImageSet};
use tracing::debug;

use crate::exec::args;
use crate::reference::{aliases, qualify};
use crate::{HostExec, ImageRuntime, RuntimeError};

const CTR: &str = "ctr";

/// [`ImageRuntime`] backed by the host's `ctr` CLI
pub struct ContainerdRuntime {
    exec: Arc<dyn HostExec>,
    container_id: String,
    namespace: String,
}

impl ContainerdRuntime {
    /// Create an adapter for the task `container_id` in containerd namespace `namespace`
    pub fn new(
        exec: Arc<dyn HostExec>,
        container_id: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            exec,
            container_id: container_id.into(),
            namespace: namespace.into(),
        }
    }

    async fn ctr(&self, rest: Vec<String>) -> Result<String, RuntimeError> {
        let mut argv = args(["-n", self.namespace.as_str()]);
        argv.extend(rest);
        self.exec.run(CTR, &argv).await
    }

    /// Root of our container's filesystem as seen from the host
    async fn container_root(&self) -> Result<PathBuf, RuntimeError> {
        let output = self.ctr(args(["tasks", "ls"])).await?;
        let pid = find_task_pid(&output, &self.container_id)?;
        Ok(PathBuf::from(format!("/proc/{}/root", pid)))
    }
}

#[async_trait]
impl ImageRuntime for ContainerdRuntime {
    async fn list_images(&self) -> Result<ImageSet, RuntimeError> {
        let output = self.ctr(args(["images", "ls"])).await?;
        Ok(parse_image_list(&output))
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let reference = qualify(image);
        self.ctr(args(["images", "pull", reference.as_str()]))
            .await
            .map_err(|e| e.during("pull image", image))?;
        Ok(())
    }

    async fn export_image(&self, image: &str, dest_dir: &Path) -> Result<(), RuntimeError> {
        let result = async {
            let root = self.container_root().await?;
            let target = host_view(&root, &dest_dir.join(archive_file_name(image)));
            let reference = qualify(image);
            self.ctr(args([
                "images",
                "export",
                &*target.to_string_lossy(),
                reference.as_str(),
            ]))
            .await?;
            Ok::<(), RuntimeError>(())
        }
        .await;

        result.map_err(|e| e.during("export image", image))?;
        debug!(image = %image, "Exported image");
        Ok(())
    }

    async fn load_image(&self, image: &str, source: &Path) -> Result<(), RuntimeError> {
        let result = async {
            let root = self.container_root().await?;
            let origin = host_view(&root, source);
            self.ctr(args(["images", "import", &*origin.to_string_lossy()]))
                .await?;
            Ok::<(), RuntimeError>(())
        }
        .await;

        result.map_err(|e| e.during("load image", image))?;
        debug!(image = %image, "Loaded image");
        Ok(())
    }
}

/// Path of `path` (inside our container) relative to the host-visible `root`
fn host_view(root: &Path, path: &Path) -> PathBuf {
    root.join(path.strip_prefix("/").unwrap_or(path))
}

/// Parse `ctr images ls` output.
///
/// The header, digest-only references, and rows too short to carry a digest
/// are skipped. Each reference is listed under all of its [`aliases`].
pub fn parse_image_list(output: &str) -> ImageSet {
    let mut images = ImageSet::new();
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // REF TYPE DIGEST ...
        let [reference, _, digest, ..] = fields.as_slice() else {
            continue;
        };
        if reference.starts_with("sha256:") {
            continue;
        }

        for name in aliases(reference) {
            images.insert(Image::new(name).with_digest(*digest));
        }
    }
    images
}

/// Find the PID of `container_id` in `ctr tasks ls` output
fn find_task_pid(output: &str, container_id: &str) -> Result<u32, RuntimeError> {
    let pid = output
        .lines()
        .skip(1)
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.first() == Some(&container_id))
        .and_then(|fields| fields.get(1).map(|pid| pid.to_string()))
        .ok_or_else(|| RuntimeError::TaskNotFound(container_id.to_string()))?;

    pid.parse().map_err(|_| RuntimeError::Parse {
        command: "ctr tasks ls".to_string(),
        message: format!("invalid pid {:?} for task {}", pid, container_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExec;

    const TASKS: &str = "\
TASK                                                                PID     STATUS
0a1b2c                                                              4242    RUNNING
ffeedd                                                              77      RUNNING
";

    fn runtime(exec: Arc<ScriptedExec>) -> ContainerdRuntime {
        ContainerdRuntime::new(exec, "0a1b2c", "k8s.io")
    }

    #[test]
    fn parse_lists_qualified_and_familiar_names() {
        let output = "\
REF                                   TYPE                                        DIGEST          SIZE     PLATFORMS   LABELS
docker.io/library/nginx:1.25          application/vnd.oci.image.index.v1+json     sha256:aaa      67.3 MiB linux/amd64 io.cri-containerd.image=managed
docker.io/library/redis:latest        application/vnd.oci.image.index.v1+json     sha256:ddd      40.1 MiB linux/amd64 io.cri-containerd.image=managed
registry.io/ns/app:v1                 application/vnd.oci.image.manifest.v1+json  sha256:bbb      12.0 MiB linux/amd64 -
sha256:ccc                            application/vnd.oci.image.index.v1+json     sha256:ccc      67.3 MiB linux/amd64 -
short line
";
        let images = parse_image_list(output);
        assert_eq!(
            images.names(),
            vec![
                "docker.io/library/nginx:1.25",
                "nginx:1.25",
                "docker.io/library/redis:latest",
                "redis:latest",
                "docker.io/library/redis",
                "redis",
                "registry.io/ns/app:v1"
            ]
        );
        assert!(images.iter().all(|i| i.digest.is_some()));
    }

    #[test]
    fn task_pid_lookup() {
        assert_eq!(find_task_pid(TASKS, "0a1b2c").unwrap(), 4242);
        assert!(matches!(
            find_task_pid(TASKS, "missing"),
            Err(RuntimeError::TaskNotFound(_))
        ));
        assert!(matches!(
            find_task_pid("TASK PID STATUS\n0a1b2c abc RUNNING\n", "0a1b2c"),
            Err(RuntimeError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn pull_qualifies_reference() {
        let exec = Arc::new(ScriptedExec::new());
        runtime(exec.clone()).pull_image("nginx:1.25").await.unwrap();
        assert_eq!(
            exec.calls(),
            vec!["ctr -n k8s.io images pull docker.io/library/nginx:1.25"]
        );
    }

    #[tokio::test]
    async fn export_writes_through_task_root() {
        let exec = Arc::new(ScriptedExec::new().ok(TASKS));
        runtime(exec.clone())
            .export_image("registry.io/ns/app:v1", Path::new("/var/lib/forklift"))
            .await
            .unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "ctr -n k8s.io tasks ls",
                "ctr -n k8s.io images export /proc/4242/root/var/lib/forklift/registry.io-ns-app:v1.tar registry.io/ns/app:v1",
            ]
        );
    }

    #[tokio::test]
    async fn load_imports_through_task_root() {
        let exec = Arc::new(ScriptedExec::new().ok(TASKS));
        runtime(exec.clone())
            .load_image("nginx:1.25", Path::new("/downloads/nginx:1.25.tar"))
            .await
            .unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "ctr -n k8s.io tasks ls",
                "ctr -n k8s.io images import /proc/4242/root/downloads/nginx:1.25.tar",
            ]
        );
    }

    #[tokio::test]
    async fn transfer_fails_without_own_task() {
        let exec = Arc::new(ScriptedExec::new().ok("TASK PID STATUS\n"));
        let err = runtime(exec.clone())
            .load_image("nginx:1.25", Path::new("/downloads/nginx:1.25.tar"))
            .await
            .unwrap_err();

        match err {
            RuntimeError::Operation { source, .. } => {
                assert!(matches!(*source, RuntimeError::TaskNotFound(_)))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(exec.calls().len(), 1);
    }
}
