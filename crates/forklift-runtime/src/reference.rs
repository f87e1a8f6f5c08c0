//! Image reference normalization
//!
//! Pod specs and runtimes spell the same image differently: `nginx`,
//! `nginx:latest`, and `docker.io/library/nginx:latest` all name one image.
//! Runtime listings register every spelling so name-only comparisons against
//! pod specs hold.

const DEFAULT_DOMAIN: &str = "docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const DEFAULT_TAG: &str = "latest";

/// Fully qualified reference for a familiar image name.
///
/// `nginx` → `docker.io/library/nginx:latest`,
/// `team/app:v1` → `docker.io/team/app:v1`; qualified names are unchanged
/// apart from a default tag.
pub fn qualify(image: &str) -> String {
    let image = image.trim();
    let (first, rest) = match image.split_once('/') {
        Some((first, rest)) => (first, Some(rest)),
        None => (image, None),
    };

    let mut reference = match rest {
        Some(_) if is_domain(first) => image.to_string(),
        Some(_) => format!("{}/{}", DEFAULT_DOMAIN, image),
        None => format!("{}/{}{}", DEFAULT_DOMAIN, OFFICIAL_REPO_PREFIX, image),
    };

    let last = reference.rsplit('/').next().unwrap_or_default();
    if !last.contains(':') && !last.contains('@') {
        reference = format!("{}:{}", reference, DEFAULT_TAG);
    }
    reference
}

/// Every spelling of a listed reference a pod spec may use, starting with
/// the reference itself: qualified, familiar, and without a `latest` tag.
pub fn aliases(reference: &str) -> Vec<String> {
    let reference = reference.trim();
    let qualified = qualify(reference);

    let mut names = vec![reference.to_string(), qualified.clone()];
    names.extend(familiar_name(&qualified));
    let untagged: Vec<String> = names.iter().filter_map(|n| untagged(n)).collect();
    names.extend(untagged);

    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
}

/// Short form of a reference under the default registry, if it has one
fn familiar_name(reference: &str) -> Option<String> {
    let path = reference.strip_prefix(DEFAULT_DOMAIN)?.strip_prefix('/')?;
    Some(
        path.strip_prefix(OFFICIAL_REPO_PREFIX)
            .filter(|name| !name.contains('/'))
            .unwrap_or(path)
            .to_string(),
    )
}

/// `name` without its tag, if the tag is the default one
fn untagged(name: &str) -> Option<String> {
    let (repo, tag) = name.rsplit_once(':')?;
    if tag != DEFAULT_TAG || repo.is_empty() {
        return None;
    }
    Some(repo.to_string())
}

/// Whether the first path component names a registry host
fn is_domain(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualify_expands_familiar_names() {
        assert_eq!(qualify("nginx"), "docker.io/library/nginx:latest");
        assert_eq!(qualify("nginx:1.25"), "docker.io/library/nginx:1.25");
        assert_eq!(qualify("team/app:v1"), "docker.io/team/app:v1");
        assert_eq!(qualify("registry.io/ns/app:v1"), "registry.io/ns/app:v1");
        assert_eq!(qualify("localhost:5000/app"), "localhost:5000/app:latest");
        assert_eq!(
            qualify("ghcr.io/org/app@sha256:abc"),
            "ghcr.io/org/app@sha256:abc"
        );
    }

    #[test]
    fn familiar_name_strips_default_registry() {
        assert_eq!(
            familiar_name("docker.io/library/nginx:1.25").as_deref(),
            Some("nginx:1.25")
        );
        assert_eq!(
            familiar_name("docker.io/team/app:v1").as_deref(),
            Some("team/app:v1")
        );
        assert_eq!(familiar_name("registry.io/ns/app:v1"), None);
    }

    #[test]
    fn aliases_of_familiar_tagged_name() {
        assert_eq!(
            aliases("nginx:1.25"),
            vec!["nginx:1.25", "docker.io/library/nginx:1.25"]
        );
    }

    #[test]
    fn aliases_of_latest_include_untagged_forms() {
        assert_eq!(
            aliases("nginx:latest"),
            vec![
                "nginx:latest",
                "docker.io/library/nginx:latest",
                "nginx",
                "docker.io/library/nginx",
            ]
        );
        assert_eq!(
            aliases("docker.io/team/app:latest"),
            vec!["docker.io/team/app:latest", "team/app:latest", "docker.io/team/app", "team/app"]
        );
    }

    #[test]
    fn aliases_of_private_registry_keep_port() {
        assert_eq!(
            aliases("localhost:5000/app:latest"),
            vec!["localhost:5000/app:latest", "localhost:5000/app"]
        );
        assert_eq!(aliases("registry.io/ns/app:v1"), vec!["registry.io/ns/app:v1"]);
    }

    #[test]
    fn untagged_ignores_registry_port() {
        assert_eq!(untagged("localhost:5000/app"), None);
        assert_eq!(untagged("app:v1"), None);
        assert_eq!(untagged("app:latest").as_deref(), Some("app"));
    }
}
