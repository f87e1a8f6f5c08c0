//! Image data model
//!
//! Images are identified by name alone. The digest a runtime reports is kept
//! for logging but never compared: `docker load` does not restore the
//! registry digest, so after an import it is missing or stale.

use std::collections::HashSet;

/// Extension of exported image archives
const ARCHIVE_EXTENSION: &str = ".tar";

/// A container image known to a runtime or declared by a workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Canonical `repo:tag` reference
    pub name: String,
    /// Runtime-reported digest, if any (best-effort)
    pub digest: Option<String>,
}

impl Image {
    /// Create an image with no digest
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            digest: None,
        }
    }

    /// Attach a runtime-reported digest
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }
}

/// Name-keyed set of images preserving first-insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSet {
    images: Vec<Image>,
    names: HashSet<String>,
}

impl ImageSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an image, keeping the existing entry if the name is already present.
    ///
    /// Returns true if the image was added.
    pub fn insert(&mut self, image: Image) -> bool {
        if self.names.contains(&image.name) {
            return false;
        }
        self.names.insert(image.name.clone());
        self.images.push(image);
        true
    }

    /// Check whether an image with this name is in the set
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of images in the set
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Iterate images in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.images.iter()
    }

    /// Image names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.images.iter().map(|i| i.name.clone()).collect()
    }
}

impl FromIterator<Image> for ImageSet {
    fn from_iter<I: IntoIterator<Item = Image>>(iter: I) -> Self {
        let mut set = ImageSet::new();
        for image in iter {
            set.insert(image);
        }
        set
    }
}

impl IntoIterator for ImageSet {
    type Item = Image;
    type IntoIter = std::vec::IntoIter<Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.into_iter()
    }
}

impl<'a> IntoIterator for &'a ImageSet {
    type Item = &'a Image;
    type IntoIter = std::slice::Iter<'a, Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

/// Images in `declared` whose name is absent from `local`, in declared order.
pub fn diff(declared: &ImageSet, local: &ImageSet) -> ImageSet {
    declared
        .iter()
        .filter(|image| !local.contains(&image.name))
        .cloned()
        .collect()
}

/// Flat archive file name for an image: path separators become `-`.
///
/// `registry.io/ns/app:v1` → `registry.io-ns-app:v1.tar`
pub fn archive_file_name(image: &str) -> String {
    let flat: String = image
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    format!("{}{}", flat, ARCHIVE_EXTENSION)
}
