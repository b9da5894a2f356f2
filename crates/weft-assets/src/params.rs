// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Load parameters and the cache keys derived from them.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Fingerprint of a resource's canonical source plus its load variant.
///
/// Two [`LoadParams`] that name the same file through different spellings
/// (`a/./b.png`, `a/c/../b.png`, `a\b.png`) and ask for the same variant map
/// to the same key, so they share one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(Uuid);

impl ResourceKey {
    /// Derives a key from an already canonical source string and a variant.
    pub fn from_parts(canonical_source: &str, variant: &str) -> Self {
        let mut name = Vec::with_capacity(canonical_source.len() + variant.len() + 1);
        name.extend_from_slice(canonical_source.as_bytes());
        name.push(0);
        name.extend_from_slice(variant.as_bytes());
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, &name))
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// What to load, and how.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadParams {
    /// Path of the source file, relative to the asset root or absolute.
    pub source: PathBuf,
    /// Loader-specific variant, e.g. `"srgb"` or `"lod1"`. Empty for the default.
    #[serde(default)]
    pub variant: String,
}

impl LoadParams {
    /// Loads `source` with the default variant.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            variant: String::new(),
        }
    }

    /// Selects a load variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    /// Rejects parameters no loader could satisfy.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.source.as_os_str().is_empty() {
            return Err(CacheError::Configuration("empty source path".to_string()));
        }
        if self.canonical_source().is_empty() {
            return Err(CacheError::Configuration(format!(
                "source path {} resolves to nothing",
                self.source.display()
            )));
        }
        Ok(())
    }

    /// Returns the source path normalized lexically, with `/` separators.
    ///
    /// The file system is not consulted, so virtual and not-yet-existing
    /// paths canonicalize the same way on every platform.
    pub fn canonical_source(&self) -> String {
        canonicalize(&self.source)
    }

    /// Returns the cache key for these parameters.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::from_parts(&self.canonical_source(), &self.variant)
    }
}

impl From<&str> for LoadParams {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

fn canonicalize(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let absolute = normalized.starts_with('/');
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                if matches!(parts.last(), Some(last) if last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..".to_string());
                }
            }
            Component::Prefix(prefix) => {
                parts.push(prefix.as_os_str().to_string_lossy().into_owned())
            }
            Component::CurDir | Component::RootDir => {}
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_spellings_share_a_key() {
        let a = LoadParams::new("textures/brick.png");
        let b = LoadParams::new("textures/./brick.png");
        let c = LoadParams::new("textures/old/../brick.png");
        let d = LoadParams::new("textures\\brick.png");
        assert_eq!(a.canonical_source(), "textures/brick.png");
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), c.key());
        assert_eq!(a.key(), d.key());
    }

    #[test]
    fn variant_changes_the_key() {
        let plain = LoadParams::new("brick.png");
        let srgb = LoadParams::new("brick.png").with_variant("srgb");
        assert_ne!(plain.key(), srgb.key());
        assert_eq!(srgb.key(), LoadParams::from("./brick.png").with_variant("srgb").key());
    }

    #[test]
    fn leading_parent_dirs_are_kept_for_relative_paths() {
        assert_eq!(LoadParams::new("../shared/a.bin").canonical_source(), "../shared/a.bin");
        assert_eq!(LoadParams::new("/assets/../a.bin").canonical_source(), "/a.bin");
    }

    #[test]
    fn empty_sources_are_rejected() {
        assert!(matches!(
            LoadParams::new("").validate(),
            Err(CacheError::Configuration(_))
        ));
        assert!(LoadParams::new("./").validate().is_err());
        assert!(LoadParams::new("mesh.obj").validate().is_ok());
    }

    #[test]
    fn params_deserialize_with_default_variant() {
        let params: LoadParams = toml::from_str(r#"source = "maps/level1.bin""#).unwrap();
        assert_eq!(params, LoadParams::new("maps/level1.bin"));
    }
}
