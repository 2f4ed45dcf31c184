//! Filesystem asset store
//!
//! Actions address files by logical path below one of two roots: the asset
//! root, which is read-only, and the store root, which actions may write.
//! A logical path that would leave its root is refused as unmanageable.
//!
//! Roots are made absolute and normalized on construction, so `./data` and
//! `data/assets` still nest the way they do on disk.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use warbler_core::{AssetStore, CapabilityError};

#[derive(Debug, Clone)]
pub struct FsAssetStore {
    asset_root: PathBuf,
    store_root: PathBuf,
    command_roots: Vec<PathBuf>,
}

impl FsAssetStore {
    pub fn new(asset_root: impl AsRef<Path>, store_root: impl AsRef<Path>) -> Self {
        Self {
            asset_root: normalize(asset_root.as_ref()),
            store_root: normalize(store_root.as_ref()),
            command_roots: Vec::new(),
        }
    }

    /// Specification roots that [`AssetStore::read_relative`] may also read from
    pub fn with_command_roots(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.command_roots = roots.into_iter().map(|root| normalize(&root)).collect();
        self
    }

    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    pub fn store_root(&self) -> &Path {
        &self.store_root
    }

    pub fn command_roots(&self) -> &[PathBuf] {
        &self.command_roots
    }

    fn manages(&self, path: &Path) -> bool {
        path.starts_with(&self.asset_root)
            || path.starts_with(&self.store_root)
            || self.command_roots.iter().any(|root| path.starts_with(root))
    }

    /// A store path that may be written: not inside the asset tree
    fn writable(&self, logical: &str) -> Result<PathBuf, CapabilityError> {
        let path = resolve(&self.store_root, logical)?;
        if path.starts_with(&self.asset_root) {
            return Err(CapabilityError::ReadOnly(path));
        }
        Ok(path)
    }
}

/// Absolute, lexically clean form of `path`. The longest existing prefix is
/// canonicalized so symlinked parents compare equal to their targets.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(e) => {
                tracing::warn!(
                    "Cannot resolve {} against working directory: {}",
                    path.display(),
                    e
                );
                path.to_path_buf()
            }
        }
    };

    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other.as_os_str()),
        }
    }

    for existing in lexical.ancestors() {
        if let Ok(real) = existing.canonicalize() {
            return match lexical.strip_prefix(existing) {
                Ok(rest) if !rest.as_os_str().is_empty() => real.join(rest),
                _ => real,
            };
        }
    }
    lexical
}

/// Join `logical` onto `root` without letting it climb out
fn resolve(root: &Path, logical: &str) -> Result<PathBuf, CapabilityError> {
    let mut relative = PathBuf::new();
    for component in Path::new(logical).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(CapabilityError::Unmanageable(PathBuf::from(logical)));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(CapabilityError::Unmanageable(PathBuf::from(logical)));
            }
        }
    }
    Ok(root.join(relative))
}

fn ensure_file(path: &Path) -> Result<(), CapabilityError> {
    if !path.exists() {
        return Err(CapabilityError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(CapabilityError::NotFile(path.to_path_buf()));
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), CapabilityError> {
    if !path.exists() {
        return Err(CapabilityError::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(CapabilityError::NotDir(path.to_path_buf()));
    }
    Ok(())
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn read_asset(&self, path: &str) -> Result<Vec<u8>, CapabilityError> {
        let path = resolve(&self.asset_root, path)?;
        ensure_file(&path)?;
        Ok(tokio::fs::read(&path).await?)
    }

    async fn read_relative(&self, origin: &Path, path: &str) -> Result<Vec<u8>, CapabilityError> {
        let base = origin.parent().unwrap_or_else(|| Path::new(""));
        let target = normalize(&base.join(path));
        if !self.manages(&target) {
            return Err(CapabilityError::Unmanageable(target));
        }
        ensure_file(&target)?;
        Ok(tokio::fs::read(&target).await?)
    }

    async fn read_stored(&self, path: &str) -> Result<Vec<u8>, CapabilityError> {
        let path = resolve(&self.store_root, path)?;
        ensure_file(&path)?;
        Ok(tokio::fs::read(&path).await?)
    }

    async fn write_stored(&self, path: &str, contents: &[u8]) -> Result<(), CapabilityError> {
        let path = self.writable(path)?;
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        if path.is_dir() {
            return Err(CapabilityError::NotFile(path));
        }
        tokio::fs::write(&path, contents).await?;
        Ok(())
    }

    async fn make_dir(&self, path: &str, parents: bool) -> Result<(), CapabilityError> {
        let path = self.writable(path)?;
        if path.exists() {
            return Err(CapabilityError::Exists(path));
        }

        if parents {
            tokio::fs::create_dir_all(&path).await?;
        } else {
            if let Some(parent) = path.parent() {
                ensure_dir(parent)?;
            }
            tokio::fs::create_dir(&path).await?;
        }

        tracing::info!("Created directory: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsAssetStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data/assets/images")).unwrap();
        std::fs::write(dir.path().join("data/assets/motd.txt"), b"hello").unwrap();
        let store = FsAssetStore::new(dir.path().join("data/assets"), dir.path().join("data"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_read_asset() {
        let (_dir, store) = store();

        assert_eq!(store.read_asset("motd.txt").await.unwrap(), b"hello");
        assert!(matches!(
            store.read_asset("missing.txt").await,
            Err(CapabilityError::NotFound(_))
        ));
        assert!(matches!(
            store.read_asset("images").await,
            Err(CapabilityError::NotFile(_))
        ));
    }

    #[tokio::test]
    async fn test_write_then_read_stored() {
        let (_dir, store) = store();

        store.write_stored("scores.json", b"{}").await.unwrap();
        assert_eq!(store.read_stored("./scores.json").await.unwrap(), b"{}");

        assert!(matches!(
            store.write_stored("nested/scores.json", b"{}").await,
            Err(CapabilityError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_asset_tree_is_read_only() {
        let (_dir, store) = store();

        assert!(matches!(
            store.write_stored("assets/motd.txt", b"defaced").await,
            Err(CapabilityError::ReadOnly(_))
        ));
        assert!(matches!(
            store.make_dir("assets/new", false).await,
            Err(CapabilityError::ReadOnly(_))
        ));
        assert_eq!(store.read_asset("motd.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_asset_tree_is_read_only_under_differently_spelled_roots() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let name = dir.path().file_name().unwrap();
        std::fs::create_dir_all(dir.path().join("data/assets")).unwrap();
        std::fs::write(dir.path().join("data/assets/motd.txt"), b"hello").unwrap();

        let relative = FsAssetStore::new(
            Path::new(name).join("data/assets"),
            Path::new(".").join(name).join("data"),
        );
        let mixed = FsAssetStore::new(
            dir.path().join("data/assets").canonicalize().unwrap(),
            Path::new(".").join(name).join("data/tmp/.."),
        );

        for store in [&relative, &mixed] {
            assert!(store.asset_root().is_absolute());
            assert!(store.asset_root().starts_with(store.store_root()));
            assert!(matches!(
                store.write_stored("assets/motd.txt", b"defaced").await,
                Err(CapabilityError::ReadOnly(_))
            ));
        }
        assert_eq!(relative.read_asset("motd.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_relative_to_spec_file() {
        let (dir, store) = store();
        let commands = dir.path().join("commands");
        std::fs::create_dir_all(commands.join("fun")).unwrap();
        std::fs::write(commands.join("fun/slap.txt"), b"*slaps*").unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"nope").unwrap();
        let store = store.with_command_roots(vec![commands.clone()]);
        let spec = commands.join("fun/slap.yaml");

        assert_eq!(store.read_relative(&spec, "slap.txt").await.unwrap(), b"*slaps*");
        assert_eq!(
            store.read_relative(&spec, "../../data/assets/motd.txt").await.unwrap(),
            b"hello"
        );
        assert!(matches!(
            store.read_relative(&spec, "missing.txt").await,
            Err(CapabilityError::NotFound(_))
        ));

        for path in ["../../secret.txt", "/etc/passwd"] {
            assert!(
                matches!(
                    store.read_relative(&spec, path).await,
                    Err(CapabilityError::Unmanageable(_))
                ),
                "{} should be refused",
                path
            );
        }
    }

    #[tokio::test]
    async fn test_escaping_paths_are_unmanageable() {
        let (_dir, store) = store();

        for path in ["../secret.txt", "a/../../secret.txt", "/etc/passwd"] {
            assert!(
                matches!(store.read_stored(path).await, Err(CapabilityError::Unmanageable(_))),
                "{} should be refused",
                path
            );
        }
        // Climbing back down inside the root is fine
        store.write_stored("a/../ok.txt", b"1").await.unwrap();
        assert_eq!(store.read_stored("ok.txt").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_make_dir() {
        let (_dir, store) = store();

        assert!(matches!(
            store.make_dir("logs/2024", false).await,
            Err(CapabilityError::NotFound(_))
        ));
        store.make_dir("logs/2024", true).await.unwrap();
        store.make_dir("logs/2025", false).await.unwrap();
        assert!(matches!(
            store.make_dir("logs", false).await,
            Err(CapabilityError::Exists(_))
        ));
    }
}
