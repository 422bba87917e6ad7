use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("model {name} is not cached and no download URL is configured")]
    NotCached { name: String },
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where to look for the detector weights.
#[derive(Clone, Debug, Default)]
pub struct ModelSource {
    /// Explicit weights path; when set, nothing else is consulted.
    pub path: Option<PathBuf>,
    /// URL to fetch the model from when it is not cached.
    pub url: Option<String>,
}

/// Resolve the detector model.
///
/// Resolution order:
/// 1. Explicit path (must exist)
/// 2. User cache directory
/// 3. Download from `source.url` into the cache, if configured
pub fn resolve(
    name: &str,
    source: &ModelSource,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = &source.path {
        return if path.exists() {
            Ok(path.clone())
        } else {
            Err(ModelResolveError::Missing(path.clone()))
        };
    }
    resolve_in(&model_cache_dir()?, name, source.url.as_deref(), progress)
}

fn resolve_in(
    cache_dir: &Path,
    name: &str,
    url: Option<&str>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    let url = url.ok_or_else(|| ModelResolveError::NotCached {
        name: name.to_string(),
    })?;
    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {name} from {url}");
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform cache directory for detector weights, e.g.
/// `~/.cache/cropsort/models/` on Linux.
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    dirs::cache_dir()
        .map(|d| d.join("cropsort").join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ModelResolveError::Write { path, source }
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut file = fs::File::create(temp_path).map_err(write_err(temp_path))?;

    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_err(temp_path))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err(temp_path))?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err(temp_path))?;
    drop(file);

    fs::rename(temp_path, dest).map_err(write_err(dest))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_is_returned() {
        let tmp = TempDir::new().unwrap();
        let model = tmp.path().join("weights.onnx");
        fs::write(&model, b"fake").unwrap();

        let source = ModelSource {
            path: Some(model.clone()),
            url: None,
        };
        assert_eq!(resolve("ignored.onnx", &source, None).unwrap(), model);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let tmp = TempDir::new().unwrap();
        let source = ModelSource {
            path: Some(tmp.path().join("absent.onnx")),
            url: Some("http://invalid.nonexistent.example.com/m".to_string()),
        };
        assert!(matches!(
            resolve("absent.onnx", &source, None),
            Err(ModelResolveError::Missing(_))
        ));
    }

    #[test]
    fn test_cached_file_is_found() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("m.onnx"), b"cached").unwrap();
        let path = resolve_in(tmp.path(), "m.onnx", None, None).unwrap();
        assert_eq!(path, tmp.path().join("m.onnx"));
    }

    #[test]
    fn test_uncached_without_url_is_not_cached_error() {
        let tmp = TempDir::new().unwrap();
        let result = resolve_in(tmp.path(), "m.onnx", None, None);
        assert!(matches!(result, Err(ModelResolveError::NotCached { .. })));
    }

    #[test]
    fn test_failed_download_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let result = resolve_in(
            tmp.path(),
            "m.onnx",
            Some("http://invalid.nonexistent.example.com/model"),
            None,
        );
        assert!(result.is_err());
        assert!(!tmp.path().join("m.onnx").exists());
        assert!(!tmp.path().join("m.part").exists());
    }

    #[test]
    fn test_model_cache_dir_is_namespaced() {
        let path = model_cache_dir().unwrap();
        assert!(path.ends_with("cropsort/models"));
    }
}
