use crate::config::OnnxConfig;
use crate::models::{LinearSvm, OnnxPredictor, Predictor};
use crate::utils::error::ScanError;
use crate::{Config, Result};
use once_cell::sync::OnceCell;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use zip::ZipArchive;

/// 模型文件及其可选压缩包
///
/// 首次启动时如果模型文件不存在，从压缩包中解压一次；之后的调用直接复用。
pub struct ArtifactStore {
    artifact_path: PathBuf,
    archive_path: Option<PathBuf>,
    onnx_config: OnnxConfig,
    ready: OnceCell<PathBuf>,
}

impl ArtifactStore {
    pub fn new(artifact_path: PathBuf, archive_path: Option<PathBuf>, onnx_config: OnnxConfig) -> Self {
        Self {
            artifact_path,
            archive_path,
            onnx_config,
            ready: OnceCell::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.artifact_path(),
            config.archive_path(),
            config.onnx_config.clone(),
        )
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// 确保模型文件存在（必要时解压），只执行一次
    pub fn ensure_artifact(&self) -> Result<&Path> {
        self.ready
            .get_or_try_init(|| self.locate_or_extract())
            .map(PathBuf::as_path)
    }

    /// 加载并反序列化分类器
    pub fn load(&self) -> Result<Arc<dyn Predictor>> {
        let path = self.ensure_artifact()?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let predictor: Arc<dyn Predictor> = match extension.as_deref() {
            Some("json") => {
                let file = File::open(path)?;
                Arc::new(LinearSvm::from_reader(BufReader::new(file))?)
            }
            Some("onnx") => Arc::new(OnnxPredictor::load(path, &self.onnx_config)?),
            other => {
                return Err(ScanError::CorruptArtifact(format!(
                    "unsupported artifact format: {:?}",
                    other.unwrap_or("<none>")
                )))
            }
        };

        tracing::info!(
            "Loaded {} classifier from {}",
            predictor.kind(),
            path.display()
        );
        Ok(predictor)
    }

    fn locate_or_extract(&self) -> Result<PathBuf> {
        if self.artifact_path.is_file() {
            tracing::debug!(
                "Model artifact already present: {}",
                self.artifact_path.display()
            );
            return Ok(self.artifact_path.clone());
        }

        let archive_path = match &self.archive_path {
            Some(path) if path.is_file() => path,
            _ => {
                return Err(ScanError::ArtifactMissing {
                    artifact: self.artifact_path.clone(),
                    archive: self.archive_path.clone(),
                })
            }
        };

        tracing::info!(
            "Extracting {} from {}",
            self.artifact_path.display(),
            archive_path.display()
        );
        self.extract_from(archive_path)?;
        Ok(self.artifact_path.clone())
    }

    fn extract_from(&self, archive_path: &Path) -> Result<()> {
        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let wanted = self
            .artifact_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ScanError::Config(format!(
                    "artifact path has no file name: {}",
                    self.artifact_path.display()
                ))
            })?
            .to_string();

        let index = Self::find_entry(&mut archive, &wanted)?.ok_or_else(|| {
            ScanError::CorruptArtifact(format!(
                "archive {} does not contain {}",
                archive_path.display(),
                wanted
            ))
        })?;

        let mut entry = archive.by_index(index)?;
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;

        let parent = match self.artifact_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        // 每个进程写自己的临时文件，再原子地替换到目标路径
        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(&contents)?;
        staged.as_file().sync_all()?;
        if let Err(err) = staged.persist(&self.artifact_path) {
            // 并发启动时另一个进程可能已经放好了同一份模型
            if !self.artifact_path.is_file() {
                return Err(ScanError::Io(err.error));
            }
            tracing::debug!(
                "Artifact {} was placed by a concurrent extraction",
                self.artifact_path.display()
            );
        }

        tracing::info!(
            "Extracted {} bytes to {}",
            contents.len(),
            self.artifact_path.display()
        );
        Ok(())
    }

    /// 按文件名查找条目；找不到时，若压缩包里只有一个文件则使用它
    fn find_entry<R: Read + std::io::Seek>(
        archive: &mut ZipArchive<R>,
        wanted: &str,
    ) -> Result<Option<usize>> {
        let mut files = Vec::new();
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let base_name = Path::new(entry.name())
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string);
            if base_name.as_deref() == Some(wanted) {
                return Ok(Some(i));
            }
            files.push(i);
        }

        Ok(if files.len() == 1 { Some(files[0]) } else { None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::FEATURE_VECTOR_LENGTH;
    use std::sync::Barrier;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn onnx_config() -> OnnxConfig {
        OnnxConfig {
            intra_threads: 1,
            optimization_level: 3,
        }
    }

    fn svm_json() -> Vec<u8> {
        let svm = LinearSvm::new(vec![0.0; FEATURE_VECTOR_LENGTH], 0.5, [0, 1]).unwrap();
        serde_json::to_vec(&svm.to_artifact()).unwrap()
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn missing_artifact_and_archive() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(
            dir.path().join("svm_model.json"),
            Some(dir.path().join("svm_model.zip")),
            onnx_config(),
        );
        let err = store.load().err().unwrap();
        assert!(matches!(err, ScanError::ArtifactMissing { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_artifact_without_archive() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("svm_model.json"), None, onnx_config());
        assert!(matches!(
            store.ensure_artifact(),
            Err(ScanError::ArtifactMissing { archive: None, .. })
        ));
    }

    #[test]
    fn loads_existing_json_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("svm_model.json");
        std::fs::write(&artifact, svm_json()).unwrap();

        let store = ArtifactStore::new(artifact, None, onnx_config());
        let predictor = store.load().unwrap();
        assert_eq!(predictor.kind(), "linear_svm");
    }

    #[test]
    fn extracts_once_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("svm_model.json");
        let archive = dir.path().join("svm_model.zip");
        let json = svm_json();
        write_zip(&archive, &[("svm_model.json", json.as_slice())]);

        let store = ArtifactStore::new(artifact.clone(), Some(archive.clone()), onnx_config());
        store.load().unwrap();
        assert_eq!(std::fs::read(&artifact).unwrap(), json);

        // 同一个 store 再次调用不会重新解压：删除压缩包也不影响
        std::fs::remove_file(&archive).unwrap();
        assert_eq!(store.ensure_artifact().unwrap(), artifact.as_path());
        store.load().unwrap();
    }

    #[test]
    fn parallel_startups_extract_the_same_artifact() {
        const STARTUPS: usize = 8;

        for _ in 0..10 {
            let dir = tempfile::tempdir().unwrap();
            let artifact = dir.path().join("svm_model.json");
            let archive = dir.path().join("svm_model.zip");
            let json = svm_json();
            write_zip(&archive, &[("svm_model.json", json.as_slice())]);

            let barrier = Barrier::new(STARTUPS);
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..STARTUPS)
                    .map(|_| {
                        let store = ArtifactStore::new(
                            artifact.clone(),
                            Some(archive.clone()),
                            onnx_config(),
                        );
                        let barrier = &barrier;
                        scope.spawn(move || {
                            barrier.wait();
                            store.load().map(|predictor| predictor.kind())
                        })
                    })
                    .collect();

                for handle in handles {
                    assert_eq!(handle.join().unwrap().unwrap(), "linear_svm");
                }
            });

            assert_eq!(std::fs::read(&artifact).unwrap(), json);
            // 目录里只剩压缩包和模型，没有残留的临时文件
            assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
        }
    }

    #[test]
    fn second_startup_skips_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("svm_model.json");
        let archive = dir.path().join("svm_model.zip");
        write_zip(&archive, &[("svm_model.json", svm_json().as_slice())]);

        ArtifactStore::new(artifact.clone(), Some(archive.clone()), onnx_config())
            .load()
            .unwrap();
        let first_modified = std::fs::metadata(&artifact).unwrap().modified().unwrap();

        // 压缩包换成损坏内容：如果第二次启动重新解压就会失败
        std::fs::write(&archive, b"not a zip").unwrap();
        ArtifactStore::new(artifact.clone(), Some(archive), onnx_config())
            .load()
            .unwrap();

        let second_modified = std::fs::metadata(&artifact).unwrap().modified().unwrap();
        assert_eq!(first_modified, second_modified);
        assert_eq!(std::fs::read(&artifact).unwrap(), svm_json());
    }

    #[test]
    fn single_file_archive_with_other_name() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("svm_model.json");
        let archive = dir.path().join("svm_model.zip");
        write_zip(&archive, &[("export/model_v2.json", svm_json().as_slice())]);

        let store = ArtifactStore::new(artifact.clone(), Some(archive), onnx_config());
        store.load().unwrap();
        assert!(artifact.is_file());
    }

    #[test]
    fn nested_entry_matches_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("svm_model.json");
        let archive = dir.path().join("svm_model.zip");
        write_zip(
            &archive,
            &[
                ("README.txt", &b"hello"[..]),
                ("models/svm_model.json", svm_json().as_slice()),
            ],
        );

        let store = ArtifactStore::new(artifact, Some(archive), onnx_config());
        assert!(store.load().is_ok());
    }

    #[test]
    fn corrupt_archive_is_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("svm_model.zip");
        std::fs::write(&archive, b"PK but not really").unwrap();

        let store = ArtifactStore::new(dir.path().join("svm_model.json"), Some(archive), onnx_config());
        assert!(matches!(store.load(), Err(ScanError::CorruptArtifact(_))));
    }

    #[test]
    fn archive_without_matching_entry_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("svm_model.zip");
        write_zip(&archive, &[("a.txt", &b"a"[..]), ("b.txt", &b"b"[..])]);

        let store = ArtifactStore::new(dir.path().join("svm_model.json"), Some(archive), onnx_config());
        assert!(matches!(store.load(), Err(ScanError::CorruptArtifact(_))));
    }

    #[test]
    fn malformed_json_is_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("svm_model.json");
        std::fs::write(&artifact, b"{ \"kind\": \"linear_svm\", \"weights\": [1.0] ").unwrap();

        let store = ArtifactStore::new(artifact, None, onnx_config());
        assert!(matches!(store.load(), Err(ScanError::CorruptArtifact(_))));
    }

    #[test]
    fn garbage_onnx_file_is_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("svm_model.onnx");
        std::fs::write(&artifact, b"definitely not a protobuf graph").unwrap();

        let store = ArtifactStore::new(artifact, None, onnx_config());
        assert!(matches!(store.load(), Err(ScanError::CorruptArtifact(_))));
    }

    #[test]
    fn unknown_extension_is_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("svm_model.pkl");
        std::fs::write(&artifact, b"\x80\x04pickle").unwrap();

        let store = ArtifactStore::new(artifact, None, onnx_config());
        assert!(matches!(store.load(), Err(ScanError::CorruptArtifact(_))));
    }
}
