use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 序列化的分类器文件名（相对 models_dir）
    pub artifact_name: String,

    /// 压缩包文件名（可选，首次启动时解压）
    pub archive_name: Option<String>,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别 (0-3)
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,

    /// 单张图像最大字节数
    pub max_image_size: usize,
}

pub const DEFAULT_ARTIFACT: &str = "svm_model.json";
pub const DEFAULT_ARCHIVE: &str = "svm_model.zip";

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        artifact_name: String,
        archive_name: Option<String>,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        if artifact_name.trim().is_empty() {
            bail!("artifact name must not be empty");
        }

        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores).max(1);

        let onnx_config = OnnxConfig {
            // 单张图像、单次推理，不需要太多线程
            intra_threads: (cpu_cores / 2).max(1),
            optimization_level: 3,
        };

        let max_image_size = 20 * 1024 * 1024; // 20MB
        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            // multipart 边界和表单字段的额外开销
            max_request_size: max_image_size + 1024 * 1024,
            max_image_size,
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            artifact_name,
            archive_name: archive_name.filter(|name| !name.trim().is_empty()),
            workers,
            dev_mode,
            onnx_config,
            server_config,
        })
    }

    /// 以指定目录和默认文件名构造配置，主要用于测试和嵌入场景
    pub fn for_models_dir(models_dir: impl AsRef<Path>) -> Self {
        let max_image_size = 20 * 1024 * 1024;
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            models_dir: models_dir.as_ref().to_path_buf(),
            artifact_name: DEFAULT_ARTIFACT.to_string(),
            archive_name: Some(DEFAULT_ARCHIVE.to_string()),
            workers: 1,
            dev_mode: false,
            onnx_config: OnnxConfig {
                intra_threads: 1,
                optimization_level: 3,
            },
            server_config: ServerConfig {
                request_timeout: 60,
                max_request_size: max_image_size + 1024 * 1024,
                max_image_size,
            },
        }
    }

    /// 获取模型文件路径
    pub fn artifact_path(&self) -> PathBuf {
        self.models_dir.join(&self.artifact_name)
    }

    /// 获取压缩包路径
    pub fn archive_path(&self) -> Option<PathBuf> {
        self.archive_name
            .as_ref()
            .map(|name| self.models_dir.join(name))
    }
}
