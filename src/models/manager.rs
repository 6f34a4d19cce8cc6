use crate::diagnosis::DiagnosisPipeline;
use crate::models::{ArtifactStore, Predictor};
use crate::utils::error::ScanError;
use crate::{Config, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// 启动状态：Uninitialized → Loading → Ready | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl LoaderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderState::Uninitialized => "uninitialized",
            LoaderState::Loading => "loading",
            LoaderState::Ready => "ready",
            LoaderState::Failed => "failed",
        }
    }
}

enum Slot {
    Empty(LoaderState),
    Ready(Arc<dyn Predictor>),
}

/// 模型管理器
///
/// 持有进程唯一的分类器；在 `serve` 中构造一次，通过 axum state 注入处理器。
pub struct ModelManager {
    slot: RwLock<Slot>,
    artifact_path: PathBuf,
    max_image_size: usize,
}

impl ModelManager {
    /// 尚未加载的管理器
    pub fn new(config: &Config) -> Self {
        Self {
            slot: RwLock::new(Slot::Empty(LoaderState::Uninitialized)),
            artifact_path: config.artifact_path(),
            max_image_size: config.server_config.max_image_size,
        }
    }

    /// 直接注入分类器（测试或嵌入使用）
    pub fn with_predictor(config: &Config, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            slot: RwLock::new(Slot::Ready(predictor)),
            artifact_path: config.artifact_path(),
            max_image_size: config.server_config.max_image_size,
        }
    }

    /// 加载分类器（必要时先解压）。失败后状态为 Failed，属于致命错误。
    pub fn load(&self, config: &Config) -> Result<()> {
        {
            let mut slot = self.slot.write();
            let current = match &*slot {
                Slot::Ready(_) => LoaderState::Ready,
                Slot::Empty(state) => *state,
            };
            match current {
                LoaderState::Ready => {
                    tracing::debug!("Model already loaded, skipping");
                    return Ok(());
                }
                LoaderState::Loading => {
                    return Err(ScanError::Internal(
                        "Model loading already in progress".to_string(),
                    ))
                }
                // Failed 是终止状态，进程应当退出
                LoaderState::Failed => return Err(ScanError::PredictorUnavailable("failed")),
                LoaderState::Uninitialized => *slot = Slot::Empty(LoaderState::Loading),
            }
        }

        tracing::info!("Initializing model manager...");
        let store = ArtifactStore::from_config(config);

        match store.load() {
            Ok(predictor) => {
                *self.slot.write() = Slot::Ready(predictor);
                tracing::info!("Model manager initialized successfully");
                Ok(())
            }
            Err(e) => {
                *self.slot.write() = Slot::Empty(LoaderState::Failed);
                tracing::error!("Failed to load classifier: {}", e);
                Err(e)
            }
        }
    }

    pub fn state(&self) -> LoaderState {
        match &*self.slot.read() {
            Slot::Empty(state) => *state,
            Slot::Ready(_) => LoaderState::Ready,
        }
    }

    /// 获取分类器引用
    pub fn predictor(&self) -> Result<Arc<dyn Predictor>> {
        match &*self.slot.read() {
            Slot::Ready(predictor) => Ok(Arc::clone(predictor)),
            Slot::Empty(state) => Err(ScanError::PredictorUnavailable(state.as_str())),
        }
    }

    /// 构造绑定当前分类器的诊断流水线
    pub fn pipeline(&self) -> Result<DiagnosisPipeline> {
        Ok(DiagnosisPipeline::new(self.predictor()?).with_max_image_size(self.max_image_size))
    }

    /// 模型健康检查
    pub fn health_check(&self) -> Result<()> {
        tracing::debug!("Performing model health check...");
        self.predictor().map(|_| ())
    }

    /// 获取模型统计信息
    pub fn get_stats(&self) -> ModelStats {
        let predictor_kind = match &*self.slot.read() {
            Slot::Ready(predictor) => Some(predictor.kind()),
            Slot::Empty(_) => None,
        };

        ModelStats {
            state: self.state(),
            predictor_kind,
            artifact_path: self.artifact_path.display().to_string(),
            input_size: [crate::image::INPUT_SIDE, crate::image::INPUT_SIDE],
            max_image_size: self.max_image_size,
        }
    }
}

/// 模型统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub state: LoaderState,
    pub predictor_kind: Option<&'static str>,
    pub artifact_path: String,
    pub input_size: [u32; 2],
    pub max_image_size: usize,
}
