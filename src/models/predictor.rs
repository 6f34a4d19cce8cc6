use crate::diagnosis::Label;
use crate::image::FeatureVector;
use crate::Result;

/// 已加载的分类器：一个特征向量映射到一个标签
///
/// 加载后不可变，可在多个请求线程间共享。
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Label>;

    /// 用于日志和 /api/info 的模型类型名
    fn kind(&self) -> &'static str;
}
