use ort::session::{builder::GraphOptimizationLevel, Session};

use crate::error::ClassifierError;

/// 加载视频分类模型
///
/// 加载ONNX格式的模型，并应用优化配置。模型在进程生命周期内只加载一次。
///
/// # 错误处理
/// 文件缺失或格式错误时返回 `ClassifierError::ModelLoad`，调用方应当终止程序
///
/// # 示例
///
/// ```no_run
/// use vigil::vision::model::load_model;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let model = load_model("model.onnx")?;
/// # Ok(())
/// # }
/// ```
pub fn load_model(model_path: &str) -> Result<Session, ClassifierError> {
    let model_load = |source: ort::Error| ClassifierError::ModelLoad {
        path: model_path.to_string(),
        source,
    };
    let model = Session::builder()
        .map_err(model_load)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(model_load)?
        .with_intra_threads(4)
        .map_err(model_load)?
        .commit_from_file(model_path)
        .map_err(model_load)?;
    Ok(model)
}
