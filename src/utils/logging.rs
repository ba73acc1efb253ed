/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::SequenceResult;

/// 初始化全局日志
///
/// `RUST_LOG` 存在时优先使用；否则 verbose 为 debug，默认 info。
/// 重复调用不会报错（测试中可能多次初始化）。
///
/// # 参数
/// - `verbose`: 是否显示详细日志
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 当前配置（不会输出密钥）
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 程序启动 - 测验链求解 {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("🔗 起始 URL: {}", config.start_url);
    info!("⏳ 全局时限: {} 秒", config.quiz_timeout_secs);
    info!("🔁 每题最多重试: {} 次", config.max_retries_per_quiz);
    info!("🤖 模型: {} / 视觉: {}", config.llm_model_name, config.llm_vision_model_name);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `result`: 测验链的结果
pub fn print_final_stats(result: &SequenceResult) {
    info!("\n{}", "=".repeat(60));
    info!("📊 测验链处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    if result.succeeded {
        info!("✅ 状态: {}", result.terminal_status);
    } else {
        info!("❌ 状态: {}", result.terminal_status);
    }
    info!("📝 完成题数: {}", result.quizzes_completed);
    info!("⏱️ 总耗时: {:.1}s", result.elapsed.as_secs_f64());
    if let Some(error) = &result.error {
        info!("💥 错误: {}", error);
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
