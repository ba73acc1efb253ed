use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Url;

use quiz_chain_solver::infrastructure::{ChromiumRenderer, HttpFileFetcher, OpenAiReasoningService};
use quiz_chain_solver::utils::logging;
use quiz_chain_solver::{
    Config, HttpAnswerSubmitter, Identity, MetricsSink, OrchestratorSettings, QuizOrchestrator,
    RetryPolicy, SolverSettings, ToolCallingSolver, TracingMetricsSink,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置：可选的 TOML 路径 + 环境变量
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    let start_url = Url::parse(&config.start_url)
        .with_context(|| format!("起始 URL 无效: {:?}", config.start_url))?;
    let identity = Identity::new(&config.student_email, &config.student_secret);

    let metrics: Arc<dyn MetricsSink> = Arc::new(TracingMetricsSink);
    let reasoning = Arc::new(OpenAiReasoningService::new(&config));
    let fetcher = Arc::new(HttpFileFetcher::from_config(&config).context("创建下载客户端失败")?);
    let solver = ToolCallingSolver::new(
        reasoning,
        fetcher,
        Arc::clone(&metrics),
        RetryPolicy::from_config(&config),
        SolverSettings::from_config(&config),
    )
    .context("创建求解器失败")?;
    let submitter = HttpAnswerSubmitter::from_config(&config).context("创建提交客户端失败")?;

    let orchestrator = QuizOrchestrator::new(
        Arc::new(ChromiumRenderer::from_config(&config)),
        Arc::new(solver),
        Arc::new(submitter),
        metrics,
        OrchestratorSettings::from_config(&config),
    )
    .context("创建编排器失败")?;

    // 运行测验链
    let result = orchestrator.solve_quiz_sequence(&identity, &start_url).await;
    logging::print_final_stats(&result);

    if !result.succeeded {
        std::process::exit(1);
    }
    Ok(())
}
