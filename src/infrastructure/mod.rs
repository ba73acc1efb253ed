//! 基础设施层
//!
//! 持有外部资源（浏览器、推理服务客户端、HTTP 客户端），只暴露能力

pub mod fetcher;
pub mod reasoning;
pub mod renderer;

pub use fetcher::{FileFetcher, HttpFileFetcher};
pub use reasoning::{OpenAiReasoningService, ReasoningService};
pub use renderer::{ChromiumRenderer, ChromiumSettings, PageRenderer};
