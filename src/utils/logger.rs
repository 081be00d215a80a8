/// 日志初始化模块
///
/// 控制台 + 文件双输出，日志级别可由配置覆盖。
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const LOG_PATTERN: &str = "[{d(%Y-%m-%d %H:%M:%S)}] [{l}] [{M}] {m}{n}";

/// 初始化全局日志系统
pub fn init_logger(level: &str, log_file: Option<&str>) -> anyhow::Result<()> {
    let level = parse_level(level);

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let mut config_builder =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root_builder = Root::builder().appender("console");

    if let Some(path) = log_file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(path)?;
        config_builder = config_builder.appender(Appender::builder().build("file", Box::new(file)));
        root_builder = root_builder.appender("file");
    }

    let config = config_builder.build(root_builder.build(level))?;
    log4rs::init_config(config)?;

    Ok(())
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "WARN" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}
