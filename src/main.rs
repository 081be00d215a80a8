use clap::{Arg, ArgAction, Command};
use std::sync::Arc;

use tokenmm::core::config::{ApiKeys, Config};
use tokenmm::exchanges::{BinanceExchange, PaperExchange};
use tokenmm::strategies::grid::{GridBotConfig, GridStrategy};
use tokenmm::utils::{init_logger, quote_asset};
use tokenmm::Exchange;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载环境变量
    dotenv::dotenv().ok();

    let matches = Command::new("tokenmm")
        .version("0.1.0")
        .about("代币做市网格引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/grid.yml"),
        )
        .arg(
            Arg::new("id")
                .short('i')
                .long("id")
                .value_name("ID")
                .help("策略实例标识")
                .default_value("grid-1"),
        )
        .arg(
            Arg::new("paper")
                .long("paper")
                .help("使用纸面交易所（不接真实交易所）")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/grid.yml");
    let strategy_id = matches
        .get_one::<String>("id")
        .map(String::as_str)
        .unwrap_or("grid-1");
    let paper_mode = matches.get_flag("paper");

    let bot_config = GridBotConfig::from_file(config_file)?;
    init_logger(&bot_config.logging.level, bot_config.logging.file.as_deref())?;

    log::info!(
        "🚀 启动做市引擎: 配置={}, 实例={}, 纸面模式={}",
        config_file,
        strategy_id,
        paper_mode
    );

    let exchange: Arc<dyn Exchange> = if paper_mode {
        let paper = PaperExchange::new();
        let symbol = &bot_config.strategy.symbol;
        paper.set_mark_price(symbol, 1.0).await;
        paper
            .set_balance(&quote_asset(symbol)?, 10_000.0, 0.0)
            .await;
        Arc::new(paper)
    } else {
        let config = Config::from_settings(&bot_config.exchange);
        let api_keys = ApiKeys::from_env(&bot_config.exchange.name)?;
        Arc::new(BinanceExchange::new(config, api_keys))
    };

    let strategy = GridStrategy::new(strategy_id);
    strategy.set_exchange_connector(exchange.clone()).await;
    strategy.initialize(bot_config.strategy.clone()).await?;
    strategy.start().await?;

    // 以盘口tick驱动价格触发，直至收到Ctrl-C
    let ticker_strategy = strategy.clone();
    let ticker_exchange = exchange.clone();
    let symbol = bot_config.strategy.symbol.clone();
    let tick_task = tokio::spawn(async move {
        let mut timer = tokio::time::interval(tokio::time::Duration::from_secs(5));
        loop {
            timer.tick().await;
            match ticker_exchange.get_ticker(&symbol).await {
                Ok(ticker) if ticker.bid > 0.0 && ticker.ask > 0.0 => {
                    let mid = (ticker.bid + ticker.ask) / 2.0;
                    ticker_strategy.on_price_update(&symbol, mid).await;
                }
                Ok(_) => {}
                Err(e) => log::warn!("⚠️ 获取行情失败: {}", e),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    log::info!("📴 收到退出信号，正在停止策略");

    tick_task.abort();
    strategy.stop().await?;

    log::info!("👋 做市引擎已退出");
    Ok(())
}
