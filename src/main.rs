use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use regreport::{AppMode, Application, GenerateArgs, ShutdownManager};
use regreport_config::AppConfig;
use regreport_core::{ReportFormat, ReportType};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("regreport")
        .version(env!("CARGO_PKG_VERSION"))
        .about("监管合规报告生成与调度系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认路径查找"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["run", "seed", "generate", "validate-config"])
                .default_value("run"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("report-type")
                .long("report-type")
                .value_name("TYPE")
                .help("报告类型 (generate模式)")
                .value_parser(["FINREP", "COREP", "DORA_ICT", "CUSTOM"])
                .required_if_eq("mode", "generate"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .help("输出格式 (generate模式)，默认取报告类型的默认格式")
                .value_parser(["XBRL", "CSV", "JSON"]),
        )
        .arg(
            Arg::new("period")
                .long("period")
                .value_name("PERIOD")
                .help("报告期间，如 2024-Q1、2024-05、2023 (generate模式)")
                .required_if_eq("mode", "generate"),
        )
        .arg(
            Arg::new("institution")
                .long("institution")
                .value_name("ID")
                .help("机构ID (generate模式)，默认取配置中的默认机构"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = AppConfig::load(config_path).context("加载配置失败")?;

    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.logging.level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.logging.format);
    init_logging(log_level, log_format)?;

    let mode = parse_app_mode(&matches)?;
    info!("启动监管报告系统，模式: {:?}", mode);

    match mode {
        AppMode::ValidateConfig => {
            info!("配置校验通过");
            println!("{}", config.to_toml()?);
            Ok(())
        }
        AppMode::Seed => {
            let app = Application::new(config).await?;
            let created = app.seed().await?;
            info!("写入默认报告计划 {} 个", created);
            app.database().close().await;
            Ok(())
        }
        AppMode::Generate(args) => {
            let app = Application::new(config).await?;
            let result = app.generate(args).await?;
            app.database().close().await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.is_success() {
                Ok(())
            } else {
                Err(anyhow::anyhow!(
                    "报告生成失败: {}",
                    result.error_message.unwrap_or_default()
                ))
            }
        }
        AppMode::Run => run_service(config).await,
    }
}

async fn run_service(config: AppConfig) -> Result<()> {
    let app = Arc::new(Application::new(config).await?);
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e:#}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("监管报告系统已退出");
    Ok(())
}

fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
        _ => return Err(anyhow::anyhow!("不支持的日志格式: {log_format}")),
    }

    Ok(())
}

fn parse_app_mode(matches: &ArgMatches) -> Result<AppMode> {
    let mode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("run");

    match mode {
        "run" => Ok(AppMode::Run),
        "seed" => Ok(AppMode::Seed),
        "validate-config" => Ok(AppMode::ValidateConfig),
        "generate" => {
            let report_type: ReportType = matches
                .get_one::<String>("report-type")
                .context("generate模式需要 --report-type")?
                .parse()
                .map_err(anyhow::Error::msg)?;
            let format = matches
                .get_one::<String>("format")
                .map(|f| f.parse::<ReportFormat>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let reporting_period = matches
                .get_one::<String>("period")
                .context("generate模式需要 --period")?
                .clone();

            Ok(AppMode::Generate(GenerateArgs {
                report_type,
                format,
                reporting_period,
                institution_id: matches.get_one::<String>("institution").cloned(),
            }))
        }
        _ => Err(anyhow::anyhow!("不支持的运行模式: {mode}")),
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到Ctrl+C信号"),
        _ = terminate => info!("收到SIGTERM信号"),
    }
}
