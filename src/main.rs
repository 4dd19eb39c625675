use clap::{Parser, Subcommand};
use filetransfer_lib::commands::run::{parse_env_pair, run_task, RunOptions};
use filetransfer_lib::commands::test::test_connection;
use filetransfer_lib::core::{RemoteTarget, TaskContext};
use filetransfer_lib::storage::SftpConnector;
use filetransfer_lib::config::load_task_env;
use filetransfer_lib::{config_dir, logging, TransferConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about = "本地/远程文件传输任务", long_about = None)]
struct Cli {
    /// 配置目录（默认为系统配置目录下的 filetransfer）
    #[arg(long, global = true, env = "FILETRANSFER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 执行任务文件（JSON 或 YAML）
    Run {
        task_file: PathBuf,
        /// 工作目录
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// 任务环境 KEY=VALUE，可重复
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
    },
    /// 测试 SFTP 连接
    TestConnection {
        #[arg(long)]
        server: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        key_file: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = match config_dir(cli.config_dir.as_deref()) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("无法创建配置目录: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config_dir);

    match cli.command {
        Commands::Run {
            task_file,
            cwd,
            env,
        } => {
            let options = RunOptions {
                task_file,
                cwd,
                env,
            };
            match run_task(&config_dir, &options).await {
                Ok(report) => {
                    match serde_json::to_string_pretty(&report) {
                        Ok(json) => println!("{}", json),
                        Err(e) => tracing::warn!("无法序列化报告: {}", e),
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!("任务失败: {:#}", e);
                    eprintln!("{:#}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::TestConnection {
            server,
            user,
            key_file,
            port,
        } => {
            let connector = SftpConnector::new(TransferConfig::load(&config_dir));
            let target = RemoteTarget {
                server,
                user,
                key_file,
                port,
            };
            let mut ctx = match TaskContext::current() {
                Ok(ctx) => ctx,
                Err(e) => {
                    eprintln!("无法获取当前目录: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            ctx.env = load_task_env(&config_dir);

            let result = test_connection(&connector, &target, &ctx).await;
            println!("{}: {}", result.message, result.details.unwrap_or_default());
            if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
