//! AutoXHS CLI - generate and publish Xiaohongshu image notes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use xhs::{
    ApiClient, BrowserSigner, Publisher, SessionManager, SessionState, SessionStore, TopicResolver,
};

use autoxhs::config::AppConfig;
use autoxhs::pipeline::{PostOptions, PostPipeline};

/// AutoXHS - LLM-driven Xiaohongshu publisher.
#[derive(Parser)]
#[command(name = "autoxhs")]
#[command(about = "Generate and publish Xiaohongshu image notes")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory (config, session, prompts, generated images)
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a phone number and SMS verification code
    Login {
        /// Phone number (mainland China, no country prefix)
        phone: String,
    },

    /// Check whether the saved session is still accepted
    Verify,

    /// Delete the saved session
    Logout,

    /// Generate a post for a theme and publish it
    Post {
        /// Post theme, e.g. "上海周末咖啡馆"
        theme: String,

        /// Publish publicly (default is a private note)
        #[arg(long)]
        public: bool,

        /// Skip web-search grounding
        #[arg(long)]
        no_search: bool,

        /// Review and refine the generated content before publishing
        #[arg(short, long)]
        interactive: bool,

        /// Category override (display name, or `auto`)
        #[arg(long)]
        category: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("autoxhs=debug,xhs=debug,info")
    } else {
        EnvFilter::new("autoxhs=info,xhs=info,warn")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = AppConfig::load(&cli.data_dir)?;

    let signer = Arc::new(BrowserSigner::default());
    let api = Arc::new(ApiClient::new(signer)?);
    let store = SessionStore::new(cli.data_dir.join("session.json"));
    let manager = SessionManager::load_or_anonymous(api.clone(), store, config.xhs_cookie.clone());

    match cli.command {
        Commands::Login { phone } => run_login(manager, &phone).await,
        Commands::Verify => run_verify(manager).await,
        Commands::Logout => run_logout(manager),
        Commands::Post {
            theme,
            public,
            no_search,
            interactive,
            category,
        } => {
            let resolver = TopicResolver::new(api.clone());
            let publisher = Publisher::new(manager, resolver, api);
            let mut pipeline = PostPipeline::new(config, cli.data_dir, publisher);
            let options = PostOptions {
                public,
                no_search,
                interactive,
                category,
            };
            pipeline.run(&theme, &options).await
        }
    }
}

async fn run_login(mut manager: SessionManager, phone: &str) -> Result<()> {
    println!("📱 正在发送验证码到 {phone}...");

    let ok = manager
        .login_by_phone(phone, || {
            dialoguer::Input::<String>::new()
                .with_prompt("验证码")
                .interact_text()
                .map_err(std::io::Error::other)
        })
        .await;

    if ok {
        println!("✅ 登录成功，会话已保存");
        Ok(())
    } else {
        anyhow::bail!("登录失败，请检查手机号和验证码")
    }
}

async fn run_verify(mut manager: SessionManager) -> Result<()> {
    match manager.state() {
        SessionState::Anonymous => {
            println!("📭 没有保存的会话，请先登录");
            return Ok(());
        }
        SessionState::Authenticated | SessionState::Expired => {}
    }

    if manager.verify().await {
        println!("✅ 会话有效");
    } else {
        println!("❌ 会话已失效，请重新登录");
    }
    Ok(())
}

fn run_logout(mut manager: SessionManager) -> Result<()> {
    manager.logout();
    println!("👋 已退出登录，会话已删除");
    Ok(())
}
