//! # Mailer Service
//!
//! オンライン予約の変更（予約・キャンセル）を定期的に検知し、
//! まとめて 1 通の通知メールを送る常駐サービス。
//!
//! ## 構成
//!
//! ```text
//! ┌───────────┐   run()   ┌────────────────────┐  fetch   ┌──────────────┐
//! │ Scheduler │──────────▶│ ChangeDetectionJob │─────────▶│ 変更ログ DB  │
//! └───────────┘           └────────────────────┘          └──────────────┘
//!                                   │ send (text/html)
//!                                   ▼
//!                         ┌────────────────────┐   SMTP   ┌──────────────┐
//!                         │    MailerDaemon    │─────────▶│ メールサーバー │
//!                         └────────────────────┘          └──────────────┘
//! ```
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `DATABASE_URL` | **Yes** | 変更ログ DB（PostgreSQL）の接続 URL |
//! | `SCHEDULE` | **Yes** | 秒付き cron 式（間隔 15 分以上） |
//! | `MAIL_FROM` | **Yes** | 送信元メールアドレス |
//! | `MAIL_TO` | **Yes** | 送信先メールアドレス |
//! | `MAIL_SUBJECT` | No | 件名（デフォルト: `Terminänderungen`） |
//! | `MAIL_TRANSPORT` | No | `smtp` または `noop`（デフォルト: `smtp`） |
//! | `SMTP_HOST` / `SMTP_PORT` | No | SMTP サーバー（デフォルト: `localhost:25`） |
//! | `SMTP_USER` / `SMTP_PASSWORD` | No | SMTP 認証情報（ユーザー設定時のみ認証） |
//! | `MAILER_IDLE_TIMEOUT_SECS` | No | 接続をアイドルクローズするまでの秒数（デフォルト: 30） |
//! | `LOG_FORMAT` | No | `json` または `pretty`（デフォルト: `pretty`） |
//! | `RUST_LOG` | No | ログフィルタ（デフォルト: `info,apptmail=debug`） |
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（メールは送らずログに出す）
//! MAIL_TRANSPORT=noop cargo run -p apptmail-mailer-service
//!
//! # 本番環境
//! SCHEDULE="0 */15 7-19 * * Mon-Fri" DATABASE_URL=postgres://... cargo run -p apptmail-mailer-service --release
//! ```
//!
//! ## 停止
//!
//! SIGINT / SIGTERM を受けるとスケジューラを止め、メーラーデーモンの接続を閉じてから終了する。

use std::sync::Arc;

use anyhow::Context as _;
use apptmail_domain::clock::{Clock, SystemClock};
use apptmail_infra::{
    collector::PostgresChangeCollector,
    db,
    mailer::{MailTransport, MailerDaemon, NoopTransport, SmtpTransport},
};
use apptmail_mailer_service::{
    config::{MailerServiceConfig, TransportKind},
    usecase::{ChangeDetectionJob, TemplateRenderer},
};
use apptmail_shared::observability::{TracingConfig, init_tracing};
use tokio::{signal, sync::watch};

/// Mailer Service のエントリーポイント
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    let tracing_config = TracingConfig::from_env("mailer-service");
    init_tracing(&tracing_config);

    // 設定読み込み（不正ならここで非ゼロ終了）
    let config = MailerServiceConfig::from_env().context("設定の読み込みに失敗しました")?;
    tracing::info!(
        schedule = %config.schedule.expression(),
        transport = ?config.transport,
        to = %config.mailer.to,
        service = %tracing_config.service_name,
        "Mailer Service を起動します"
    );

    // データベース接続プールを作成
    let pool = db::create_pool(&config.database_url)
        .await
        .context("データベース接続に失敗しました")?;
    tracing::info!("データベースに接続しました");

    // メール送信トランスポート
    let transport: Arc<dyn MailTransport> = match config.transport {
        TransportKind::Smtp => {
            tracing::info!(
                host = %config.smtp.host,
                port = config.smtp.port,
                "SMTP でメールを送信します"
            );
            Arc::new(SmtpTransport::new(config.smtp.clone()))
        }
        TransportKind::Noop => {
            tracing::info!("Noop モード: メールは送信しません");
            Arc::new(NoopTransport)
        }
    };

    // メーラーデーモンを起動してからジョブをスケジュールする
    let (daemon_stop_tx, daemon_stop_rx) = watch::channel(false);
    let daemon = Arc::new(MailerDaemon::new(config.mailer.clone(), transport));
    let daemon_handle = daemon
        .run(daemon_stop_rx)
        .context("メーラーデーモンの起動に失敗しました")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let initial_cursor = config
        .schedule
        .initial_cursor(clock.now())
        .context("スケジュールの次回実行時刻を計算できません")?;
    let renderer = TemplateRenderer::new().context("通知テンプレートの登録に失敗しました")?;

    let mut job = ChangeDetectionJob::new(
        Arc::new(PostgresChangeCollector::new(pool.clone())),
        Arc::new(renderer),
        daemon,
        Arc::clone(&clock),
        initial_cursor,
    );
    tracing::info!(%initial_cursor, "変更検知ジョブを初期化しました");

    let (scheduler_stop_tx, scheduler_stop_rx) = watch::channel(false);
    let schedule = config.schedule.clone();
    let scheduler_handle = tokio::spawn(async move {
        schedule.run(&mut job, clock.as_ref(), scheduler_stop_rx).await;
    });

    // 停止シグナルを待つ
    shutdown_signal().await?;
    tracing::info!("停止シグナルを受信しました");

    // 実行中のサイクルは最後まで走らせ、その後でデーモンを止める
    scheduler_stop_tx.send_replace(true);
    scheduler_handle
        .await
        .context("スケジューラタスクが異常終了しました")?;
    daemon_stop_tx.send_replace(true);
    daemon_handle
        .await
        .context("メーラーデーモンが異常終了しました")?;

    pool.close().await;
    tracing::info!("Mailer Service を停止しました");

    Ok(())
}

/// SIGINT（Ctrl+C）または SIGTERM を待つ
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .context("Ctrl+C ハンドラの登録に失敗しました")
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("SIGTERM ハンドラの登録に失敗しました")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}
