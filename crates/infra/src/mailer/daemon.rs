//! メーラーデーモン
//!
//! 送信トランスポートの接続を 1 本だけ専有する常駐ワーカー。
//!
//! ## 状態遷移
//!
//! ```text
//! Stopped ──run()──▶ Running ──停止シグナル──▶ Stopped
//!                      │
//!                      └─ run() ─▶ AlreadyRunning（状態は変わらない）
//! ```
//!
//! ## ワーカーループ
//!
//! メッセージ受信・アイドルタイマー・停止シグナルの 3 つを待つ。
//!
//! - メッセージ: 接続が無ければ確立してから送信する。接続に失敗したメッセージは
//!   送信せずに破棄する。送信に失敗しても接続は閉じずに再利用する
//! - アイドルタイマー: 接続が開いていれば閉じる
//! - 停止シグナル: 起動フラグを下ろし、開いている接続を閉じて終了する
//!
//! `send` は ワーカーがメッセージを受け取るまでブロックするため、
//! 呼び出し元とワーカーの間に滞留するメッセージは常に高々 1 通で、
//! 配送順序は `send` の呼び出し順になる。

use std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use apptmail_domain::notification::MailMessage;
use apptmail_shared::{
    event_log::{error, event},
    log_business_event,
};
use async_trait::async_trait;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use super::{MailConnection, MailSender, MailTransport, MailerError};

/// 接続をアイドルクローズするまでの既定の待ち時間
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// メーラーデーモンの設定
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// 送信元メールアドレス
    pub from:         String,
    /// 送信先メールアドレス（単一）
    pub to:           String,
    /// 件名
    pub subject:      String,
    /// 最後の送信から接続を閉じるまでの時間
    pub idle_timeout: Duration,
}

/// ワーカーへの引き渡し単位
///
/// ワーカーは受け取った時点で `received` に応答し、`send` の呼び出し元を解放する。
struct Handoff {
    message:  MailMessage,
    received: oneshot::Sender<()>,
}

/// デーモンとワーカーで共有する状態
struct Shared {
    /// 起動フラグ（ロック無しで参照する高速パス用）
    running: AtomicBool,
    /// ワーカーへの送信口。起動・停止の遷移はこのロックの内側で行う
    outbox:  Mutex<Option<mpsc::Sender<Handoff>>>,
}

impl Shared {
    fn lock_outbox(&self) -> MutexGuard<'_, Option<mpsc::Sender<Handoff>>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// メーラーデーモン
///
/// プロセスで 1 つ生成し、`Arc` で変更検知ジョブと共有する。
pub struct MailerDaemon {
    config:    MailerConfig,
    transport: Arc<dyn MailTransport>,
    shared:    Arc<Shared>,
}

impl MailerDaemon {
    pub fn new(config: MailerConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            config,
            transport,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                outbox:  Mutex::new(None),
            }),
        }
    }

    /// デーモンを起動する
    ///
    /// ワーカータスクを起動し、その `JoinHandle` を返す。ハンドルは停止後の
    /// 後始末（起動フラグのクリアと接続のクローズ）が終わった時点で完了する。
    ///
    /// `stop` に `true` が送られるか送信側がドロップされると停止する。
    /// 複数の呼び出し元から同時に呼ばれても起動に成功するのは 1 つだけで、
    /// 残りは [`MailerError::AlreadyRunning`] を返す。
    ///
    /// tokio ランタイム上で呼び出すこと。
    pub fn run(&self, stop: watch::Receiver<bool>) -> Result<JoinHandle<()>, MailerError> {
        // 起動済みの場合はロックを取らずに返す
        if self.shared.is_running() {
            return Err(MailerError::AlreadyRunning);
        }

        let mut outbox = self.shared.lock_outbox();
        if self.shared.is_running() {
            return Err(MailerError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel(1);
        *outbox = Some(tx);

        let worker = Worker {
            transport:    Arc::clone(&self.transport),
            shared:       Arc::clone(&self.shared),
            idle_timeout: self.config.idle_timeout,
            connection:   None,
        };
        let handle = tokio::spawn(worker.run(rx, stop));

        self.shared.running.store(true, Ordering::Release);
        drop(outbox);

        tracing::info!(
            to = %self.config.to,
            idle_timeout_secs = self.config.idle_timeout.as_secs(),
            "メーラーデーモンを起動しました"
        );

        Ok(handle)
    }

    /// デーモンが起動中かどうか
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    fn build_message(&self, content_type: &str, body: String) -> MailMessage {
        MailMessage {
            from: self.config.from.clone(),
            to: self.config.to.clone(),
            subject: self.config.subject.clone(),
            content_type: content_type.to_string(),
            body,
        }
    }
}

#[async_trait]
impl MailSender for MailerDaemon {
    /// メッセージを組み立ててワーカーに引き渡す
    ///
    /// 本文はエスケープ済みであることを前提とし、加工せずに送信する。
    async fn send(&self, content_type: &str, body: String) -> Result<(), MailerError> {
        if !self.shared.is_running() {
            return Err(MailerError::NotRunning);
        }

        let outbox = self
            .shared
            .lock_outbox()
            .clone()
            .ok_or(MailerError::NotRunning)?;

        let (received_tx, received_rx) = oneshot::channel();
        let handoff = Handoff {
            message:  self.build_message(content_type, body),
            received: received_tx,
        };

        // ワーカーが停止済みの場合、送信口か応答チャネルが閉じている
        outbox
            .send(handoff)
            .await
            .map_err(|_| MailerError::NotRunning)?;
        received_rx.await.map_err(|_| MailerError::NotRunning)
    }
}

/// ワーカー（接続の唯一の所有者）
struct Worker {
    transport:    Arc<dyn MailTransport>,
    shared:       Arc<Shared>,
    idle_timeout: Duration,
    connection:   Option<Box<dyn MailConnection>>,
}

impl Worker {
    async fn run(mut self, mut outbox: mpsc::Receiver<Handoff>, mut stop: watch::Receiver<bool>) {
        if !*stop.borrow_and_update() {
            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow_and_update() {
                            break;
                        }
                    }
                    handoff = outbox.recv() => {
                        let Some(Handoff { message, received }) = handoff else {
                            break;
                        };
                        // 受け取った時点で呼び出し元を解放する
                        let _ = received.send(());
                        self.deliver(&message).await;
                    }
                    () = tokio::time::sleep(self.idle_timeout) => {
                        self.close_connection("idle").await;
                    }
                }
            }
        }

        self.shutdown(outbox).await;
    }

    async fn deliver(&mut self, message: &MailMessage) {
        if self.connection.is_none() {
            match self.transport.dial().await {
                Ok(connection) => {
                    tracing::debug!("メールサーバーに接続しました");
                    self.connection = Some(connection);
                }
                Err(e) => {
                    tracing::error!(
                        error.category = error::category::EXTERNAL_SERVICE,
                        error.kind = error::kind::SMTP_DIAL,
                        "{e}"
                    );
                    log_business_event!(
                        event.category = event::category::MAIL,
                        event.action = event::action::MAIL_SKIPPED,
                        event.result = event::result::FAILURE,
                        mail.to = %message.to,
                        "接続できないためメールを破棄しました"
                    );
                    return;
                }
            }
        }

        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        match connection.send(message).await {
            Ok(()) => {
                log_business_event!(
                    event.category = event::category::MAIL,
                    event.action = event::action::MAIL_SENT,
                    event.result = event::result::SUCCESS,
                    mail.to = %message.to,
                    mail.subject = %message.subject,
                    "通知メール送信成功"
                );
            }
            Err(e) => {
                // 接続は閉じずに次のメッセージで再利用する
                log_business_event!(
                    event.category = event::category::MAIL,
                    event.action = event::action::MAIL_FAILED,
                    event.result = event::result::FAILURE,
                    mail.to = %message.to,
                    error.category = error::category::EXTERNAL_SERVICE,
                    error.kind = error::kind::SMTP_SEND,
                    error = %e,
                    "通知メール送信失敗"
                );
            }
        }
    }

    async fn close_connection(&mut self, reason: &'static str) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        match connection.close().await {
            Ok(()) => tracing::debug!(reason, "メールサーバーとの接続を閉じました"),
            Err(e) => tracing::warn!(
                reason,
                error.category = error::category::EXTERNAL_SERVICE,
                error.kind = error::kind::SMTP_CLOSE,
                "{e}"
            ),
        }
    }

    async fn shutdown(&mut self, outbox: mpsc::Receiver<Handoff>) {
        {
            let mut sender = self.shared.lock_outbox();
            self.shared.running.store(false, Ordering::Release);
            *sender = None;
        }
        // 受け取り前のメッセージは破棄され、呼び出し元には NotRunning が返る
        drop(outbox);

        self.close_connection("shutdown").await;
        tracing::info!("メーラーデーモンを停止しました");
    }
}
