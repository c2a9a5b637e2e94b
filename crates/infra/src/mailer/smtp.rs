//! SMTP 送信トランスポート
//!
//! lettre の `AsyncSmtpConnection` を直接使い、1 本の接続で複数のメッセージを
//! 送信する。接続の寿命はメーラーデーモンが管理するため、
//! lettre の接続プール付き `AsyncSmtpTransport` は使わない。
//!
//! TLS は使用しない（院内ネットワークのリレーサーバー向け）。

use std::time::Duration;

use apptmail_domain::notification::MailMessage;
use async_trait::async_trait;
use lettre::{
    Message,
    message::header::ContentType,
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::AsyncSmtpConnection,
        extension::ClientId,
    },
};

use super::{MailConnection, MailTransport, TransportError};

/// EHLO で名乗るホスト名
const HELLO_NAME: &str = "localhost";

/// 認証で試す方式（この順に試行する）
const AUTH_MECHANISMS: &[Mechanism] = &[Mechanism::Plain, Mechanism::Login];

/// SMTP 接続設定
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// SMTP サーバーのホスト名
    pub host:     String,
    /// SMTP サーバーのポート番号
    pub port:     u16,
    /// 認証ユーザー。`None` の場合は認証しない
    pub username: Option<String>,
    /// 認証パスワード
    pub password: String,
    /// 接続・応答待ちのタイムアウト
    pub timeout:  Duration,
}

/// SMTP 送信トランスポート
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    settings: SmtpSettings,
}

impl SmtpTransport {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn credentials(&self) -> Option<Credentials> {
        self.settings
            .username
            .as_ref()
            .map(|user| Credentials::new(user.clone(), self.settings.password.clone()))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    #[tracing::instrument(skip_all, level = "debug", fields(host = %self.settings.host, port = self.settings.port))]
    async fn dial(&self) -> Result<Box<dyn MailConnection>, TransportError> {
        let mut connection = AsyncSmtpConnection::connect_tokio1(
            (self.settings.host.as_str(), self.settings.port),
            Some(self.settings.timeout),
            &ClientId::Domain(HELLO_NAME.to_string()),
            None,
            None,
        )
        .await
        .map_err(|e| TransportError::Dial(e.to_string()))?;

        if let Some(credentials) = self.credentials() {
            if let Err(e) = connection.auth(AUTH_MECHANISMS, &credentials).await {
                connection.abort().await;
                return Err(TransportError::Dial(format!("認証失敗: {e}")));
            }
        }

        Ok(Box::new(SmtpConnection { inner: connection }))
    }
}

/// 確立済みの SMTP 接続
struct SmtpConnection {
    inner: AsyncSmtpConnection,
}

#[async_trait]
impl MailConnection for SmtpConnection {
    async fn send(&mut self, message: &MailMessage) -> Result<(), TransportError> {
        let email = build_message(message)?;

        self.inner
            .send(email.envelope(), &email.formatted())
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;

        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .quit()
            .await
            .map_err(|e| TransportError::Close(e.to_string()))?;

        Ok(())
    }
}

/// [`MailMessage`] を lettre の `Message` に変換する
fn build_message(message: &MailMessage) -> Result<Message, TransportError> {
    let content_type = ContentType::parse(&message.content_type).map_err(|e| {
        TransportError::InvalidMessage(format!(
            "コンテンツタイプ不正 ({}): {e}",
            message.content_type
        ))
    })?;

    Message::builder()
        .from(
            message
                .from
                .parse()
                .map_err(|e| TransportError::InvalidMessage(format!("送信元アドレス不正: {e}")))?,
        )
        .to(message
            .to
            .parse()
            .map_err(|e| TransportError::InvalidMessage(format!("宛先アドレス不正: {e}")))?)
        .subject(&message.subject)
        .header(content_type)
        .body(message.body.clone())
        .map_err(|e| TransportError::InvalidMessage(format!("メッセージ構築失敗: {e}")))
}
