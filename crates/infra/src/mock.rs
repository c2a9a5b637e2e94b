//! # テスト用モック
//!
//! ユースケーステストとデーモンテストで使用するインメモリモック。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! apptmail-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use apptmail_domain::{ChangeRecord, notification::MailMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    collector::ChangeCollector,
    error::InfraError,
    mailer::{MailConnection, MailSender, MailTransport, MailerError, TransportError},
};

// ===== MockChangeCollector =====

/// 登録した変更を返す ChangeCollector
///
/// `since` によるフィルタは行い、呼び出し時の `since` を記録する。
#[derive(Clone, Default)]
pub struct MockChangeCollector {
    records: Arc<Mutex<Vec<ChangeRecord>>>,
    calls:   Arc<Mutex<Vec<DateTime<Utc>>>>,
    failing: Arc<AtomicBool>,
}

impl MockChangeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&self, record: ChangeRecord) {
        self.records.lock().unwrap().push(record);
    }

    /// 以降の `fetch` を失敗させるかどうか
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `fetch` に渡された `since` の一覧
    pub fn calls(&self) -> Vec<DateTime<Utc>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeCollector for MockChangeCollector {
    async fn fetch(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRecord>, InfraError> {
        self.calls.lock().unwrap().push(since);

        if self.failing.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut.into());
        }

        let mut records: Vec<ChangeRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.changed_at() > since)
            .cloned()
            .collect();
        records.sort_by_key(ChangeRecord::changed_at);
        Ok(records)
    }
}

// ===== MockMailSender =====

/// 受け取った本文を記録する MailSender
#[derive(Clone, Default)]
pub struct MockMailSender {
    sent:    Arc<Mutex<Vec<(String, String)>>>,
    failing: Arc<AtomicBool>,
}

impl MockMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以降の `send` を `NotRunning` で失敗させるかどうか
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 送信された `(content_type, body)` の一覧
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for MockMailSender {
    async fn send(&self, content_type: &str, body: String) -> Result<(), MailerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailerError::NotRunning);
        }
        self.sent
            .lock()
            .unwrap()
            .push((content_type.to_string(), body));
        Ok(())
    }
}

// ===== MockMailTransport =====

/// 接続・送信・切断の回数を数える MailTransport
///
/// 送信されたメッセージは全接続で共有されるリストに記録される。
#[derive(Clone, Default)]
pub struct MockMailTransport {
    dials:      Arc<AtomicUsize>,
    connects:   Arc<AtomicUsize>,
    closes:     Arc<AtomicUsize>,
    sent:       Arc<Mutex<Vec<MailMessage>>>,
    fail_dial:  Arc<AtomicBool>,
    fail_send:  Arc<AtomicBool>,
    send_calls: Arc<AtomicUsize>,
}

impl MockMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_dial(&self, failing: bool) {
        self.fail_dial.store(failing, Ordering::SeqCst);
    }

    pub fn set_fail_send(&self, failing: bool) {
        self.fail_send.store(failing, Ordering::SeqCst);
    }

    /// `dial` が呼ばれた回数（失敗を含む）
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// `close` が呼ばれた回数
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// 接続上で `send` が呼ばれた回数（失敗を含む）
    pub fn send_attempts(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// 送信に成功したメッセージ
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// 開いている接続の数
    pub fn open_connections(&self) -> usize {
        let connects = self.connects.load(Ordering::SeqCst);
        connects.saturating_sub(self.close_count())
    }
}

#[async_trait]
impl MailTransport for MockMailTransport {
    async fn dial(&self) -> Result<Box<dyn MailConnection>, TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.fail_dial.load(Ordering::SeqCst) {
            return Err(TransportError::Dial("connection refused".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockMailConnection {
            transport: self.clone(),
        }))
    }
}

struct MockMailConnection {
    transport: MockMailTransport,
}

#[async_trait]
impl MailConnection for MockMailConnection {
    async fn send(&mut self, message: &MailMessage) -> Result<(), TransportError> {
        self.transport.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.transport.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Send("550 mailbox unavailable".to_string()));
        }
        self.transport.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.transport.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
