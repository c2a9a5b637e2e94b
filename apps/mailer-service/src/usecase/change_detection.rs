//! # 変更検知ジョブ
//!
//! 前回実行以降の予約変更を取得し、1 通の通知メールにまとめてメーラーに引き渡す。
//!
//! ## 1 サイクルの流れ
//!
//! ```text
//! サイクル開始時刻を記録
//!   → ChangeCollector::fetch(カーソル)
//!   → NotificationRenderer::render(カーソル, 変更一覧)
//!   → MailSender::send("text/html", 本文)
//!   → カーソル = サイクル開始時刻
//! ```
//!
//! いずれかの段階で失敗した場合はそこで打ち切り、カーソルは進めない。
//! 次のサイクルで同じ期間をもう一度対象にするため、通知は少なくとも 1 回届く
//! （重複はありうる）。
//!
//! 変更が 0 件でもレンダリングと送信は行う（「変更なし」の通知になる）。

use std::sync::Arc;

use apptmail_domain::{
    JobCursor,
    clock::Clock,
    notification::{CONTENT_TYPE_HTML, RenderError},
};
use apptmail_infra::{ChangeCollector, InfraError, MailSender, MailerError};
use apptmail_shared::{
    event_log::{error, event},
    log_business_event,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::NotificationRenderer;

/// 1 サイクルの失敗
#[derive(Debug, Error)]
pub enum CycleError {
    /// 予約変更の取得に失敗
    #[error("予約変更の取得に失敗: {0}")]
    Collection(#[from] InfraError),

    /// 通知本文のレンダリングに失敗
    #[error("通知本文のレンダリングに失敗: {0}")]
    Render(#[from] RenderError),

    /// メーラーへの引き渡しに失敗
    #[error("通知メールの引き渡しに失敗: {0}")]
    Send(#[from] MailerError),
}

impl CycleError {
    /// ログの `error.category` に出力する値
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Collection(_) => error::category::INFRASTRUCTURE,
            Self::Render(_) | Self::Send(_) => error::category::INTERNAL,
        }
    }

    /// ログの `error.kind` に出力する値
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Collection(_) => error::kind::COLLECTION,
            Self::Render(_) => error::kind::RENDER,
            Self::Send(MailerError::NotRunning) => error::kind::DAEMON_NOT_RUNNING,
            Self::Send(MailerError::AlreadyRunning) => error::kind::DAEMON_ALREADY_RUNNING,
        }
    }
}

/// 変更検知ジョブ
///
/// カーソルはこのジョブだけが保持し、サイクルが最後まで成功したときだけ進める。
pub struct ChangeDetectionJob {
    collector: Arc<dyn ChangeCollector>,
    renderer:  Arc<dyn NotificationRenderer>,
    mailer:    Arc<dyn MailSender>,
    clock:     Arc<dyn Clock>,
    cursor:    JobCursor,
}

impl ChangeDetectionJob {
    pub fn new(
        collector: Arc<dyn ChangeCollector>,
        renderer: Arc<dyn NotificationRenderer>,
        mailer: Arc<dyn MailSender>,
        clock: Arc<dyn Clock>,
        initial_cursor: DateTime<Utc>,
    ) -> Self {
        Self {
            collector,
            renderer,
            mailer,
            clock,
            cursor: JobCursor::new(initial_cursor),
        }
    }

    /// 前回成功したサイクルの開始時刻
    pub fn last_run(&self) -> DateTime<Utc> {
        self.cursor.last_run()
    }

    /// 1 サイクル実行する
    ///
    /// 失敗はログに記録するだけで呼び出し元には返さない。
    #[tracing::instrument(skip_all, fields(since = %self.cursor.last_run()))]
    pub async fn run(&mut self) {
        let since = self.cursor.last_run();

        match self.run_cycle().await {
            Ok(change_count) => {
                log_business_event!(
                    event.category = event::category::CHANGE_DETECTION,
                    event.action = event::action::CYCLE_COMPLETED,
                    event.result = event::result::SUCCESS,
                    changes = change_count,
                    window.start = %since,
                    window.end = %self.cursor.last_run(),
                    "変更検知サイクル完了"
                );
            }
            Err(e) => {
                log_business_event!(
                    event.category = event::category::CHANGE_DETECTION,
                    event.action = event::action::CYCLE_FAILED,
                    event.result = event::result::FAILURE,
                    error.category = e.error_category(),
                    error.kind = e.error_kind(),
                    error = %e,
                    "変更検知サイクル失敗（カーソルは据え置き）"
                );
            }
        }
    }

    /// 取得 → レンダリング → 送信を行い、成功したら取得件数を返す
    async fn run_cycle(&mut self) -> Result<usize, CycleError> {
        let cycle_start = self.clock.now();
        let since = self.cursor.last_run();

        let changes = self.collector.fetch(since).await?;
        tracing::debug!(changes = changes.len(), "予約変更を取得しました");

        let body = self.renderer.render(since, &changes)?;

        self.mailer.send(CONTENT_TYPE_HTML, body).await?;

        if !self.cursor.advance_to(cycle_start) {
            tracing::warn!(
                %cycle_start,
                last_run = %self.cursor.last_run(),
                "サイクル開始時刻が前回実行時刻より前のためカーソルを進めません"
            );
        }

        Ok(changes.len())
    }
}

#[cfg(test)]
mod tests {
    use apptmail_domain::{ChangeRecord, SubjectId, change::APPOINTMENT_TIMEZONE, clock::FixedClock};
    use apptmail_infra::mock::{MockChangeCollector, MockMailSender};
    use chrono::{TimeDelta, TimeZone};
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::usecase::TemplateRenderer;

    /// 常に失敗するレンダラー
    struct FailingRenderer;

    impl NotificationRenderer for FailingRenderer {
        fn render(&self, _since: DateTime<Utc>, _changes: &[ChangeRecord]) -> Result<String, RenderError> {
            Err(RenderError::Rendering("Variable `changes` not found".to_string()))
        }
    }

    struct Fixture {
        collector: MockChangeCollector,
        mailer:    MockMailSender,
        cursor:    DateTime<Utc>,
        now:       DateTime<Utc>,
    }

    impl Fixture {
        fn job(&self) -> ChangeDetectionJob {
            self.job_with_renderer(Arc::new(TemplateRenderer::new().unwrap()))
        }

        fn job_with_renderer(&self, renderer: Arc<dyn NotificationRenderer>) -> ChangeDetectionJob {
            ChangeDetectionJob::new(
                Arc::new(self.collector.clone()),
                renderer,
                Arc::new(self.mailer.clone()),
                Arc::new(FixedClock::new(self.now)),
                self.cursor,
            )
        }
    }

    #[fixture]
    fn fixture() -> Fixture {
        Fixture {
            collector: MockChangeCollector::new(),
            mailer:    MockMailSender::new(),
            cursor:    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            now:       Utc.with_ymd_and_hms(2024, 1, 1, 0, 15, 0).unwrap(),
        }
    }

    fn make_record(changed_at: DateTime<Utc>, name: &str, id: i32, is_creation: bool) -> ChangeRecord {
        ChangeRecord::new(
            changed_at,
            APPOINTMENT_TIMEZONE
                .with_ymd_and_hms(2024, 1, 8, 9, 30, 0)
                .unwrap(),
            SubjectId::new(id),
            name.to_string(),
            is_creation,
        )
    }

    #[rstest]
    #[tokio::test]
    async fn test_成功したサイクルはカーソルをサイクル開始時刻まで進める(fixture: Fixture) {
        let base = fixture.cursor;
        fixture.collector.add_record(make_record(
            base + TimeDelta::minutes(3),
            apptmail_domain::change::extract_subject_name("Jane Doe, extra text"),
            1,
            true,
        ));
        fixture
            .collector
            .add_record(make_record(base + TimeDelta::minutes(7), "Max Mustermann", 2, false));
        let mut sut = fixture.job();

        sut.run().await;

        // 最後の変更時刻ではなくサイクル開始時刻
        assert_eq!(sut.last_run(), fixture.now);
        assert!(sut.last_run() > base);
        assert_eq!(fixture.collector.calls(), vec![base]);

        let sent = fixture.mailer.sent();
        assert_eq!(sent.len(), 1);
        let (content_type, body) = &sent[0];
        assert_eq!(content_type, "text/html");
        let jane = body.find("Jane Doe").unwrap();
        let max = body.find("Max Mustermann").unwrap();
        assert!(jane < max);
        assert!(body.contains("08.01.2024 09:30"));
        assert!(!body.contains("extra text"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_変更が無くてもレンダリングして1通送信する(fixture: Fixture) {
        let mut sut = fixture.job();

        sut.run().await;

        let sent = fixture.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Keine Terminänderungen"));
        assert_eq!(sut.last_run(), fixture.now);
    }

    #[rstest]
    #[tokio::test]
    async fn test_取得に失敗した場合は送信せずカーソルを据え置く(fixture: Fixture) {
        fixture.collector.set_failing(true);
        let mut sut = fixture.job();

        let result = sut.run_cycle().await;

        assert!(matches!(result, Err(CycleError::Collection(_))));
        assert!(fixture.mailer.sent().is_empty());
        assert_eq!(sut.last_run(), fixture.cursor);
    }

    #[rstest]
    #[tokio::test]
    async fn test_レンダリングに失敗した場合は送信せずカーソルを据え置く(fixture: Fixture) {
        let mut sut = fixture.job_with_renderer(Arc::new(FailingRenderer));

        let result = sut.run_cycle().await;

        assert!(matches!(result, Err(CycleError::Render(_))));
        assert!(fixture.mailer.sent().is_empty());
        assert_eq!(sut.last_run(), fixture.cursor);
    }

    #[rstest]
    #[tokio::test]
    async fn test_メーラーが停止している場合はカーソルを据え置く(fixture: Fixture) {
        fixture.mailer.set_failing(true);
        let mut sut = fixture.job();

        let result = sut.run_cycle().await;

        assert!(matches!(
            result,
            Err(CycleError::Send(MailerError::NotRunning))
        ));
        assert_eq!(sut.last_run(), fixture.cursor);
    }

    #[rstest]
    #[tokio::test]
    async fn test_失敗したサイクルの期間は次のサイクルで再取得する(fixture: Fixture) {
        fixture.collector.set_failing(true);
        let mut sut = fixture.job();

        sut.run().await;
        fixture.collector.set_failing(false);
        sut.run().await;

        assert_eq!(fixture.collector.calls(), vec![fixture.cursor, fixture.cursor]);
        assert_eq!(fixture.mailer.sent().len(), 1);
        assert_eq!(sut.last_run(), fixture.now);
    }

    #[rstest]
    #[tokio::test]
    async fn test_成功したサイクルは取得件数を返す(fixture: Fixture) {
        fixture
            .collector
            .add_record(make_record(fixture.cursor + TimeDelta::minutes(1), "Jane Doe", 1, true));
        // カーソル以前の変更は対象外
        fixture
            .collector
            .add_record(make_record(fixture.cursor, "Max Mustermann", 2, false));
        let mut sut = fixture.job();

        let result = sut.run_cycle().await;

        assert_eq!(result.unwrap(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_時計が巻き戻ってもカーソルは後退しない(fixture: Fixture) {
        let mut sut = ChangeDetectionJob::new(
            Arc::new(fixture.collector.clone()),
            Arc::new(TemplateRenderer::new().unwrap()),
            Arc::new(fixture.mailer.clone()),
            Arc::new(FixedClock::new(fixture.cursor - TimeDelta::minutes(5))),
            fixture.cursor,
        );

        let result = sut.run_cycle().await;

        assert!(result.is_ok());
        assert_eq!(sut.last_run(), fixture.cursor);
    }

    #[rstest]
    #[case(CycleError::Render(RenderError::Rendering("x".to_string())), "render")]
    #[case(CycleError::Send(MailerError::NotRunning), "daemon_not_running")]
    #[case(CycleError::Send(MailerError::AlreadyRunning), "daemon_already_running")]
    #[case(CycleError::Collection(decode_failure()), "collection")]
    fn test_error_kindはエラー種別に対応する(#[case] error: CycleError, #[case] expected: &str) {
        assert_eq!(error.error_kind(), expected);
    }

    fn decode_failure() -> InfraError {
        InfraError::from(apptmail_domain::ChangeDecodeError::InvalidTime {
            value:  "25:99".to_string(),
            source: chrono::NaiveTime::parse_from_str("25:99", "%H:%M").unwrap_err(),
        })
    }
}
