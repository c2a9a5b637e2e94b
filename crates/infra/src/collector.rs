//! # ChangeCollector
//!
//! 変更ログから、カーソル以降に記録された予約変更を取得する。
//!
//! ## 契約
//!
//! - `since` より**厳密に後**に記録された変更だけを返す
//! - 記録時刻の昇順で返す（呼び出し側は並べ替えない）
//! - デコードできない行が 1 つでもあれば取得全体をエラーにする（黙って捨てない）

use apptmail_domain::{ChangeLogEntry, ChangeRecord};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::error::InfraError;

/// オンライン予約由来の変更だけを選ぶ `usc` の値
pub const ONLINE_BOOKING_SOURCE: &str = "eT";

const SELECT_CHANGES_SINCE: &str = r#"
    SELECT datlog, action, datum, zeit, pid, txt
    FROM pds7_kallog
    WHERE usc = $1 AND datlog > $2
    ORDER BY datlog ASC
"#;

/// 予約変更コレクタトレイト
#[async_trait]
pub trait ChangeCollector: Send + Sync {
    /// `since` より後に記録された予約変更を記録時刻の昇順で取得する
    async fn fetch(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRecord>, InfraError>;
}

/// 変更ログテーブルの行
#[derive(Debug, sqlx::FromRow)]
struct ChangeLogRow {
    datlog: DateTime<Utc>,
    action: String,
    datum:  NaiveDate,
    zeit:   String,
    pid:    i32,
    txt:    String,
}

impl From<ChangeLogRow> for ChangeLogEntry {
    fn from(row: ChangeLogRow) -> Self {
        Self {
            logged_at:  row.datlog,
            action:     row.action,
            date:       row.datum,
            time:       row.zeit,
            subject_id: row.pid,
            text:       row.txt,
        }
    }
}

/// 行をまとめてデコードする
///
/// 最初に失敗した行のエラーを返し、部分的な結果は返さない。
fn decode_entries(
    entries: impl IntoIterator<Item = ChangeLogEntry>,
) -> Result<Vec<ChangeRecord>, InfraError> {
    entries
        .into_iter()
        .map(|entry| ChangeRecord::try_from(entry).map_err(InfraError::from))
        .collect()
}

/// PostgreSQL 実装の ChangeCollector
#[derive(Debug, Clone)]
pub struct PostgresChangeCollector {
    pool: PgPool,
}

impl PostgresChangeCollector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeCollector for PostgresChangeCollector {
    #[tracing::instrument(skip_all, level = "debug", fields(%since))]
    async fn fetch(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRecord>, InfraError> {
        let rows: Vec<ChangeLogRow> = sqlx::query_as(SELECT_CHANGES_SINCE)
            .bind(ONLINE_BOOKING_SOURCE)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(rows = rows.len(), "変更ログを取得しました");

        decode_entries(rows.into_iter().map(ChangeLogEntry::from))
    }
}

#[cfg(test)]
mod tests {
    use apptmail_domain::change::BOOKING_ACTION;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::InfraErrorKind;

    fn make_row(datlog: i64, action: &str, zeit: &str, txt: &str) -> ChangeLogRow {
        ChangeLogRow {
            datlog: DateTime::from_timestamp(datlog, 0).unwrap(),
            action: action.to_string(),
            datum:  NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            zeit:   zeit.to_string(),
            pid:    17,
            txt:    txt.to_string(),
        }
    }

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresChangeCollector>();
    }

    #[test]
    fn 行の順序を保ったままデコードする() {
        let rows = vec![
            make_row(1_704_067_300, BOOKING_ACTION, "08:00", "Jane Doe, Erstbefund"),
            make_row(1_704_067_400, "eDel", "10:15", "Max Mustermann, Kontrolle"),
        ];

        let records = decode_entries(rows.into_iter().map(ChangeLogEntry::from)).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subject_name(), "Jane Doe");
        assert!(records[0].is_creation());
        assert_eq!(records[1].subject_name(), "Max Mustermann");
        assert!(!records[1].is_creation());
        assert!(records[0].changed_at() < records[1].changed_at());
    }

    #[test]
    fn 不正な行が1つでもあれば全体がエラーになる() {
        let rows = vec![
            make_row(1_704_067_300, BOOKING_ACTION, "08:00", "Jane Doe"),
            make_row(1_704_067_400, BOOKING_ACTION, "8 Uhr", "Max Mustermann"),
        ];

        let result = decode_entries(rows.into_iter().map(ChangeLogEntry::from));

        let err = result.unwrap_err();
        assert!(matches!(err.kind(), InfraErrorKind::Decode(_)));
    }

    #[test]
    fn 行が無ければ空のリストを返す() {
        let records = decode_entries(Vec::new()).unwrap();
        assert!(records.is_empty());
    }
}
