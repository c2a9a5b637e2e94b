//! # 予約変更
//!
//! 診療所の予約管理システムが書き出す変更ログ（kallog）の 1 行を、
//! 通知メールに載せる予約変更イベントに正規化する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`ChangeLogEntry`] | 変更ログ行 | DB から読み出したままの未検証データ |
//! | [`ChangeRecord`] | 予約変更 | 予約（ブッキング）またはキャンセル 1 件 |
//! | [`SubjectId`] | 患者 ID | 変更ログの `pid` |
//!
//! ## デコード規則
//!
//! - 患者名: 自由記述欄の最初のカンマより前
//! - 予約日時: 日付 + `HH:MM` を [`APPOINTMENT_TIMEZONE`] の壁時計時刻として解釈
//!   （ホストのタイムゾーンには依存しない）
//! - 種別: アクションが [`BOOKING_ACTION`] なら予約、それ以外はキャンセル

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use derive_more::{Display, From};
use thiserror::Error;

/// 予約時刻を解釈するタイムゾーン（診療所の所在地）
pub const APPOINTMENT_TIMEZONE: Tz = chrono_tz::Europe::Vienna;

/// 予約を表す変更ログのアクションコード
pub const BOOKING_ACTION: &str = "eFill";

/// 変更ログの時刻欄のフォーマット
const TIME_OF_DAY_FORMAT: &str = "%H:%M";

/// 患者 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
#[display("{_0}")]
pub struct SubjectId(i32);

impl SubjectId {
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

/// 変更ログ行
///
/// DB の行をそのまま写したもの。[`ChangeRecord::try_from`] で検証・正規化する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogEntry {
    /// 変更が記録された時刻（`datlog`）
    pub logged_at:  DateTime<Utc>,
    /// アクションコード（`action`）
    pub action:     String,
    /// 予約日（`datum`）
    pub date:       NaiveDate,
    /// 予約時刻 `HH:MM`（`zeit`）
    pub time:       String,
    /// 患者 ID（`pid`）
    pub subject_id: i32,
    /// 自由記述欄 `<氏名>, <任意のテキスト>`（`txt`）
    pub text:       String,
}

/// 変更ログ行のデコードエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeDecodeError {
    /// 予約時刻が `HH:MM` として解釈できない
    #[error("予約時刻を解釈できません: {value:?}")]
    InvalidTime {
        value:  String,
        #[source]
        source: chrono::ParseError,
    },

    /// 予約日時がタイムゾーン上に存在しない（夏時間開始時の欠落時間帯）
    #[error("予約日時 {date} {time} はタイムゾーン {timezone} に存在しません")]
    NonexistentLocalTime {
        date:     NaiveDate,
        time:     NaiveTime,
        timezone: Tz,
    },
}

/// 予約変更
///
/// コレクタがポーリングのたびに生成し、レンダリング後に破棄される。
/// 生成後は変更されない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    changed_at:   DateTime<Utc>,
    occurs_at:    DateTime<Tz>,
    subject_id:   SubjectId,
    subject_name: String,
    is_creation:  bool,
}

impl ChangeRecord {
    pub fn new(
        changed_at: DateTime<Utc>,
        occurs_at: DateTime<Tz>,
        subject_id: SubjectId,
        subject_name: String,
        is_creation: bool,
    ) -> Self {
        Self {
            changed_at,
            occurs_at,
            subject_id,
            subject_name,
            is_creation,
        }
    }

    /// 変更が記録された時刻（並び順とカーソル比較に使う）
    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    /// 予約日時（[`APPOINTMENT_TIMEZONE`] のローカル時刻）
    pub fn occurs_at(&self) -> DateTime<Tz> {
        self.occurs_at
    }

    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    /// 予約なら `true`、キャンセルなら `false`
    pub fn is_creation(&self) -> bool {
        self.is_creation
    }
}

impl TryFrom<ChangeLogEntry> for ChangeRecord {
    type Error = ChangeDecodeError;

    fn try_from(entry: ChangeLogEntry) -> Result<Self, Self::Error> {
        let occurs_at = combine_appointment_time(entry.date, &entry.time)?;

        Ok(Self {
            changed_at: entry.logged_at,
            occurs_at,
            subject_id: SubjectId::new(entry.subject_id),
            subject_name: extract_subject_name(&entry.text).to_string(),
            is_creation: entry.action == BOOKING_ACTION,
        })
    }
}

/// 自由記述欄から患者名を取り出す
///
/// 最初のカンマより前を返す。カンマがなければ全体を返す。
pub fn extract_subject_name(text: &str) -> &str {
    text.split_once(',')
        .map_or(text, |(name, _)| name)
        .trim()
}

/// 予約日と `HH:MM` を [`APPOINTMENT_TIMEZONE`] の日時に結合する
///
/// 夏時間終了時の重複時間帯は早い方（夏時間側）に解決する。
pub fn combine_appointment_time(
    date: NaiveDate,
    time_of_day: &str,
) -> Result<DateTime<Tz>, ChangeDecodeError> {
    let time = NaiveTime::parse_from_str(time_of_day.trim(), TIME_OF_DAY_FORMAT).map_err(
        |source| ChangeDecodeError::InvalidTime {
            value: time_of_day.to_string(),
            source,
        },
    )?;

    APPOINTMENT_TIMEZONE
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .ok_or(ChangeDecodeError::NonexistentLocalTime {
            date,
            time,
            timezone: APPOINTMENT_TIMEZONE,
        })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn entry() -> ChangeLogEntry {
        ChangeLogEntry {
            logged_at:  DateTime::from_timestamp(1_704_103_200, 0).unwrap(),
            action:     BOOKING_ACTION.to_string(),
            date:       NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            time:       "09:30".to_string(),
            subject_id: 4711,
            text:       "Jane Doe, Kontrolle".to_string(),
        }
    }

    #[rstest]
    #[case("Jane Doe, extra text", "Jane Doe")]
    #[case("Jane Doe, extra, more", "Jane Doe")]
    #[case("Max Mustermann", "Max Mustermann")]
    #[case(" Erika Musterfrau ,", "Erika Musterfrau")]
    #[case(", nur Text", "")]
    fn test_患者名は最初のカンマより前を取り出す(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(extract_subject_name(text), expected);
    }

    #[rstest]
    fn test_予約アクションはcreationとしてデコードされる(entry: ChangeLogEntry) {
        let record = ChangeRecord::try_from(entry.clone()).unwrap();

        assert!(record.is_creation());
        assert_eq!(record.changed_at(), entry.logged_at);
        assert_eq!(record.subject_id(), SubjectId::new(4711));
        assert_eq!(record.subject_name(), "Jane Doe");
    }

    #[rstest]
    #[case("eDel")]
    #[case("efill")]
    #[case("")]
    fn test_予約以外のアクションはキャンセルとしてデコードされる(
        mut entry: ChangeLogEntry,
        #[case] action: &str,
    ) {
        entry.action = action.to_string();

        let record = ChangeRecord::try_from(entry).unwrap();

        assert!(!record.is_creation());
    }

    #[rstest]
    fn test_予約日時はウィーン時間の壁時計時刻になる(entry: ChangeLogEntry) {
        let record = ChangeRecord::try_from(entry).unwrap();

        // 1 月は CET (UTC+1)
        assert_eq!(
            record.occurs_at().format("%d.%m.%Y %H:%M").to_string(),
            "15.01.2024 09:30"
        );
        assert_eq!(
            record.occurs_at().with_timezone(&Utc),
            DateTime::parse_from_rfc3339("2024-01-15T08:30:00Z").unwrap()
        );
    }

    #[rstest]
    fn test_夏時間の予約日時はcestで解釈される(mut entry: ChangeLogEntry) {
        entry.date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        entry.time = "14:05".to_string();

        let record = ChangeRecord::try_from(entry).unwrap();

        assert_eq!(
            record.occurs_at().with_timezone(&Utc),
            DateTime::parse_from_rfc3339("2024-07-01T12:05:00Z").unwrap()
        );
    }

    #[rstest]
    #[case("9.30")]
    #[case("25:00")]
    #[case("")]
    #[case("abends")]
    fn test_解釈できない時刻はデコードエラーになる(
        mut entry: ChangeLogEntry,
        #[case] time: &str,
    ) {
        entry.time = time.to_string();

        let result = ChangeRecord::try_from(entry);

        assert!(matches!(
            result,
            Err(ChangeDecodeError::InvalidTime { value, .. }) if value == time
        ));
    }

    #[rstest]
    fn test_夏時間開始で存在しない時刻はデコードエラーになる(mut entry: ChangeLogEntry) {
        // 2024-03-31 02:00 → 03:00 に時計が進む
        entry.date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        entry.time = "02:30".to_string();

        let result = ChangeRecord::try_from(entry);

        assert!(matches!(
            result,
            Err(ChangeDecodeError::NonexistentLocalTime { .. })
        ));
    }

    #[rstest]
    fn test_夏時間終了で重複する時刻は早い方に解決される(mut entry: ChangeLogEntry) {
        // 2024-10-27 03:00 → 02:00 に時計が戻る
        entry.date = NaiveDate::from_ymd_opt(2024, 10, 27).unwrap();
        entry.time = "02:30".to_string();

        let record = ChangeRecord::try_from(entry).unwrap();

        assert_eq!(
            record.occurs_at().with_timezone(&Utc),
            DateTime::parse_from_rfc3339("2024-10-27T00:30:00Z").unwrap()
        );
    }

    #[test]
    fn test_subject_idは整数としてそのまま表示される() {
        assert_eq!(SubjectId::from(42).to_string(), "42");
    }
}
