//! # スケジューラ
//!
//! cron 式に従って変更検知ジョブを定期実行する。
//!
//! ## 設計方針
//!
//! - **秒付き cron 式**: `cron` クレートの 6/7 フィールド形式（`秒 分 時 日 月 曜日 [年]`）
//! - **ウィーン時間で評価**: 「平日 8 時」のような式が診療所の壁時計どおりに動くよう、
//!   発火時刻は予約と同じ Europe/Vienna で計算する
//! - **重複しない実行**: ジョブは発火ごとにインラインで実行し、
//!   実行中に次の発火時刻を過ぎた場合は次回分から再開する

use std::str::FromStr;

use apptmail_domain::{change::APPOINTMENT_TIMEZONE, clock::Clock};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;

use crate::usecase::ChangeDetectionJob;

/// 最短間隔を求めるときに調べる発火回数
///
/// cron 式の発火時刻は各フィールドの直積なので、最初の発火日から
/// これだけ見れば日内・日をまたぐ間隔の両方が現れる。
const INTERVAL_SAMPLE_FIRES: usize = 2048;

/// cron 式によるスケジュール
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule:   cron::Schedule,
}

impl CronSchedule {
    /// cron 式をパースする
    pub fn parse(expression: &str) -> Result<Self, cron::error::Error> {
        let schedule = cron::Schedule::from_str(expression)?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// `now` より後の最初の発火時刻
    ///
    /// 夏時間終了時の重複する壁時計時刻では、`cron` は早い方と遅い方の両方を返し、
    /// 遅い方の壁時計時刻から探索を続けるため、UTC では過去の時刻が混ざる。
    /// `now` 以前の時刻は読み飛ばす。
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&APPOINTMENT_TIMEZONE))
            .map(|fire| fire.with_timezone(&Utc))
            .find(|fire| *fire > now)
    }

    /// 実行間隔
    ///
    /// `now` の次の発火時刻と、その次の発火時刻の差。
    /// 発火時刻が 2 回分求まらない場合は `None`。
    pub fn interval(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        let next = self.next_after(now)?;
        let after_next = self.next_after(next)?;
        Some(after_next - next)
    }

    /// 連続する発火時刻の間隔の最小値
    ///
    /// `now` 以降の発火時刻を [`INTERVAL_SAMPLE_FIRES`] 回分調べる。
    /// 不規則な式でも `now` によらず同じ値になる。
    /// 発火時刻が 2 回分求まらない場合は `None`。
    pub fn min_interval(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        // 夏時間終了時は UTC で前後するため並べ直す
        let mut fires: Vec<DateTime<Utc>> = self
            .schedule
            .after(&now.with_timezone(&APPOINTMENT_TIMEZONE))
            .take(INTERVAL_SAMPLE_FIRES)
            .map(|fire| fire.with_timezone(&Utc))
            .collect();
        fires.sort_unstable();
        fires.dedup();

        fires.windows(2).map(|pair| pair[1] - pair[0]).min()
    }

    /// ジョブカーソルの初期値
    ///
    /// 次の発火時刻から 1 間隔分さかのぼった時刻。
    /// 最初のサイクルがちょうど 1 間隔分の変更を対象にするようにする。
    pub fn initial_cursor(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = self.next_after(now)?;
        let interval = self.interval(now)?;
        Some(next - interval)
    }

    /// 停止シグナルを受けるまでジョブを定期実行する
    ///
    /// 発火時刻までの待ち時間は `clock` の現在時刻から計算する。
    /// `stop` に `true` が送られるか送信側がドロップされると、
    /// 次の発火を待たずに戻る。実行中のサイクルは中断しない。
    pub async fn run(
        &self,
        job: &mut ChangeDetectionJob,
        clock: &dyn Clock,
        mut stop: watch::Receiver<bool>,
    ) {
        tracing::info!(schedule = %self.expression, "スケジューラを開始しました");

        let mut last_fire: Option<DateTime<Utc>> = None;
        loop {
            if *stop.borrow_and_update() {
                break;
            }

            // 同じ発火時刻で 2 回実行しないよう、前回の発火時刻より後から探す
            let now = clock.now();
            let from = last_fire.map_or(now, |last| last.max(now));
            let Some(fire_at) = self.next_after(from) else {
                tracing::warn!(schedule = %self.expression, "次回の実行時刻がないためスケジューラを終了します");
                break;
            };
            tracing::debug!(%fire_at, "次回の変更検知を待機します");

            let wait = (fire_at - now).to_std().unwrap_or_default();
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow_and_update() {
                        break;
                    }
                    continue;
                }
                () = tokio::time::sleep(wait) => {}
            }

            last_fire = Some(fire_at);
            job.run().await;
        }

        tracing::info!("スケジューラを停止しました");
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn vienna(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        APPOINTMENT_TIMEZONE
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[rstest]
    #[case("0 */15 * * * *", 15)]
    #[case("0 0 * * * *", 60)]
    #[case("0 30 */2 * * *", 120)]
    fn test_intervalは次の2回の発火時刻の差(#[case] expression: &str, #[case] minutes: i64) {
        let schedule = CronSchedule::parse(expression).unwrap();

        let interval = schedule.interval(vienna(2024, 3, 5, 10, 7)).unwrap();

        assert_eq!(interval, TimeDelta::minutes(minutes));
    }

    #[rstest]
    #[case::just_after_fire(vienna(2024, 3, 5, 10, 5))]
    #[case::just_before_fire(vienna(2024, 3, 5, 10, 55))]
    fn test_min_intervalは起動時刻によらず最短の間隔を返す(#[case] now: DateTime<Utc>) {
        // 毎時 0 分と 10 分（10 分と 50 分の間隔が交互に来る）
        let schedule = CronSchedule::parse("0 0,10 * * * *").unwrap();

        assert_eq!(schedule.min_interval(now), Some(TimeDelta::minutes(10)));
    }

    #[rstest]
    #[case("0 */15 * * * *", 15)]
    #[case("0 0 7-19 * * Mon-Fri", 60)]
    #[case("0 30 */2 * * *", 120)]
    fn test_min_intervalは規則的な式では一定の間隔を返す(
        #[case] expression: &str,
        #[case] minutes: i64,
    ) {
        let schedule = CronSchedule::parse(expression).unwrap();

        let interval = schedule.min_interval(vienna(2024, 4, 8, 10, 7)).unwrap();

        assert_eq!(interval, TimeDelta::minutes(minutes));
    }

    #[test]
    fn test_initial_cursorは次の発火時刻から1間隔さかのぼる() {
        let schedule = CronSchedule::parse("0 0 * * * *").unwrap();

        let cursor = schedule.initial_cursor(vienna(2024, 3, 5, 10, 7)).unwrap();

        assert_eq!(cursor, vienna(2024, 3, 5, 10, 0));
    }

    #[test]
    fn test_発火時刻はウィーン時間で評価する() {
        // 毎日 8:00（ウィーン時間）
        let schedule = CronSchedule::parse("0 0 8 * * *").unwrap();

        let next = schedule.next_after(vienna(2024, 7, 1, 9, 0)).unwrap();

        // 夏時間（UTC+2）なので UTC では 6:00
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 7, 2, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_夏時間終了時も過去の発火時刻を返さない() {
        // 2024-10-27 はウィーンで 03:00 CEST が 02:00 CET に戻る
        let schedule = CronSchedule::parse("0 */15 * * * *").unwrap();
        // 2 回目の 02:20（CET）
        let now = Utc.with_ymd_and_hms(2024, 10, 27, 1, 20, 0).unwrap();

        let next = schedule.next_after(now).unwrap();

        // 2 回目の 02:30（CET）
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 10, 27, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_min_intervalは夏時間終了をまたいでも負にならない() {
        let schedule = CronSchedule::parse("0 */15 * * * *").unwrap();

        let interval = schedule.min_interval(vienna(2024, 10, 20, 12, 0)).unwrap();

        assert_eq!(interval, TimeDelta::minutes(15));
    }

    #[test]
    fn test_不正なcron式はエラーになる() {
        assert!(CronSchedule::parse("every 15 minutes").is_err());
    }

    #[test]
    fn test_expressionは元の式を返す() {
        let schedule = CronSchedule::parse("0 */15 * * * *").unwrap();
        assert_eq!(schedule.expression(), "0 */15 * * * *");
    }
}
