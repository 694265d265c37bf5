//! Cascading statistical aggregation: report → daily → weekly
//!
//! ## Overview
//!
//! Three reducers fold finer-grained records into coarser buckets:
//!
//! ```text
//! SessionReport ──fold──→ DailyRollup ──recompute──→ WeeklyRollup
//!                             │                          │
//!                     running totals/avgs       sums, maxima, deltas
//! ```
//!
//! The daily fold is incremental: each closed report bumps the day's
//! totals and recomputes the running averages. The weekly fold is a full
//! recompute over the week's daily rows (deliberately not incremental), so
//! a fold abandoned after a storage failure self-heals the next time any
//! message for the device arrives.
//!
//! All functions here are pure; the connectors crate owns the surrounding
//! reads and writes.

use crate::records::{
    DailyRollup, DailyWarningStat, SessionReport, WeeklyRollup, WeeklyWarningStat,
};
use crate::time;

/// Concentration band for a flow-state sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowBand {
    /// Flow score <= 54
    Low,
    /// Flow score 55..=75
    Mid,
    /// Flow score > 75
    High,
}

impl FlowBand {
    /// Classify a flow-state sample into its concentration band.
    pub fn classify(value: f32) -> Self {
        if value <= 54.0 {
            FlowBand::Low
        } else if value <= 75.0 {
            FlowBand::Mid
        } else {
            FlowBand::High
        }
    }
}

/// Evaluation award thresholds: gold >= 80, silver 60..=79, bronze < 60.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Award {
    /// Evaluation >= 80
    Gold,
    /// Evaluation 60..=79
    Silver,
    /// Evaluation < 60
    Bronze,
}

impl Award {
    /// Classify a daily average evaluation score.
    pub fn classify(evaluation: f32) -> Self {
        if evaluation >= 80.0 {
            Award::Gold
        } else if evaluation >= 60.0 {
            Award::Silver
        } else {
            Award::Bronze
        }
    }
}

fn guarded_avg(total: f32, count: u32) -> f32 {
    if count == 0 {
        0.0
    } else {
        total / count as f32
    }
}

/// Fold one closed session report into the daily rollup for its end date.
///
/// Maintains the invariant `avg_x == total_x / total_study_nums`, with a
/// zero count treated as average zero. Flow samples are bucketed into
/// low/mid/high concentration counters.
pub fn fold_report(daily: &mut DailyRollup, report: &SessionReport) {
    daily.total_study_nums += 1;
    daily.total_study_time += report.study_time;
    daily.total_concentration += report.concentration;
    daily.total_evaluation += report.evaluation;

    daily.avg_study_time = guarded_avg(daily.total_study_time as f32, daily.total_study_nums);
    daily.avg_concentration = guarded_avg(daily.total_concentration, daily.total_study_nums);
    daily.avg_evaluation = guarded_avg(daily.total_evaluation, daily.total_study_nums);

    for &sample in &report.flow_samples {
        match FlowBand::classify(sample) {
            FlowBand::Low => daily.low_flow_nums += 1,
            FlowBand::Mid => daily.mid_flow_nums += 1,
            FlowBand::High => daily.high_flow_nums += 1,
        }
    }
}

/// Recompute a weekly rollup from scratch over one ISO week's daily rows.
///
/// `prior` is the rollup of the immediately preceding ISO week for the
/// same device; a missing prior week yields zero deltas. The returned
/// rollup is `Unpersisted`; the caller carries over an existing row id
/// when it is replacing one.
pub fn recompute_weekly(
    device_id: &str,
    iso_year: i32,
    iso_week: u32,
    days: &[DailyRollup],
    prior: Option<&WeeklyRollup>,
) -> WeeklyRollup {
    let mut weekly = WeeklyRollup {
        device_id: device_id.to_owned(),
        iso_year,
        iso_week,
        ..WeeklyRollup::default()
    };

    for day in days {
        weekly.study_day_nums += 1;
        weekly.total_study_time += day.total_study_time;

        let weekday = time::iso_weekday(day.day);
        if day.total_study_time >= weekly.max_study_time {
            weekly.max_study_time = day.total_study_time;
            weekly.max_study_time_weekday = weekday;
        }
        if day.avg_concentration >= weekly.max_concentration {
            weekly.max_concentration = day.avg_concentration;
            weekly.max_concentration_weekday = weekday;
        }
        if day.avg_evaluation >= weekly.max_evaluation {
            weekly.max_evaluation = day.avg_evaluation;
            weekly.max_evaluation_weekday = weekday;
        }

        weekly.avg_concentration += day.avg_concentration;
        weekly.avg_evaluation += day.avg_evaluation;

        match Award::classify(day.avg_evaluation) {
            Award::Gold => weekly.gold_nums += 1,
            Award::Silver => weekly.silver_nums += 1,
            Award::Bronze => weekly.bronze_nums += 1,
        }
    }

    weekly.avg_day_study_time =
        guarded_avg(weekly.total_study_time as f32, weekly.study_day_nums);
    weekly.avg_concentration = guarded_avg(weekly.avg_concentration, weekly.study_day_nums);
    weekly.avg_evaluation = guarded_avg(weekly.avg_evaluation, weekly.study_day_nums);

    if let Some(last) = prior {
        weekly.than_last_study_time =
            weekly.total_study_time as i64 - last.total_study_time as i64;
        weekly.than_last_study_days =
            weekly.study_day_nums as i64 - last.study_day_nums as i64;
        weekly.than_last_avg_evaluation = weekly.avg_evaluation - last.avg_evaluation;
    }

    weekly
}

/// Increment a (device, code, day) warning counter.
pub fn fold_warning(daily: &mut DailyWarningStat) {
    daily.count += 1;
}

/// Recompute a weekly warning counter from the week's daily counters.
pub fn recompute_weekly_warnings(
    device_id: &str,
    code: i32,
    iso_year: i32,
    iso_week: u32,
    days: &[DailyWarningStat],
    prior: Option<&WeeklyWarningStat>,
) -> WeeklyWarningStat {
    let count: u32 = days.iter().map(|d| d.count).sum();
    WeeklyWarningStat {
        device_id: device_id.to_owned(),
        code,
        iso_year,
        iso_week,
        count,
        than_last: prior.map_or(0, |last| count as i64 - last.count as i64),
        ..WeeklyWarningStat::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RowId;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn report(study_time: u32, evaluation: f32, flow_samples: Vec<f32>) -> SessionReport {
        SessionReport {
            device_id: "mac1".into(),
            study_time,
            evaluation,
            concentration: 50.0,
            flow_samples,
            ..SessionReport::default()
        }
    }

    #[test]
    fn daily_fold_maintains_running_averages() {
        let mut daily = DailyRollup::seed("mac1", date(2024, 1, 10));

        fold_report(&mut daily, &report(1800, 90.0, vec![40.0, 60.0, 80.0]));
        assert_eq!(daily.total_study_nums, 1);
        assert_eq!(daily.avg_study_time, 1800.0);
        assert_eq!(daily.low_flow_nums, 1);
        assert_eq!(daily.mid_flow_nums, 1);
        assert_eq!(daily.high_flow_nums, 1);

        fold_report(&mut daily, &report(600, 70.0, vec![]));
        assert_eq!(daily.total_study_nums, 2);
        assert_eq!(daily.total_study_time, 2400);
        assert_eq!(daily.avg_study_time, 1200.0);
        assert_eq!(daily.avg_evaluation, 80.0);
    }

    #[test]
    fn flow_band_thresholds() {
        assert_eq!(FlowBand::classify(54.0), FlowBand::Low);
        assert_eq!(FlowBand::classify(55.0), FlowBand::Mid);
        assert_eq!(FlowBand::classify(75.0), FlowBand::Mid);
        assert_eq!(FlowBand::classify(76.0), FlowBand::High);
    }

    #[test]
    fn weekly_over_two_present_days() {
        // 2024-01-08 (Mon) and 2024-01-09 (Tue) of ISO week 2; the third
        // day has no row at all.
        let mut mon = DailyRollup::seed("mac1", date(2024, 1, 8));
        mon.total_study_time = 30;
        let mut tue = DailyRollup::seed("mac1", date(2024, 1, 9));
        tue.total_study_time = 45;

        let weekly = recompute_weekly("mac1", 2024, 2, &[mon, tue], None);

        assert_eq!(weekly.study_day_nums, 2);
        assert_eq!(weekly.total_study_time, 75);
        assert_eq!(weekly.avg_day_study_time, 37.5);
        assert_eq!(weekly.max_study_time, 45);
        assert_eq!(weekly.max_study_time_weekday, 2);
        // No prior week: deltas stay zero
        assert_eq!(weekly.than_last_study_time, 0);
    }

    #[test]
    fn weekly_delta_against_prior_week() {
        let mut day = DailyRollup::seed("mac1", date(2024, 1, 8));
        day.total_study_time = 100;

        let prior = WeeklyRollup {
            device_id: "mac1".into(),
            iso_year: 2024,
            iso_week: 1,
            total_study_time: 80,
            study_day_nums: 3,
            ..WeeklyRollup::default()
        };

        let weekly = recompute_weekly("mac1", 2024, 2, &[day], Some(&prior));
        assert_eq!(weekly.than_last_study_time, 20);
        assert_eq!(weekly.than_last_study_days, -2);
    }

    #[test]
    fn weekly_awards_by_evaluation() {
        let mut gold = DailyRollup::seed("mac1", date(2024, 1, 8));
        gold.avg_evaluation = 85.0;
        let mut silver = DailyRollup::seed("mac1", date(2024, 1, 9));
        silver.avg_evaluation = 60.0;
        let mut bronze = DailyRollup::seed("mac1", date(2024, 1, 10));
        bronze.avg_evaluation = 59.9;

        let weekly = recompute_weekly("mac1", 2024, 2, &[gold, silver, bronze], None);
        assert_eq!(weekly.gold_nums, 1);
        assert_eq!(weekly.silver_nums, 1);
        assert_eq!(weekly.bronze_nums, 1);
    }

    #[test]
    fn empty_week_guards_divide_by_zero() {
        let weekly = recompute_weekly("mac1", 2024, 2, &[], None);
        assert_eq!(weekly.study_day_nums, 0);
        assert_eq!(weekly.avg_day_study_time, 0.0);
        assert_eq!(weekly.id, RowId::Unpersisted);
    }

    #[test]
    fn weekly_warning_counter_and_delta() {
        let mut mon = DailyWarningStat::seed("mac1", 3, date(2024, 1, 8));
        mon.count = 2;
        let mut tue = DailyWarningStat::seed("mac1", 3, date(2024, 1, 9));
        tue.count = 1;

        let prior = WeeklyWarningStat {
            device_id: "mac1".into(),
            code: 3,
            iso_year: 2024,
            iso_week: 1,
            count: 5,
            ..WeeklyWarningStat::default()
        };

        let weekly = recompute_weekly_warnings("mac1", 3, 2024, 2, &[mon, tue], Some(&prior));
        assert_eq!(weekly.count, 3);
        assert_eq!(weekly.than_last, -2);
    }
}
