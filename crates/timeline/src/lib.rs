//! Timeline and period generation.
//!
//! A timeline divides a schooling term into `period_N` entries. Holiday
//! periods stay in the map but are inactive with a zero amount; the total is
//! split evenly (rounded up) across the remaining active periods.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use models::{Period, Timeline, TimelineKind, TimelineMode};

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("duration must be at least 1 period")]
    EmptyDuration,

    #[error("all {0} periods are holidays, nothing to bill")]
    NoActivePeriods(u32),

    #[error("holiday period {0} is outside 1..={1}")]
    HolidayOutOfRange(u32, u32),

    #[error("total amount must be greater than zero")]
    ZeroTotalAmount,

    #[error("period date out of calendar range")]
    DateOutOfRange,
}

/// Input for building a new active timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TimelineKind,
    pub duration: u32,
    pub base_amount: u64,
    pub total_amount: u64,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub holidays: Vec<u32>,
    #[serde(default)]
    pub mode: Option<TimelineMode>,
    #[serde(default)]
    pub simulation_date: Option<NaiveDate>,
}

/// Build a timeline from its config, generating all periods.
pub fn generate_timeline(config: &TimelineConfig, now: DateTime<Utc>) -> Result<Timeline, TimelineError> {
    if config.duration == 0 {
        return Err(TimelineError::EmptyDuration);
    }
    if config.total_amount == 0 {
        return Err(TimelineError::ZeroTotalAmount);
    }
    for &holiday in &config.holidays {
        if holiday == 0 || holiday > config.duration {
            return Err(TimelineError::HolidayOutOfRange(holiday, config.duration));
        }
    }

    let active_count = config.duration as u64 - config.holidays.len() as u64;
    if active_count == 0 {
        return Err(TimelineError::NoActivePeriods(config.duration));
    }
    let amount_per_period = config.total_amount.div_ceil(active_count);

    let mut periods = BTreeMap::new();
    for number in 1..=config.duration {
        let is_holiday = config.holidays.contains(&number);
        periods.insert(
            format!("period_{}", number),
            Period {
                number,
                label: period_label(config.kind, config.start_date, number)
                    .ok_or(TimelineError::DateOutOfRange)?,
                amount: if is_holiday { 0 } else { amount_per_period },
                due_date: period_due_date(config.kind, config.start_date, number)
                    .ok_or(TimelineError::DateOutOfRange)?,
                active: !is_holiday,
                is_holiday,
            },
        );
    }

    let id = config
        .id
        .clone()
        .unwrap_or_else(|| format!("timeline_{}", config.start_date.format("%Y_%m_%d")));

    Ok(Timeline {
        id,
        name: config.name.clone(),
        kind: config.kind,
        duration: config.duration,
        base_amount: config.base_amount,
        total_amount: config.total_amount,
        amount_per_period,
        start_date: config.start_date,
        holidays: config.holidays.clone(),
        periods,
        mode: config.mode.unwrap_or(TimelineMode::RealTime),
        simulation_date: config.simulation_date,
        created_at: now,
        updated_at: now,
    })
}

/// Due date of period `number`: yearly timelines are due at the end of the
/// period's month, monthly ones on the day itself, weekly ones at the end
/// of the week.
pub fn period_due_date(kind: TimelineKind, start: NaiveDate, number: u32) -> Option<NaiveDate> {
    match kind {
        TimelineKind::Yearly => {
            let month_start = add_months(start.with_day(1)?, number - 1)?;
            last_day_of_month(month_start)
        }
        TimelineKind::Monthly => start.checked_add_days(Days::new((number - 1) as u64)),
        TimelineKind::Weekly => start.checked_add_days(Days::new(number as u64 * 7 - 1)),
    }
}

/// Human label of period `number`, in Indonesian like the rest of the app.
pub fn period_label(kind: TimelineKind, start: NaiveDate, number: u32) -> Option<String> {
    match kind {
        TimelineKind::Yearly => {
            let month = add_months(start.with_day(1)?, number - 1)?;
            Some(format!("{} {}", month_name(month.month()), month.year()))
        }
        TimelineKind::Monthly => {
            let day = start.checked_add_days(Days::new((number - 1) as u64))?;
            Some(format!(
                "{} {} {}",
                day.day(),
                month_name(day.month()),
                day.year()
            ))
        }
        TimelineKind::Weekly => {
            let week_start = start.checked_add_days(Days::new((number - 1) as u64 * 7))?;
            let week_end = week_start.checked_add_days(Days::new(6))?;
            Some(format!(
                "Minggu {} ({} - {})",
                number,
                week_start.format("%d/%m/%Y"),
                week_end.format("%d/%m/%Y")
            ))
        }
    }
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "Januari",
        2 => "Februari",
        3 => "Maret",
        4 => "April",
        5 => "Mei",
        6 => "Juni",
        7 => "Juli",
        8 => "Agustus",
        9 => "September",
        10 => "Oktober",
        11 => "November",
        12 => "Desember",
        _ => "",
    }
}

fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    let zero_based = date.month0() + months;
    let year = date.year() + (zero_based / 12) as i32;
    let month = zero_based % 12 + 1;
    NaiveDate::from_ymd_opt(year, month, date.day())
}

fn last_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let first = date.with_day(1)?;
    add_months(first, 1)?.pred_opt()
}
