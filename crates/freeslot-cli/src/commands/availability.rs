//! Availability command.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

use freeslot_core::{DailyFreeSlots, DaySpan};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Which days to report.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaySelection {
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DaySelection {
    /// Resolves the selection against `today`.
    pub fn span(&self, today: NaiveDate) -> ClientResult<DaySpan> {
        match (self.date, self.from, self.to) {
            (Some(date), _, _) => Ok(DaySpan::single(date)),
            (None, Some(from), Some(to)) => Ok(DaySpan::new(from, to)?),
            (None, None, None) => Ok(DaySpan::single(today)),
            _ => Err(ClientError::config("--from and --to must be given together")),
        }
    }
}

/// Prints free slots for the selected days.
pub async fn run(
    config: &ClientConfig,
    zone: Tz,
    selection: DaySelection,
    min_minutes: Option<i64>,
    json: bool,
) -> ClientResult<()> {
    let today = Utc::now().with_timezone(&zone).date_naive();
    let span = selection.span(today)?;

    let service = super::service(config, zone)?;
    let mut slots = service.availability(&span).await?;
    if let Some(minutes) = min_minutes {
        retain_fitting(&mut slots, minutes);
    }

    if json {
        println!("{}", render_json(&slots)?);
    } else {
        print!("{}", render_text(&slots, zone));
    }
    Ok(())
}

/// Drops slots shorter than `minutes`, keeping every day.
pub fn retain_fitting(slots: &mut DailyFreeSlots, minutes: i64) {
    for day in slots.values_mut() {
        day.retain(|slot| slot.fits(minutes));
    }
}

/// Renders slots as a plain-text agenda.
pub fn render_text(slots: &DailyFreeSlots, zone: Tz) -> String {
    let mut out = String::new();
    for (date, day) in slots {
        out.push_str(&format!("{} ({})\n", date.format("%a %Y-%m-%d"), zone.name()));
        if day.is_empty() {
            out.push_str("  no free time\n");
        }
        for slot in day {
            out.push_str(&format!(
                "  {} - {}  {}\n",
                slot.start.format("%H:%M"),
                slot.end.format("%H:%M"),
                format_minutes(slot.duration_minutes)
            ));
        }
    }
    out
}

/// Renders slots as a JSON object keyed by `YYYY-MM-DD`.
pub fn render_json(slots: &DailyFreeSlots) -> ClientResult<String> {
    serde_json::to_string_pretty(slots)
        .map_err(|e| ClientError::config(format!("failed to encode JSON: {}", e)))
}

fn format_minutes(minutes: i64) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h{:02}m", h, m),
    }
}
