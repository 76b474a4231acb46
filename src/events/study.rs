//! Price behaviour around announcement dates.
//!
//! For each event the bars within ±`window_days` calendar days are split
//! into a pre-event side (date < event) and a post-event side
//! (date ≥ event). Returns are recomputed inside the window, so the first
//! bar of the window carries no return.

use std::path::Path;

use chrono::{NaiveDate, TimeDelta};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::data::{parse_date, BarTable, LoaderError};
use crate::error::{DeepTestError, Result};

/// An announcement date with an optional surprise value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub date: NaiveDate,
    #[serde(default)]
    pub surprise: Option<f64>,
}

impl Event {
    pub fn new(date: NaiveDate) -> Self {
        Self { date, surprise: None }
    }
}

/// Statistics of one event window. Returns are in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventImpact {
    pub date: NaiveDate,
    pub surprise: Option<f64>,
    pub pre_avg_return: Option<f64>,
    pub post_avg_return: Option<f64>,
    /// Sample standard deviation; needs two returns.
    pub pre_volatility: Option<f64>,
    pub post_volatility: Option<f64>,
    /// First post-event close over last pre-event close, in percent.
    pub price_reaction: f64,
}

/// Aggregate over all analysed events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_count: usize,
    /// Share of positive reactions, in percent.
    pub win_rate: f64,
    pub avg_reaction: f64,
    pub avg_positive: Option<f64>,
    pub avg_negative: Option<f64>,
    /// Mean reaction over its sample standard deviation.
    pub reaction_sharpe: f64,
    /// Deepest fall of the cumulative reaction from its running peak.
    pub max_drawdown: f64,
}

/// Per-event rows plus the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStudyResult {
    pub window_days: i64,
    pub impacts: Vec<EventImpact>,
    /// Events absent from the table or with an empty side.
    pub skipped: usize,
    pub summary: EventSummary,
}

impl EventStudyResult {
    pub fn report(&self) -> String {
        let s = &self.summary;
        let mut out = format!(
            "Event Study (±{} days): {} events analysed, {} skipped\n\
             Win Rate: {:.1}%\n\
             Avg Reaction: {:.2}%\n\
             Avg Positive: {}\n\
             Avg Negative: {}\n\
             Reaction Sharpe: {:.2}\n\
             Max Drawdown: {:.2}%\n",
            self.window_days,
            s.event_count,
            self.skipped,
            s.win_rate,
            s.avg_reaction,
            fmt_pct(s.avg_positive),
            fmt_pct(s.avg_negative),
            s.reaction_sharpe,
            s.max_drawdown
        );
        for impact in &self.impacts {
            out.push_str(&format!(
                "  {}: reaction {:+.2}%, pre {} / post {}\n",
                impact.date,
                impact.price_reaction,
                fmt_pct(impact.pre_avg_return),
                fmt_pct(impact.post_avg_return)
            ));
        }
        out
    }
}

fn fmt_pct(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{:.2}%", v))
}

/// Event-window analyser.
#[derive(Debug, Clone)]
pub struct EventStudy {
    window_days: i64,
}

impl Default for EventStudy {
    fn default() -> Self {
        Self { window_days: 5 }
    }
}

impl EventStudy {
    pub fn new(window_days: i64) -> Self {
        Self { window_days }
    }

    pub fn analyze(&self, table: &BarTable, events: &[Event]) -> Result<EventStudyResult> {
        if self.window_days <= 0 {
            return Err(DeepTestError::configuration(format!(
                "event window must be positive, got {} days",
                self.window_days
            )));
        }

        let window = TimeDelta::try_days(self.window_days).ok_or_else(|| {
            DeepTestError::configuration(format!("event window of {} days is out of range", self.window_days))
        })?;

        let mut impacts = Vec::new();
        let mut skipped = 0;
        for event in events {
            match self.impact(table, event, window)? {
                Some(impact) => impacts.push(impact),
                None => {
                    debug!("Skipping event {}: not enough bars around it", event.date);
                    skipped += 1;
                }
            }
        }

        info!("Analysed {} events ({} skipped)", impacts.len(), skipped);
        let summary = summarize(&impacts);

        Ok(EventStudyResult {
            window_days: self.window_days,
            impacts,
            skipped,
            summary,
        })
    }

    fn impact(&self, table: &BarTable, event: &Event, window: TimeDelta) -> Result<Option<EventImpact>> {
        if table.bars().binary_search_by_key(&event.date, |b| b.date).is_err() {
            return Ok(None);
        }

        let out_of_range = || {
            DeepTestError::configuration(format!(
                "event window of {} days around {} leaves the calendar",
                self.window_days, event.date
            ))
        };
        let start = event.date.checked_sub_signed(window).ok_or_else(out_of_range)?;
        let end = event
            .date
            .checked_add_signed(window)
            .and_then(|d| d.succ_opt())
            .ok_or_else(out_of_range)?;
        let bars = &table.bars()[table.index_range(start, end)];

        let split = bars.partition_point(|b| b.date < event.date);
        let (pre, post) = bars.split_at(split);
        let (Some(last_pre), Some(first_post)) = (pre.last(), post.first()) else {
            return Ok(None);
        };

        // returns[i] is the return into bars[i + 1]
        let returns: Vec<f64> = bars
            .windows(2)
            .map(|w| (w[1].close / w[0].close - 1.0) * 100.0)
            .collect();
        let pre_returns = &returns[..split.saturating_sub(1)];
        let post_returns = &returns[split - 1..];

        Ok(Some(EventImpact {
            date: event.date,
            surprise: event.surprise,
            pre_avg_return: mean(pre_returns),
            post_avg_return: mean(post_returns),
            pre_volatility: sample_std(pre_returns),
            post_volatility: sample_std(post_returns),
            price_reaction: (first_post.close / last_pre.close - 1.0) * 100.0,
        }))
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().mean())
}

fn sample_std(values: &[f64]) -> Option<f64> {
    (values.len() >= 2).then(|| values.iter().std_dev())
}

fn summarize(impacts: &[EventImpact]) -> EventSummary {
    if impacts.is_empty() {
        return EventSummary::default();
    }

    let reactions: Vec<f64> = impacts.iter().map(|i| i.price_reaction).collect();
    let positive: Vec<f64> = reactions.iter().copied().filter(|r| *r > 0.0).collect();
    let negative: Vec<f64> = reactions.iter().copied().filter(|r| *r <= 0.0).collect();

    let avg_reaction = reactions.iter().sum::<f64>() / reactions.len() as f64;
    let spread = sample_std(&reactions).unwrap_or(0.0);

    let mut cumulative = 0.0;
    let mut peak = f64::NEG_INFINITY;
    let mut max_drawdown = 0.0_f64;
    for r in &reactions {
        cumulative += r;
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.min(cumulative - peak);
    }

    EventSummary {
        event_count: impacts.len(),
        win_rate: positive.len() as f64 / reactions.len() as f64 * 100.0,
        avg_reaction,
        avg_positive: mean(&positive),
        avg_negative: mean(&negative),
        reaction_sharpe: avg_reaction / (spread + 1e-8),
        max_drawdown,
    }
}

/// Load events from a CSV with a `Date` column (or a first column named
/// `date`) and an optional `Surprise`/`Earnings` column.
pub fn load_events(path: &Path) -> Result<Vec<Event>> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.display().to_string()).into());
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(LoaderError::from)?
        .finish()
        .map_err(LoaderError::from)?;

    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let date_name = names
        .iter()
        .find(|n| n.to_lowercase() == "date")
        .ok_or_else(|| LoaderError::MissingColumn("Date".to_string()))?
        .clone();
    let surprise_name = names
        .iter()
        .find(|n| matches!(n.to_lowercase().as_str(), "surprise" | "earnings"))
        .cloned();

    let dates_col = df.column(&date_name).map_err(LoaderError::from)?;
    let dates_col = dates_col.cast(&DataType::String).map_err(LoaderError::from)?;
    let dates = dates_col.str().map_err(LoaderError::from)?;

    let surprises: Vec<Option<f64>> = match &surprise_name {
        Some(name) => {
            let col = df.column(name).map_err(LoaderError::from)?;
            let col = col.cast(&DataType::Float64).map_err(LoaderError::from)?;
            let values = col.f64().map_err(LoaderError::from)?;
            values.into_iter().collect()
        }
        None => vec![None; df.height()],
    };

    let mut events = Vec::with_capacity(df.height());
    for (raw, surprise) in dates.into_iter().zip(surprises) {
        let raw = raw.ok_or_else(|| LoaderError::InvalidData("null event date".to_string()))?;
        events.push(Event {
            date: parse_date(raw)?,
            surprise,
        });
    }
    events.sort_by_key(|e| e.date);
    Ok(events)
}
