//! Chart payload assembly.
//!
//! Pie charts show the status distribution; line and bar charts show
//! per-day amount sums with `M/D` labels. Label order follows first
//! appearance in the (date-ascending) input.

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::Transaction;

const SERIES_COLOR: &str = "#8b5cf6";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
        }
    }
}

impl Default for ChartType {
    fn default() -> Self {
        ChartType::Bar
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<f64>,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartAxes {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartData {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub data: ChartAxes,
}

pub fn build_chart(chart_type: ChartType, transactions: &[Transaction]) -> ChartData {
    let (labels, values, label) = match chart_type {
        ChartType::Pie => {
            let mut counts: Vec<(String, f64)> = Vec::new();
            for t in transactions {
                match counts.iter_mut().find(|(status, _)| *status == t.tran_status) {
                    Some((_, n)) => *n += 1.0,
                    None => counts.push((t.tran_status.clone(), 1.0)),
                }
            }
            let (labels, values) = counts.into_iter().unzip();
            (labels, values, "Transaction Status Distribution")
        }
        ChartType::Line | ChartType::Bar => {
            let mut groups: Vec<(String, f64)> = Vec::new();
            for t in transactions {
                let Some(label) = day_label(&t.tran_date) else {
                    continue;
                };
                match groups.iter_mut().find(|(day, _)| *day == label) {
                    Some((_, sum)) => *sum += t.tran_amt,
                    None => groups.push((label, t.tran_amt)),
                }
            }
            let (labels, values): (Vec<String>, Vec<f64>) = groups
                .into_iter()
                .map(|(day, sum)| (day, (sum * 100.0).round() / 100.0))
                .unzip();
            (labels, values, "Transaction Amount")
        }
    };

    ChartData {
        chart_type,
        data: ChartAxes {
            labels,
            datasets: vec![ChartDataset {
                label: label.to_string(),
                data: values,
                color: SERIES_COLOR.to_string(),
            }],
        },
    }
}

fn day_label(date: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(date)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d"))
        .ok()?;
    Some(format!("{}/{}", parsed.month(), parsed.day()))
}
