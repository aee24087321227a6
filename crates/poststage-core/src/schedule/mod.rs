pub mod csv;
pub mod start;

use std::collections::HashMap;

use chrono::{Days, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::record::{ImageRecord, UploadResult};

pub use start::{confirm_start, default_start, parse_start};

/// Scheduling-platform columns, in output order.
pub const COLUMNS: [&str; 34] = [
    "Text",
    "Date",
    "Time",
    "Draft",
    "Facebook",
    "Twitter",
    "LinkedIn",
    "GMB",
    "Instagram",
    "Pinterest",
    "TikTok",
    "Youtube",
    "Picture Url 1",
    "Picture Url 2",
    "Picture Url 3",
    "Picture Url 4",
    "Picture Url 5",
    "Picture Url 6",
    "Picture Url 7",
    "Picture Url 8",
    "Picture Url 9",
    "Picture Url 10",
    "Shortener",
    "Pinterest Board",
    "Pinterest Pin Title",
    "Pinterest Pin Link",
    "Instagram Post Type",
    "Instagram Show Reel On Feed",
    "Youtube Video Title",
    "Youtube Video Type",
    "Youtube Video Privacy",
    "GMB Post Type",
    "Facebook Post Type",
    "Facebook Title",
];

const TRUE: &str = "TRUE";
const FALSE: &str = "FALSE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Facebook,
    Twitter,
    LinkedIn,
    #[serde(rename = "GMB")]
    Gmb,
    Instagram,
    Pinterest,
    TikTok,
    Youtube,
}

impl Platform {
    pub const ALL: [Platform; 8] = [
        Platform::Facebook,
        Platform::Twitter,
        Platform::LinkedIn,
        Platform::Gmb,
        Platform::Instagram,
        Platform::Pinterest,
        Platform::TikTok,
        Platform::Youtube,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Platform::Facebook => "Facebook",
            Platform::Twitter => "Twitter",
            Platform::LinkedIn => "LinkedIn",
            Platform::Gmb => "GMB",
            Platform::Instagram => "Instagram",
            Platform::Pinterest => "Pinterest",
            Platform::TikTok => "TikTok",
            Platform::Youtube => "Youtube",
        }
    }

    /// Case-insensitive lookup by column name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.column().eq_ignore_ascii_case(name))
    }
}

pub fn default_platforms() -> Vec<Platform> {
    vec![Platform::Instagram]
}

/// One output row; values line up with [`COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRow {
    pub key: String,
    pub values: Vec<String>,
}

impl ScheduleRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.values[i].as_str())
    }
}

/// Left-join upload results onto the records by join key. Records without a match keep
/// `url = None`.
pub fn join_uploads(records: &mut [ImageRecord], uploads: &[UploadResult]) {
    let by_key: HashMap<&str, &str> = uploads
        .iter()
        .map(|u| (u.display_filename.as_str(), u.hosted_url.as_str()))
        .collect();
    for record in records.iter_mut() {
        record.url = by_key.get(record.key.as_str()).map(|u| u.to_string());
    }
}

/// Lay the records out one per day from `start`, in input order, at the same time of day.
pub fn build_schedule(records: &[ImageRecord], start: NaiveDateTime, platforms: &[Platform]) -> Vec<ScheduleRow> {
    let time = start.format("%H:%M:%S").to_string();
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let day = start
                .date()
                .checked_add_days(Days::new(i as u64))
                .unwrap_or(start.date());
            let values = COLUMNS
                .iter()
                .map(|column| match *column {
                    "Text" => record.caption.clone(),
                    "Date" => day.format("%Y-%m-%d").to_string(),
                    "Time" => time.clone(),
                    "Picture Url 1" => record.url.clone().unwrap_or_default(),
                    "Instagram Post Type" => "POST".to_string(),
                    "Draft" | "Shortener" => FALSE.to_string(),
                    other => match Platform::from_name(other) {
                        Some(p) if platforms.contains(&p) => TRUE.to_string(),
                        Some(_) => FALSE.to_string(),
                        None => String::new(),
                    },
                })
                .collect();
            ScheduleRow {
                key: record.key.clone(),
                values,
            }
        })
        .collect()
}
