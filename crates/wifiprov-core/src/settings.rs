//! Persisted device settings.
//!
//! The on-flash format is a flat JSON object:
//!
//! ```json
//! {
//!   "testString": "default value",
//!   "testNumber": 1500,
//!   "testBool": true,
//!   "day": 3
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Maximum number of characters kept in [`DeviceSettings::label`].
pub const MAX_LABEL_CHARS: usize = 49;

/// Settings entered through the configuration portal and kept on flash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Free-form text, at most [`MAX_LABEL_CHARS`] characters.
    #[serde(rename = "testString")]
    pub label: String,

    #[serde(rename = "testNumber")]
    pub count: i32,

    #[serde(rename = "testBool")]
    pub flag: bool,

    /// Index into the weekday table, 0 == Monday.
    ///
    /// Stored raw; use [`DeviceSettings::weekday`] to look it up.
    #[serde(rename = "day")]
    pub selected_day: i32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            label: "default value".to_string(),
            count: 1500,
            flag: true,
            selected_day: 3,
        }
    }
}

impl DeviceSettings {
    /// The selected weekday, clamped into the table.
    ///
    /// An out-of-range index (from a hand-edited file or a tampered portal
    /// submission) is clamped to Monday or Sunday and logged.
    pub fn weekday(&self) -> Weekday {
        Weekday::from_index(self.selected_day).unwrap_or_else(|| {
            let clamped = Weekday::clamped(self.selected_day);
            warn!(
                day = self.selected_day,
                clamped = %clamped,
                "selected day out of range, clamping"
            );
            clamped
        })
    }

    /// Replace the label, keeping at most [`MAX_LABEL_CHARS`] characters.
    pub fn set_label(&mut self, label: &str) {
        self.label = truncate_chars(label, MAX_LABEL_CHARS);
    }
}

/// Truncate on a character boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Day of the week, indexed from Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// All days in table order.
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Look up a day by table index. Returns `None` outside `0..=6`.
    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Look up a day, clamping the index into `0..=6`.
    pub fn clamped(index: i32) -> Self {
        let i = index.clamp(0, Self::ALL.len() as i32 - 1);
        Self::ALL[i as usize]
    }

    /// Table index of this day.
    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
