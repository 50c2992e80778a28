//! Character display that mirrors its contents to the log.

use tracing::info;
use wifiprov_core::display::{COLS, ROWS};
use wifiprov_core::CharDisplay;

/// A 16x2 text buffer. Each `print` logs the row it touched.
pub struct LogDisplay {
    rows: [String; ROWS],
    cursor: (usize, usize),
}

impl LogDisplay {
    pub fn new() -> Self {
        Self {
            rows: [" ".repeat(COLS), " ".repeat(COLS)],
            cursor: (0, 0),
        }
    }

    /// Current contents of a row, padded to the display width. `None` past
    /// the last row.
    pub fn row(&self, row: usize) -> Option<&str> {
        self.rows.get(row).map(String::as_str)
    }
}

impl Default for LogDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl CharDisplay for LogDisplay {
    fn clear(&mut self) {
        for row in &mut self.rows {
            *row = " ".repeat(COLS);
        }
        self.cursor = (0, 0);
    }

    fn set_cursor(&mut self, col: u8, row: u8) {
        self.cursor = (
            (col as usize).min(COLS),
            (row as usize).min(ROWS - 1),
        );
    }

    fn print(&mut self, text: &str) {
        let (col, row) = self.cursor;
        let mut cells: Vec<char> = self.rows[row].chars().collect();
        let mut end = col;
        for (cell, c) in cells.iter_mut().skip(col).zip(text.chars()) {
            *cell = c;
            end += 1;
        }
        self.rows[row] = cells.into_iter().collect();
        self.cursor = (end, row);
        info!(row, "LCD |{}|", self.rows[row]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wifiprov_core::StatusScreen;

    #[test]
    fn test_text_is_clipped_to_width() {
        let mut lcd = LogDisplay::new();
        lcd.set_cursor(10, 1);
        lcd.print("overflowing");
        assert_eq!(lcd.row(1), Some("          overfl"));
        assert_eq!(lcd.row(0), Some(" ".repeat(COLS).as_str()));
    }

    #[test]
    fn test_status_screen_on_log_display() {
        let mut screen = StatusScreen::new(LogDisplay::new());
        screen.connected("127.0.0.1");
        let lcd = screen.into_inner();
        assert_eq!(lcd.row(0), Some("WiFi connected  "));
        assert_eq!(lcd.row(1), Some("127.0.0.1       "));
    }

    #[test]
    fn test_row_past_last_is_none() {
        let lcd = LogDisplay::new();
        assert_eq!(lcd.row(ROWS), None);
        assert_eq!(lcd.row(usize::MAX), None);
    }
}
