//! Two-line status screen for a 16x2 character LCD.
//!
//! The display driver is the platform's business; it only has to implement
//! [`CharDisplay`].

/// Columns of a 1602 character display.
pub const COLS: usize = 16;
/// Rows of a 1602 character display.
pub const ROWS: usize = 2;

/// Minimal character-display interface.
pub trait CharDisplay {
    fn clear(&mut self);

    fn set_cursor(&mut self, col: u8, row: u8);

    fn print(&mut self, text: &str);
}

impl<T: CharDisplay + ?Sized> CharDisplay for &mut T {
    fn clear(&mut self) {
        (**self).clear()
    }

    fn set_cursor(&mut self, col: u8, row: u8) {
        (**self).set_cursor(col, row)
    }

    fn print(&mut self, text: &str) {
        (**self).print(text)
    }
}

/// Lays out status text on a [`CharDisplay`].
pub struct StatusScreen<D: CharDisplay> {
    display: D,
}

impl<D: CharDisplay> StatusScreen<D> {
    pub fn new(display: D) -> Self {
        Self { display }
    }

    /// Clear the screen and write two lines, each cut to [`COLS`].
    pub fn show(&mut self, top: &str, bottom: &str) {
        self.display.clear();
        for (row, line) in [top, bottom].into_iter().enumerate() {
            self.display.set_cursor(0, row as u8);
            self.display.print(&fit_line(line));
        }
    }

    /// Power-on banner.
    pub fn banner(&mut self) {
        self.show("  I2C LCD with ", "  ESP32 DevKit ");
    }

    /// Configuration portal is up.
    pub fn portal(&mut self, ssid: &str, ip: &str) {
        self.show(&format!("AP {}", ssid), ip);
    }

    pub fn connected(&mut self, ip: &str) {
        self.show("WiFi connected", ip);
    }

    pub fn restarting(&mut self) {
        self.show("Connect failed", "Restarting...");
    }

    pub fn into_inner(self) -> D {
        self.display
    }
}

fn fit_line(line: &str) -> String {
    line.chars().take(COLS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Character grid that records what was printed.
    struct Grid {
        cells: [[char; COLS]; ROWS],
        cursor: (usize, usize),
    }

    impl Grid {
        fn new() -> Self {
            Self {
                cells: [[' '; COLS]; ROWS],
                cursor: (0, 0),
            }
        }

        fn row(&self, row: usize) -> String {
            self.cells[row].iter().collect()
        }
    }

    impl CharDisplay for Grid {
        fn clear(&mut self) {
            self.cells = [[' '; COLS]; ROWS];
            self.cursor = (0, 0);
        }

        fn set_cursor(&mut self, col: u8, row: u8) {
            self.cursor = (col as usize, row as usize);
        }

        fn print(&mut self, text: &str) {
            let (mut col, row) = self.cursor;
            for c in text.chars() {
                assert!(col < COLS, "wrote past the end of row {}", row);
                self.cells[row][col] = c;
                col += 1;
            }
            self.cursor = (col, row);
        }
    }

    #[test]
    fn test_banner() {
        let mut screen = StatusScreen::new(Grid::new());
        screen.banner();
        let grid = screen.into_inner();
        assert_eq!(grid.row(0), "  I2C LCD with  ");
        assert_eq!(grid.row(1), "  ESP32 DevKit  ");
    }

    #[test]
    fn test_long_lines_are_cut() {
        let mut screen = StatusScreen::new(Grid::new());
        screen.portal("AVeryLongAccessPointName", "192.168.4.1");
        let grid = screen.into_inner();
        assert_eq!(grid.row(0), "AP AVeryLongAcce");
        assert_eq!(grid.row(1), "192.168.4.1     ");
    }

    #[test]
    fn test_show_clears_previous_text() {
        let mut screen = StatusScreen::new(Grid::new());
        screen.show("0123456789abcdef", "0123456789abcdef");
        screen.connected("10.0.0.2");
        let grid = screen.into_inner();
        assert_eq!(grid.row(0), "WiFi connected  ");
        assert_eq!(grid.row(1), "10.0.0.2        ");
    }
}
