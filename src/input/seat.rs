//! Input seat coordination

use log::debug;

use crate::compositor::{OutputId, ViewId};

/// Pointer state owned by a seat
///
/// The cursor image and motion handling live in the input subsystem; the
/// core only needs to invalidate hover state when a transaction retargets
/// what is under the pointer.
#[derive(Debug, Default)]
pub struct Cursor {
    /// Position in layout coordinates
    pub x: f64,
    pub y: f64,
    stale: bool,
}

impl Cursor {
    /// Mark the hover target stale; the next motion re-resolves it
    pub fn update_state(&mut self) {
        self.stale = true;
    }

    /// Whether the hover target must be re-resolved
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Clear the stale flag after re-resolving
    pub fn clear_stale(&mut self) {
        self.stale = false;
    }
}

/// An input seat
#[derive(Debug)]
pub struct Seat {
    /// Seat name
    name: String,
    /// The output keyboard focus follows
    focused_output: Option<OutputId>,
    /// The view holding keyboard focus
    focused_view: Option<ViewId>,
    /// Pointer state
    pub cursor: Cursor,
}

impl Seat {
    /// Create a new seat
    pub fn new(name: String) -> Self {
        Self {
            name,
            focused_output: None,
            focused_view: None,
            cursor: Cursor::default(),
        }
    }

    /// Get the seat name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The output this seat is focused on
    pub fn focused_output(&self) -> Option<OutputId> {
        self.focused_output
    }

    /// Move the seat to an output (or to none)
    pub fn focus_output(&mut self, output: Option<OutputId>) {
        if self.focused_output != output {
            debug!("Seat {} focuses output {:?}", self.name, output);
            self.focused_output = output;
        }
    }

    /// The view holding keyboard focus
    pub fn focused_view(&self) -> Option<ViewId> {
        self.focused_view
    }

    /// Assign keyboard focus
    ///
    /// Focus target selection is the root's business; the seat only records
    /// the result.
    pub fn set_focus(&mut self, view: Option<ViewId>) {
        if self.focused_view != view {
            debug!("Seat {} focuses view {:?}", self.name, view);
            self.focused_view = view;
        }
    }
}

/// The iterable list of seats
#[derive(Debug)]
pub struct SeatManager {
    seats: Vec<Seat>,
}

impl SeatManager {
    /// Create a manager with the default seat
    pub fn new() -> Self {
        Self {
            seats: vec![Seat::new("seat0".to_string())],
        }
    }

    /// Seats in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Seat> {
        self.seats.iter()
    }

    /// Mutable seats in creation order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Seat> {
        self.seats.iter_mut()
    }

    /// Number of seats
    pub fn len(&self) -> usize {
        self.seats.len()
    }

    /// Whether there are no seats
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

impl Default for SeatManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_new() {
        let seat = Seat::new("seat0".to_string());
        assert_eq!(seat.name(), "seat0");
        assert_eq!(seat.focused_output(), None);
        assert_eq!(seat.focused_view(), None);
    }

    #[test]
    fn test_focus_bookkeeping() {
        let mut seat = Seat::new("seat0".to_string());
        seat.focus_output(Some(OutputId(1)));
        seat.set_focus(Some(ViewId(2)));
        assert_eq!(seat.focused_output(), Some(OutputId(1)));
        assert_eq!(seat.focused_view(), Some(ViewId(2)));

        seat.focus_output(None);
        assert_eq!(seat.focused_output(), None);
    }

    #[test]
    fn test_cursor_stale_flag() {
        let mut seat = Seat::new("seat0".to_string());
        assert!(!seat.cursor.is_stale());
        seat.cursor.update_state();
        assert!(seat.cursor.is_stale());
        seat.cursor.clear_stale();
        assert!(!seat.cursor.is_stale());
    }

    #[test]
    fn test_seat_manager_default_seat() {
        let seats = SeatManager::new();
        assert_eq!(seats.len(), 1);
        assert_eq!(seats.iter().next().unwrap().name(), "seat0");
    }
}
