use egui::Color32;

/// Colour class of a line in the log or loss panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTone {
    #[default]
    Normal,
    Green,
    Yellow,
    Orange,
    Red,
}

impl LineTone {
    pub fn to_color32(self) -> Color32 {
        match self {
            LineTone::Normal => Color32::LIGHT_GRAY,
            LineTone::Green => Color32::GREEN,
            LineTone::Yellow => Color32::YELLOW,
            LineTone::Orange => Color32::from_rgb(255, 165, 0),
            LineTone::Red => Color32::RED,
        }
    }

    /// Tone of a reply line by round-trip time in milliseconds.
    pub fn from_ping_response(
        response_time_ms: Option<f64>,
        green_threshold: u64,
        yellow_threshold: u64,
    ) -> Self {
        match response_time_ms {
            Some(time) if time < green_threshold as f64 => LineTone::Green,
            Some(time) if time < yellow_threshold as f64 => LineTone::Yellow,
            Some(_) => LineTone::Orange,
            None => LineTone::Red,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_thresholds() {
        assert_eq!(LineTone::from_ping_response(Some(20.0), 100, 200), LineTone::Green);
        assert_eq!(LineTone::from_ping_response(Some(100.0), 100, 200), LineTone::Yellow);
        assert_eq!(LineTone::from_ping_response(Some(250.0), 100, 200), LineTone::Orange);
        assert_eq!(LineTone::from_ping_response(None, 100, 200), LineTone::Red);
    }
}
