//! Instruction phrasing: turns, distances and transit announcements

use crate::types::angle_diff_deg;

/// Relative direction change between two compass headings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Turn {
    Straight,
    SlightLeft,
    Left,
    SharpLeft,
    SlightRight,
    Right,
    SharpRight,
    Around,
}

impl Turn {
    /// Classify the change from heading `from` to heading `to` (degrees)
    pub fn between(from: f64, to: f64) -> Self {
        let diff = angle_diff_deg(from, to);
        let mag = diff.abs();
        let right = diff > 0.0;
        match mag {
            m if m < 20.0 => Turn::Straight,
            m if m < 45.0 => {
                if right {
                    Turn::SlightRight
                } else {
                    Turn::SlightLeft
                }
            }
            m if m < 120.0 => {
                if right {
                    Turn::Right
                } else {
                    Turn::Left
                }
            }
            m if m < 160.0 => {
                if right {
                    Turn::SharpRight
                } else {
                    Turn::SharpLeft
                }
            }
            _ => Turn::Around,
        }
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            Turn::Straight => "continue straight",
            Turn::SlightLeft => "turn slightly left",
            Turn::Left => "turn left",
            Turn::SharpLeft => "turn sharp left",
            Turn::SlightRight => "turn slightly right",
            Turn::Right => "turn right",
            Turn::SharpRight => "turn sharp right",
            Turn::Around => "turn around",
        }
    }
}

pub fn feet_to_meters(feet: f64) -> i64 {
    (feet * 0.3048).round() as i64
}

/// "30 feet", "1 foot", "9 meters"
pub fn distance_text(feet: f64, meters: bool) -> String {
    if meters {
        match feet_to_meters(feet) {
            1 => "1 meter".to_string(),
            n => format!("{} meters", n),
        }
    } else {
        match feet.round() as i64 {
            1 => "1 foot".to_string(),
            n => format!("{} feet", n),
        }
    }
}

pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn floor_name(floor: i32) -> String {
    let suffix = match (floor.rem_euclid(100), floor.rem_euclid(10)) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{}{} floor", floor, suffix)
}

/// "Walk along the main corridor, 30 feet to Cafe"
pub fn walk_instruction(edge_info: &str, distance: &str, target: &str) -> String {
    if edge_info.is_empty() {
        format!("Walk {} to {}", distance, target)
    } else {
        format!("{}, {} to {}", edge_info, distance, target)
    }
}

/// Announcement for a vertical transit; `custom` overrides the generated text
pub fn transit_instruction(custom: Option<&str>, kind: &str, floor: i32) -> String {
    match custom {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => format!("Take the {} to the {}", kind, floor_name(floor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_use_compass_convention() {
        // east to north is a left turn
        assert_eq!(Turn::between(90.0, 0.0), Turn::Left);
        assert_eq!(Turn::between(90.0, 180.0), Turn::Right);
        assert_eq!(Turn::between(350.0, 5.0), Turn::Straight);
        assert_eq!(Turn::between(0.0, 180.0), Turn::Around);
        assert_eq!(Turn::between(0.0, 30.0), Turn::SlightRight);
        assert_eq!(Turn::between(0.0, 210.0), Turn::SharpLeft);
    }

    #[test]
    fn test_distance_text() {
        assert_eq!(distance_text(30.0, false), "30 feet");
        assert_eq!(distance_text(1.2, false), "1 foot");
        assert_eq!(distance_text(30.0, true), "9 meters");
        assert_eq!(distance_text(3.0, true), "1 meter");
    }

    #[test]
    fn test_floor_names() {
        assert_eq!(floor_name(1), "1st floor");
        assert_eq!(floor_name(2), "2nd floor");
        assert_eq!(floor_name(12), "12th floor");
        assert_eq!(floor_name(23), "23rd floor");
    }

    #[test]
    fn test_instructions() {
        assert_eq!(walk_instruction("", "10 feet", "Cafe"), "Walk 10 feet to Cafe");
        assert_eq!(
            transit_instruction(None, "elevator", 2),
            "Take the elevator to the 2nd floor"
        );
        assert_eq!(transit_instruction(Some("Use lift B"), "elevator", 2), "Use lift B");
        assert_eq!(capitalize("turn left"), "Turn left");
    }
}
