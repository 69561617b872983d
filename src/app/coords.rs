use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named tap targets the action sequences rely on. Every default coordinate
/// map must carry all of these.
pub const SEARCH_BTN: &str = "search_btn";
pub const SEARCH_INPUT: &str = "search_input";
pub const SEARCH_EXECUTE: &str = "search_execute";
pub const USER_TAB: &str = "user_tab";
pub const FIRST_USER_RESULT: &str = "first_user_result";
pub const FIRST_WORK: &str = "first_work";
pub const LIKE_AREA: &str = "like_area";

pub const REQUIRED_POINTS: [&str; 7] = [
    SEARCH_BTN,
    SEARCH_INPUT,
    SEARCH_EXECUTE,
    USER_TAB,
    FIRST_USER_RESULT,
    FIRST_WORK,
    LIKE_AREA,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoordinatePoint {
    pub x: i32,
    pub y: i32,
}

impl CoordinatePoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Screen positions recorded against one reference resolution, plus the two
/// swipe anchors. The map is data, not layout knowledge: the action layer only
/// ever looks points up by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoordinateMap {
    pub points: BTreeMap<String, CoordinatePoint>,
    pub swipe_start_y: i32,
    pub swipe_end_y: i32,
    pub screen_width: i32,
    pub screen_height: i32,
}

impl Default for CoordinateMap {
    fn default() -> Self {
        // Recorded on a 1260x2800 panel.
        let mut points = BTreeMap::new();
        points.insert(SEARCH_BTN.to_string(), CoordinatePoint::new(630, 140));
        points.insert(SEARCH_INPUT.to_string(), CoordinatePoint::new(630, 200));
        points.insert(SEARCH_EXECUTE.to_string(), CoordinatePoint::new(630, 280));
        points.insert(USER_TAB.to_string(), CoordinatePoint::new(230, 350));
        points.insert(
            FIRST_USER_RESULT.to_string(),
            CoordinatePoint::new(630, 450),
        );
        points.insert(FIRST_WORK.to_string(), CoordinatePoint::new(315, 560));
        points.insert(LIKE_AREA.to_string(), CoordinatePoint::new(630, 1400));
        Self {
            points,
            swipe_start_y: 2200,
            swipe_end_y: 800,
            screen_width: 1260,
            screen_height: 2800,
        }
    }
}

impl CoordinateMap {
    pub fn point(&self, name: &str) -> Option<CoordinatePoint> {
        self.points.get(name).copied()
    }

    pub fn missing_points(&self) -> Vec<&'static str> {
        REQUIRED_POINTS
            .iter()
            .filter(|name| !self.points.contains_key(**name))
            .copied()
            .collect()
    }

    /// Uniform linear rescale to a different panel resolution. Applied once to
    /// the whole map; rounding keeps repeated forward/inverse application
    /// within one pixel.
    pub fn rescaled(&self, target_width: i32, target_height: i32) -> Self {
        let sx = f64::from(target_width) / f64::from(self.screen_width.max(1));
        let sy = f64::from(target_height) / f64::from(self.screen_height.max(1));
        let scale = |value: i32, factor: f64| (f64::from(value) * factor).round() as i32;

        let points = self
            .points
            .iter()
            .map(|(name, point)| {
                (
                    name.clone(),
                    CoordinatePoint::new(scale(point.x, sx), scale(point.y, sy)),
                )
            })
            .collect();

        Self {
            points,
            swipe_start_y: scale(self.swipe_start_y, sy),
            swipe_end_y: scale(self.swipe_end_y, sy),
            screen_width: target_width,
            screen_height: target_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_has_every_required_point() {
        let map = CoordinateMap::default();
        assert!(map.missing_points().is_empty());
        assert_eq!(map.point(SEARCH_BTN), Some(CoordinatePoint::new(630, 140)));
        assert_eq!(map.point("not_a_point"), None);
    }

    #[test]
    fn rescale_follows_target_resolution() {
        let map = CoordinateMap::default();
        let scaled = map.rescaled(2520, 1400);
        assert_eq!(scaled.screen_width, 2520);
        assert_eq!(scaled.screen_height, 1400);
        // x doubles, y halves.
        assert_eq!(
            scaled.point(SEARCH_BTN),
            Some(CoordinatePoint::new(1260, 70))
        );
        assert_eq!(scaled.swipe_start_y, 1100);
        assert_eq!(scaled.swipe_end_y, 400);
    }

    #[test]
    fn rescale_then_inverse_returns_original_within_one_pixel() {
        let map = CoordinateMap::default();
        let round_trip = map.rescaled(2400, 1080).rescaled(1260, 2800);
        for (name, original) in &map.points {
            let restored = round_trip.point(name).expect("point survives rescale");
            assert!(
                (restored.x - original.x).abs() <= 1,
                "{name} x drifted: {} vs {}",
                restored.x,
                original.x
            );
            assert!(
                (restored.y - original.y).abs() <= 1,
                "{name} y drifted: {} vs {}",
                restored.y,
                original.y
            );
        }
        assert!((round_trip.swipe_start_y - map.swipe_start_y).abs() <= 1);
        assert!((round_trip.swipe_end_y - map.swipe_end_y).abs() <= 1);
    }
}
