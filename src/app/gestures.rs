use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::app::shell::{ShellExecutor, INPUT_TIMEOUT};

/// Maximum jitter offset applied to each tap axis, in pixels.
pub const TAP_JITTER: i32 = 10;

/// Wall-clock pacing for gesture and run timing. Random draws always happen
/// (the command shapes stay realistic); `time_scale` only stretches or
/// collapses the sleeps so tests can run the full control flow instantly.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Pause after every tap, seconds.
    pub tap_pause: (f64, f64),
    /// Gap between the two taps of a double tap, seconds.
    pub double_tap_gap: f64,
    /// `input swipe` duration, milliseconds.
    pub swipe_duration_ms: (u64, u64),
    /// Pause after KEYCODE_BACK, seconds.
    pub back_pause: (f64, f64),
    /// Force-stop settle and relaunch waits during an app restart, seconds.
    pub restart_stop_wait: f64,
    pub restart_launch_wait: f64,
    /// Fixed rest between cycles, seconds.
    pub cycle_rest: f64,
    pub time_scale: f64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            tap_pause: (0.1, 0.3),
            double_tap_gap: 0.2,
            swipe_duration_ms: (300, 600),
            back_pause: (0.5, 1.0),
            restart_stop_wait: 3.0,
            restart_launch_wait: 5.0,
            cycle_rest: 30.0,
            time_scale: 1.0,
        }
    }
}

impl Pacing {
    /// Full control flow, zero wall-clock time. Test-only pacing.
    pub fn instant() -> Self {
        Self {
            time_scale: 0.0,
            ..Self::default()
        }
    }

    pub fn sleep_secs(&self, seconds: f64) {
        let scaled = seconds * self.time_scale;
        if scaled > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(scaled));
        }
    }
}

/// Jitter clamp: offsets may push a coordinate past the screen edge, never
/// below zero.
pub fn jittered(value: i32, offset: i32) -> i32 {
    (value + offset).max(0)
}

/// Issues `input ...` commands with randomized offsets and pauses so repeated
/// actions do not land on identical pixels at identical intervals.
pub struct HumanInput {
    shell: Arc<dyn ShellExecutor>,
    pacing: Pacing,
    trace_id: String,
}

impl HumanInput {
    pub fn new(
        shell: Arc<dyn ShellExecutor>,
        pacing: Pacing,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            shell,
            pacing,
            trace_id: trace_id.into(),
        }
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// A failed command is logged and swallowed: a missed tap is not
    /// detectable on screen and must not abort the sequence it belongs to.
    fn run_input(&self, args: Vec<String>) {
        if let Err(err) = self.shell.execute(&args, INPUT_TIMEOUT, &self.trace_id) {
            warn!(trace_id = %self.trace_id, error = %err, command = args.join(" "), "input command failed");
        }
    }

    pub fn tap(&self, x: i32, y: i32) {
        let mut rng = rand::thread_rng();
        let actual_x = jittered(x, rng.gen_range(-TAP_JITTER..=TAP_JITTER));
        let actual_y = jittered(y, rng.gen_range(-TAP_JITTER..=TAP_JITTER));
        self.run_input(vec![
            "input".to_string(),
            "tap".to_string(),
            actual_x.to_string(),
            actual_y.to_string(),
        ]);
        let pause = rng.gen_range(self.pacing.tap_pause.0..=self.pacing.tap_pause.1);
        self.pacing.sleep_secs(pause);
    }

    pub fn double_tap(&self, x: i32, y: i32) {
        self.tap(x, y);
        self.pacing.sleep_secs(self.pacing.double_tap_gap);
        self.tap(x, y);
    }

    pub fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32) {
        let duration_ms = rand::thread_rng()
            .gen_range(self.pacing.swipe_duration_ms.0..=self.pacing.swipe_duration_ms.1);
        self.run_input(vec![
            "input".to_string(),
            "swipe".to_string(),
            x1.to_string(),
            y1.to_string(),
            x2.to_string(),
            y2.to_string(),
            duration_ms.to_string(),
        ]);
    }

    pub fn input_text(&self, text: &str) {
        // Passed verbatim; SuShell's quoting is the only escaping layer.
        self.run_input(vec![
            "input".to_string(),
            "text".to_string(),
            text.to_string(),
        ]);
    }

    pub fn key_event(&self, code: &str) {
        self.run_input(vec![
            "input".to_string(),
            "keyevent".to_string(),
            code.to_string(),
        ]);
    }

    /// Select-all plus delete; clears whatever the focused field holds.
    pub fn clear_input(&self) {
        self.key_event("KEYCODE_CTRL_LEFT");
        self.key_event("KEYCODE_A");
        self.key_event("KEYCODE_DEL");
    }

    pub fn press_back(&self) {
        self.key_event("KEYCODE_BACK");
        self.delay(self.pacing.back_pause.0, self.pacing.back_pause.1);
    }

    /// Sleeps a uniformly random duration in [min, max] seconds.
    pub fn delay(&self, min: f64, max: f64) {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let duration = if lo < hi {
            rand::thread_rng().gen_range(lo..hi)
        } else {
            lo
        };
        self.pacing.sleep_secs(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::shell::testing::RecordingShell;

    fn input(shell: Arc<RecordingShell>) -> HumanInput {
        HumanInput::new(shell, Pacing::instant(), "test-trace")
    }

    #[test]
    fn jitter_clamp_never_goes_negative() {
        for value in 0..10 {
            for offset in -TAP_JITTER..=TAP_JITTER {
                assert!(jittered(value, offset) >= 0);
            }
        }
        assert_eq!(jittered(0, -10), 0);
        assert_eq!(jittered(5, -10), 0);
        assert_eq!(jittered(100, 10), 110);
    }

    #[test]
    fn tap_stays_within_jitter_window() {
        let shell = Arc::new(RecordingShell::new());
        let human = input(Arc::clone(&shell));
        for _ in 0..50 {
            human.tap(630, 140);
        }
        for call in shell.calls.lock().expect("calls").iter() {
            assert_eq!(call[0], "input");
            assert_eq!(call[1], "tap");
            let x: i32 = call[2].parse().expect("x");
            let y: i32 = call[3].parse().expect("y");
            assert!((x - 630).abs() <= TAP_JITTER, "x {x} outside window");
            assert!((y - 140).abs() <= TAP_JITTER, "y {y} outside window");
        }
    }

    #[test]
    fn double_tap_issues_two_taps() {
        let shell = Arc::new(RecordingShell::new());
        input(Arc::clone(&shell)).double_tap(630, 1400);
        assert_eq!(shell.call_count(), 2);
    }

    #[test]
    fn swipe_duration_is_bounded() {
        let shell = Arc::new(RecordingShell::new());
        let human = input(Arc::clone(&shell));
        for _ in 0..20 {
            human.swipe(630, 2200, 630, 800);
        }
        for call in shell.calls.lock().expect("calls").iter() {
            assert_eq!(&call[..2], &["input".to_string(), "swipe".to_string()]);
            let duration: u64 = call[6].parse().expect("duration");
            assert!((300..=600).contains(&duration));
        }
    }

    #[test]
    fn clear_input_sends_select_all_then_delete() {
        let shell = Arc::new(RecordingShell::new());
        input(Arc::clone(&shell)).clear_input();
        let calls = shell.joined_calls();
        assert_eq!(
            calls,
            vec![
                "input keyevent KEYCODE_CTRL_LEFT",
                "input keyevent KEYCODE_A",
                "input keyevent KEYCODE_DEL",
            ]
        );
    }

    #[test]
    fn failed_command_is_swallowed() {
        let shell = Arc::new(RecordingShell::failing_on("tap"));
        let human = input(Arc::clone(&shell));
        human.tap(10, 10);
        human.input_text("still runs");
        assert_eq!(shell.call_count(), 2);
    }
}
