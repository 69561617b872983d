use std::sync::Arc;

use tracing::{info, warn};

use crate::app::config::TargetApp;
use crate::app::coords::{
    CoordinateMap, CoordinatePoint, FIRST_USER_RESULT, FIRST_WORK, LIKE_AREA, SEARCH_BTN,
    SEARCH_EXECUTE, SEARCH_INPUT, USER_TAB,
};
use crate::app::error::AppError;
use crate::app::gestures::HumanInput;
use crate::app::shell::{ShellExecutor, APP_TIMEOUT};

/// Seam between the cycle runner and the device. Production uses `UiActions`;
/// runner tests script outcomes per user.
pub trait UserActions: Send {
    fn search_user(&self, user_id: &str) -> Result<(), AppError>;
    fn enter_user_profile(&self) -> Result<(), AppError>;
    /// Number of likes placed. A completed tap sequence counts as one like;
    /// there is no on-screen verification.
    fn like_latest_work(&self) -> Result<u32, AppError>;
    fn restart_app(&self);
}

/// Fixed tap/delay macros against the named coordinate map. The only genuine
/// error here is a missing named coordinate -- individual taps that miss are
/// invisible and treated as executed.
pub struct UiActions {
    shell: Arc<dyn ShellExecutor>,
    input: HumanInput,
    coords: CoordinateMap,
    target: TargetApp,
    trace_id: String,
}

impl UiActions {
    pub fn new(
        shell: Arc<dyn ShellExecutor>,
        input: HumanInput,
        coords: CoordinateMap,
        target: TargetApp,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            shell,
            input,
            coords,
            target,
            trace_id: trace_id.into(),
        }
    }

    fn point(&self, name: &str) -> Result<CoordinatePoint, AppError> {
        self.coords.point(name).ok_or_else(|| {
            AppError::validation(format!("Coordinate '{name}' is not configured"), &self.trace_id)
        })
    }

    /// `am`/`pm` failures are logged and swallowed like missed taps; the
    /// pipeline carries on and the next restart resets whatever state is left.
    fn run_app_command(&self, args: Vec<String>) {
        if let Err(err) = self.shell.execute(&args, APP_TIMEOUT, &self.trace_id) {
            warn!(trace_id = %self.trace_id, error = %err, command = args.join(" "), "app command failed");
        }
    }

    pub fn open_app(&self) {
        self.run_app_command(vec![
            "am".to_string(),
            "start".to_string(),
            "-n".to_string(),
            self.target.component(),
        ]);
        self.input.delay(3.0, 5.0);
    }

    pub fn force_stop_app(&self) {
        self.run_app_command(vec![
            "am".to_string(),
            "force-stop".to_string(),
            self.target.package.clone(),
        ]);
    }

    /// `pm clear` wipes app data and cache; gives the target a cold start.
    pub fn clear_app_data(&self) {
        self.run_app_command(vec![
            "pm".to_string(),
            "clear".to_string(),
            self.target.package.clone(),
        ]);
        self.input.delay(2.0, 2.0);
    }

    pub fn double_tap_like(&self) -> Result<(), AppError> {
        let like = self.point(LIKE_AREA)?;
        self.input.double_tap(like.x, like.y);
        Ok(())
    }

    /// Scroll the feed one card up. Unused by the per-user pipeline today;
    /// kept for manual coordinate tuning from the CLI.
    pub fn swipe_up(&self) {
        let x = self.coords.screen_width / 2;
        self.input
            .swipe(x, self.coords.swipe_start_y, x, self.coords.swipe_end_y);
    }
}

impl UserActions for UiActions {
    fn search_user(&self, user_id: &str) -> Result<(), AppError> {
        let search_btn = self.point(SEARCH_BTN)?;
        let search_input = self.point(SEARCH_INPUT)?;
        let search_execute = self.point(SEARCH_EXECUTE)?;
        let user_tab = self.point(USER_TAB)?;

        info!(trace_id = %self.trace_id, user_id, "searching user");
        self.input.tap(search_btn.x, search_btn.y);
        self.input.delay(1.0, 2.0);

        self.input.tap(search_input.x, search_input.y);
        self.input.delay(0.5, 1.0);

        self.input.clear_input();
        self.input.input_text(user_id);
        self.input.delay(1.0, 2.0);

        self.input.tap(search_execute.x, search_execute.y);
        self.input.delay(2.0, 4.0);

        self.input.tap(user_tab.x, user_tab.y);
        self.input.delay(1.0, 2.0);
        Ok(())
    }

    fn enter_user_profile(&self) -> Result<(), AppError> {
        let first_result = self.point(FIRST_USER_RESULT)?;
        self.input.tap(first_result.x, first_result.y);
        self.input.delay(3.0, 5.0);
        Ok(())
    }

    fn like_latest_work(&self) -> Result<u32, AppError> {
        let first_work = self.point(FIRST_WORK)?;
        self.input.tap(first_work.x, first_work.y);
        self.input.delay(2.0, 3.0);

        self.double_tap_like()?;
        self.input.delay(2.0, 3.0);

        self.input.press_back();
        self.input.delay(1.0, 2.0);
        Ok(1)
    }

    /// Force-stop, let it settle, relaunch, let it load. State reset between
    /// users; outcomes of the preceding steps do not matter.
    fn restart_app(&self) {
        self.force_stop_app();
        self.input
            .delay(self.input.pacing().restart_stop_wait, self.input.pacing().restart_stop_wait);
        self.open_app();
        self.input.delay(
            self.input.pacing().restart_launch_wait,
            self.input.pacing().restart_launch_wait,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::gestures::Pacing;
    use crate::app::shell::testing::RecordingShell;

    fn actions_with(shell: Arc<RecordingShell>) -> UiActions {
        let input = HumanInput::new(
            Arc::clone(&shell) as Arc<dyn ShellExecutor>,
            Pacing::instant(),
            "test-trace",
        );
        UiActions::new(
            shell,
            input,
            CoordinateMap::default(),
            TargetApp::default(),
            "test-trace",
        )
    }

    #[test]
    fn search_sequence_clears_field_and_types_id_verbatim() {
        let shell = Arc::new(RecordingShell::new());
        actions_with(Arc::clone(&shell))
            .search_user("user with spaces")
            .expect("search");
        let calls = shell.joined_calls();
        // tap, tap, 3 keyevents, text, tap, tap
        assert_eq!(calls.len(), 8);
        assert!(calls[2].contains("KEYCODE_CTRL_LEFT"));
        assert!(calls[4].contains("KEYCODE_DEL"));
        assert_eq!(calls[5], "input text user with spaces");
        assert!(calls[6].starts_with("input tap"));
    }

    #[test]
    fn like_sequence_ends_with_back_key() {
        let shell = Arc::new(RecordingShell::new());
        let likes = actions_with(Arc::clone(&shell))
            .like_latest_work()
            .expect("like");
        assert_eq!(likes, 1);
        let calls = shell.joined_calls();
        // first_work tap, double tap (2), back key
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3], "input keyevent KEYCODE_BACK");
    }

    #[test]
    fn restart_force_stops_then_relaunches() {
        let shell = Arc::new(RecordingShell::new());
        actions_with(Arc::clone(&shell)).restart_app();
        let calls = shell.joined_calls();
        assert_eq!(calls[0], "am force-stop com.ss.android.ugc.aweme");
        assert_eq!(
            calls[1],
            "am start -n com.ss.android.ugc.aweme/.main.MainActivity"
        );
    }

    #[test]
    fn clear_app_data_uses_pm_clear() {
        let shell = Arc::new(RecordingShell::new());
        actions_with(Arc::clone(&shell)).clear_app_data();
        assert_eq!(
            shell.joined_calls(),
            vec!["pm clear com.ss.android.ugc.aweme"]
        );
    }

    #[test]
    fn missing_coordinate_is_the_only_search_error() {
        let shell = Arc::new(RecordingShell::new());
        let input = HumanInput::new(
            Arc::clone(&shell) as Arc<dyn ShellExecutor>,
            Pacing::instant(),
            "test-trace",
        );
        let mut coords = CoordinateMap::default();
        coords.points.remove(USER_TAB);
        let actions = UiActions::new(
            Arc::clone(&shell),
            input,
            coords,
            TargetApp::default(),
            "test-trace",
        );
        let err = actions.search_user("u1").expect_err("missing point");
        assert_eq!(err.code, "ERR_VALIDATION");
        // Coordinates resolve before any tap: nothing reached the shell.
        assert_eq!(shell.call_count(), 0);
    }

    #[test]
    fn failed_taps_do_not_fail_the_sequence() {
        let shell = Arc::new(RecordingShell::failing_on("tap"));
        let actions = actions_with(Arc::clone(&shell));
        actions.search_user("u1").expect("search still succeeds");
        assert!(actions.like_latest_work().is_ok());
    }

    #[test]
    fn swipe_up_uses_configured_anchors() {
        let shell = Arc::new(RecordingShell::new());
        actions_with(Arc::clone(&shell)).swipe_up();
        let calls = shell.joined_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("input swipe 630 2200 630 800"));
    }
}
