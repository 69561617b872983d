use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::shell::{shell_quote, ShellExecutor};

/// Input-event devices probed in order; the first one that exists wins.
pub const INPUT_DEVICE_CANDIDATES: [&str; 4] = [
    "/dev/input/event0",
    "/dev/input/event1",
    "/dev/input/event2",
    "/dev/input/event3",
];

/// Upper bound on one `getevent` stream; the listener is re-armed per launch.
const LISTEN_WINDOW: Duration = Duration::from_secs(3600);
/// The self test expires when no key arrives within this window.
pub const SELF_TEST_WINDOW: Duration = Duration::from_secs(30);
/// Poll interval while no run is active and events are left unconsumed.
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Matches volume-down key presses in `getevent -l` output (and the raw
/// numeric format, scan code 0x0072). Press only; releases are ignored.
pub struct KeyEventParser {
    re_code: Regex,
    re_press: Regex,
}

impl KeyEventParser {
    pub fn new() -> Self {
        Self {
            re_code: Regex::new(r"\b(?:key_volumedown|volumedown|vol_down|114)\b|\b0072\b")
                .expect("static regex"),
            re_press: Regex::new(r"\bdown\s*$|\b0*1\s*$").expect("static regex"),
        }
    }

    pub fn is_volume_down_press(&self, line: &str) -> bool {
        let lower = line.to_ascii_lowercase();
        let key_event = lower.contains("key") || lower.contains(" 0001 ");
        key_event && self.re_code.is_match(&lower) && self.re_press.is_match(&lower)
    }
}

impl Default for KeyEventParser {
    fn default() -> Self {
        Self::new()
    }
}

/// First accessible device out of the candidate list, checked through the
/// elevated shell (`test -e`). None means key-based cancellation degrades to
/// unavailable; the stop request stays the only cancellation path.
pub fn probe_input_device(shell: &dyn ShellExecutor, trace_id: &str) -> Option<String> {
    for device in INPUT_DEVICE_CANDIDATES {
        let args = vec!["test".to_string(), "-e".to_string(), device.to_string()];
        if shell.execute(&args, Duration::from_secs(2), trace_id).is_ok() {
            return Some(device.to_string());
        }
    }
    None
}

fn spawn_getevent(device: &str, window: Duration) -> std::io::Result<Child> {
    let payload = format!(
        "timeout {} getevent -l {}",
        window.as_secs(),
        shell_quote(device)
    );
    Command::new("su")
        .args(["-c", &payload])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
}

/// Reads key-event lines until a volume-down press, EOF, or a stop request.
/// While no run is active the stream is left alone and the flag is re-checked
/// at `idle_poll` intervals, so stray presses between runs are not consumed
/// as cancellations.
fn watch_lines(
    reader: impl BufRead,
    parser: &KeyEventParser,
    running: &AtomicBool,
    stop: &AtomicBool,
    idle_poll: Duration,
) -> bool {
    let mut lines = reader.lines();
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        if !running.load(Ordering::Relaxed) {
            thread::sleep(idle_poll);
            continue;
        }
        match lines.next() {
            Some(Ok(line)) => {
                if parser.is_volume_down_press(&line) {
                    return true;
                }
            }
            Some(Err(_)) | None => return false,
        }
    }
}

pub struct VolumeKeyListener {
    stop_flag: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
    join: JoinHandle<()>,
}

impl VolumeKeyListener {
    /// Stops the watcher: kills the `getevent` child so a blocked read
    /// unblocks, then joins the thread.
    pub fn stop(self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
        let _ = self.join.join();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Background watcher that clears the shared running flag on a volume-down
/// press. It only ever writes that one boolean; all counters stay with the
/// cycle-runner worker.
pub fn start_volume_key_listener(
    shell: Arc<dyn ShellExecutor>,
    running: Arc<AtomicBool>,
    trace_id: String,
) -> Result<VolumeKeyListener, AppError> {
    let device = probe_input_device(shell.as_ref(), &trace_id).ok_or_else(|| {
        AppError::dependency("No readable input-event device found", &trace_id)
    })?;
    info!(trace_id = %trace_id, device, "volume-key listener armed");

    let stop_flag = Arc::new(AtomicBool::new(false));
    let child_slot: Arc<Mutex<Option<Child>>> = Arc::new(Mutex::new(None));
    let stop_thread = Arc::clone(&stop_flag);
    let child_thread = Arc::clone(&child_slot);

    let join = thread::spawn(move || {
        let mut child = match spawn_getevent(&device, LISTEN_WINDOW) {
            Ok(child) => child,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to spawn getevent");
                return;
            }
        };
        let Some(stdout) = child.stdout.take() else {
            warn!(trace_id = %trace_id, "getevent stdout not captured");
            let _ = child.kill();
            return;
        };
        // Store the child so stop() can kill it even while the reader blocks.
        if let Ok(mut guard) = child_thread.lock() {
            *guard = Some(child);
        }

        let parser = KeyEventParser::new();
        let matched = watch_lines(
            BufReader::new(stdout),
            &parser,
            &running,
            &stop_thread,
            IDLE_POLL,
        );
        if matched {
            info!(trace_id = %trace_id, "volume-down press detected, stopping run");
            running.store(false, Ordering::SeqCst);
        }
        if let Ok(mut guard) = child_thread.lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    });

    Ok(VolumeKeyListener {
        stop_flag,
        child: child_slot,
        join,
    })
}

/// Blocking self test: watches the key stream for up to 30 seconds and
/// reports whether a volume-down press arrived before the window expired.
pub fn run_volume_key_self_test(
    shell: &dyn ShellExecutor,
    trace_id: &str,
) -> Result<bool, AppError> {
    let device = probe_input_device(shell, trace_id).ok_or_else(|| {
        AppError::dependency("No readable input-event device found", trace_id)
    })?;
    info!(trace_id = %trace_id, device, "volume-key self test: press volume-down");

    let mut child = spawn_getevent(&device, SELF_TEST_WINDOW)
        .map_err(|err| AppError::system(format!("Failed to spawn getevent: {err}"), trace_id))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("getevent stdout not captured", trace_id))?;

    let parser = KeyEventParser::new();
    // The shell-side timeout closes the stream when the window expires.
    let matched = watch_lines(
        BufReader::new(stdout),
        &parser,
        &AtomicBool::new(true),
        &AtomicBool::new(false),
        IDLE_POLL,
    );
    let _ = child.kill();
    let _ = child.wait();
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::shell::testing::RecordingShell;
    use std::io::Cursor;

    #[test]
    fn matches_labeled_volume_down_press() {
        let parser = KeyEventParser::new();
        assert!(parser.is_volume_down_press("/dev/input/event1: EV_KEY KEY_VOLUMEDOWN DOWN"));
        assert!(parser.is_volume_down_press("EV_KEY KEY_VOLUMEDOWN DOWN"));
    }

    #[test]
    fn ignores_release_and_other_keys() {
        let parser = KeyEventParser::new();
        assert!(!parser.is_volume_down_press("/dev/input/event1: EV_KEY KEY_VOLUMEDOWN UP"));
        assert!(!parser.is_volume_down_press("/dev/input/event1: EV_KEY KEY_VOLUMEUP DOWN"));
        assert!(!parser.is_volume_down_press("/dev/input/event1: EV_KEY KEY_POWER DOWN"));
        assert!(!parser.is_volume_down_press("add device 1: /dev/input/event3"));
    }

    #[test]
    fn matches_raw_scan_code_press_only() {
        let parser = KeyEventParser::new();
        assert!(parser.is_volume_down_press("/dev/input/event4: 0001 0072 00000001"));
        assert!(!parser.is_volume_down_press("/dev/input/event4: 0001 0072 00000000"));
        assert!(!parser.is_volume_down_press("/dev/input/event4: 0001 0073 00000001"));
    }

    #[test]
    fn probe_returns_first_existing_device() {
        // Fails `test -e` for event0/event1, succeeds from event2 on.
        struct ProbeShell;
        impl ShellExecutor for ProbeShell {
            fn execute(
                &self,
                args: &[String],
                _timeout: Duration,
                trace_id: &str,
            ) -> Result<crate::app::shell::CommandOutput, AppError> {
                if args[2].ends_with("event0") || args[2].ends_with("event1") {
                    return Err(AppError::system("missing", trace_id));
                }
                Ok(crate::app::shell::CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: Some(0),
                })
            }
        }
        let device = probe_input_device(&ProbeShell, "trace").expect("device");
        assert_eq!(device, "/dev/input/event2");
    }

    #[test]
    fn probe_exhausts_candidates() {
        let shell = RecordingShell::failing_on("/dev/input");
        assert!(probe_input_device(&shell, "trace").is_none());
        assert_eq!(shell.call_count(), INPUT_DEVICE_CANDIDATES.len());
    }

    #[test]
    fn watch_reports_match_and_stops_reading() {
        let lines = "add device 1: /dev/input/event3\n\
                     EV_KEY KEY_VOLUMEUP DOWN\n\
                     EV_KEY KEY_VOLUMEDOWN DOWN\n\
                     EV_KEY KEY_VOLUMEDOWN UP\n";
        let matched = watch_lines(
            Cursor::new(lines),
            &KeyEventParser::new(),
            &AtomicBool::new(true),
            &AtomicBool::new(false),
            Duration::from_millis(1),
        );
        assert!(matched);
    }

    #[test]
    fn watch_returns_false_on_stream_end() {
        let matched = watch_lines(
            Cursor::new("EV_KEY KEY_VOLUMEUP DOWN\n"),
            &KeyEventParser::new(),
            &AtomicBool::new(true),
            &AtomicBool::new(false),
            Duration::from_millis(1),
        );
        assert!(!matched);
    }

    #[test]
    fn watch_ignores_events_while_no_run_is_active() {
        let running = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let running_thread = Arc::clone(&running);
        let stop_thread = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            watch_lines(
                Cursor::new("EV_KEY KEY_VOLUMEDOWN DOWN\n"),
                &KeyEventParser::new(),
                &running_thread,
                &stop_thread,
                Duration::from_millis(1),
            )
        });
        // Idle listener never consumes the pending press; stopping it ends
        // the watch without a match.
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        stop.store(true, Ordering::Relaxed);
        assert!(!handle.join().expect("join"));
    }
}
