use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    ModifierKeyCode, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyInput {
    Press(String),
    Release(String),
    /// Ctrl+C, or the terminal went away.
    Interrupt,
}

/// Terminal key reader running on its own thread.
///
/// Release events need the keyboard enhancement protocol; terminals without
/// it only report presses, so held keys never stop on their own there.
pub struct KeyReader {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl KeyReader {
    pub fn spawn(tx: Sender<KeyInput>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new()
            .name("key-input".to_string())
            .spawn({
                let stop = stop.clone();
                move || input_loop(tx, stop)
            })?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for KeyReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn input_loop(tx: Sender<KeyInput>, stop: Arc<AtomicBool>) {
    let _terminal = TerminalGuard::new();
    while !stop.load(Ordering::Relaxed) {
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => {
                log::error!("key input poll failed: {err}");
                let _ = tx.send(KeyInput::Interrupt);
                break;
            }
        }
        match event::read() {
            Ok(Event::Key(key)) => {
                let Some(input) = translate(&key) else {
                    continue;
                };
                let interrupt = input == KeyInput::Interrupt;
                if tx.send(input).is_err() || interrupt {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => {
                log::error!("key input read failed: {err}");
                let _ = tx.send(KeyInput::Interrupt);
                break;
            }
        }
    }
}

pub fn translate(key: &KeyEvent) -> Option<KeyInput> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(KeyInput::Interrupt);
    }
    let name = key_name(key.code)?;
    match key.kind {
        KeyEventKind::Press | KeyEventKind::Repeat => Some(KeyInput::Press(name)),
        KeyEventKind::Release => Some(KeyInput::Release(name)),
    }
}

/// Key names as the motion controller expects them.
pub fn key_name(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Char(ch) => return Some(ch.to_lowercase().collect()),
        KeyCode::Left => "left",
        KeyCode::Right => "right",
        KeyCode::Up => "up",
        KeyCode::Down => "down",
        KeyCode::Esc => "escape",
        KeyCode::Modifier(ModifierKeyCode::LeftShift) => "shift_l",
        KeyCode::Modifier(ModifierKeyCode::RightShift) => "shift_r",
        KeyCode::Modifier(ModifierKeyCode::LeftControl) => "control_l",
        KeyCode::Modifier(ModifierKeyCode::RightControl) => "control_r",
        _ => return None,
    };
    Some(name.to_string())
}

struct TerminalGuard {
    enhanced: bool,
}

impl TerminalGuard {
    fn new() -> Self {
        if let Err(err) = terminal::enable_raw_mode() {
            log::warn!("raw mode unavailable: {err}");
        }
        let enhanced = matches!(terminal::supports_keyboard_enhancement(), Ok(true))
            && execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                        | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES
                )
            )
            .is_ok();
        if !enhanced {
            log::warn!("terminal does not report key releases; use Escape to stop motion");
        }
        Self { enhanced }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
    }
}
