//! Terminal front end: alternate-screen ratatui UI, key handling and the
//! top loop that drives the player at refresh cadence.
//!
//! The loop owns end-of-stream advancement: every turn calls
//! `Player::tick()`, which also drains media-control commands. Rendering
//! reads playlist and mixer state only; it never calls into the decoder.

mod draw;
mod keymap;

use std::io::stdout;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use image::GenericImageView;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::config::{IMAGE_HEIGHT, MAX_IMAGE_HEIGHT, MIN_IMAGE_HEIGHT, UPDATE_RATE};
use crate::error::Error;
use crate::player::{Message, Player};

pub struct UiOptions {
    /// `--no-image`: skip cover-art handling entirely.
    pub no_image: bool,
}

/// What the keyboard currently controls.
pub(crate) enum InputMode {
    Normal,
    /// Live substring filter; the buffer is re-applied on every keystroke.
    Search(String),
    /// Seek-target entry ("mm:ss" or "pct%").
    Seek(String),
}

pub(crate) struct App {
    pub(crate) player: Player,
    pub(crate) mode: InputMode,
    /// First list row on screen.
    pub(crate) first_row: usize,
    pub(crate) image_height: u16,
    pub(crate) no_image: bool,
    /// Next draw should center the cursor.
    pub(crate) center_pending: bool,
    pub(crate) toast: Option<(Message, Instant)>,
    /// Dimensions of the current track's embedded cover, if any.
    pub(crate) cover_size: Option<(u32, u32)>,
    last_cover_track: Option<usize>,
}

impl App {
    fn new(player: Player, options: &UiOptions) -> Self {
        Self {
            player,
            mode: InputMode::Normal,
            first_row: 0,
            image_height: IMAGE_HEIGHT,
            no_image: options.no_image,
            center_pending: false,
            toast: None,
            cover_size: None,
            last_cover_track: None,
        }
    }

    /// Per-frame housekeeping outside of rendering.
    fn refresh(&mut self) {
        // Expire the current toast, then surface the next queued message.
        let expired = self
            .toast
            .as_ref()
            .is_some_and(|(msg, since)| since.elapsed() >= msg.duration);
        if expired {
            self.toast = None;
        }
        if self.toast.is_none()
            && let Some(msg) = self.player.playlist().pop_message()
        {
            self.toast = Some((msg, Instant::now()));
        }

        // Cover art is queried once per track change, off the draw path.
        let selected = self.player.playlist().selected();
        if !self.no_image && self.last_cover_track != Some(selected) {
            self.last_cover_track = Some(selected);
            self.cover_size = self.player.cover_art().map(|img| img.dimensions());
        }
    }

    pub(crate) fn adjust_image_height(&mut self, delta: i16) {
        let h = i32::from(self.image_height) + i32::from(delta);
        self.image_height = (h.max(0) as u16).clamp(MIN_IMAGE_HEIGHT, MAX_IMAGE_HEIGHT);
    }

    pub(crate) fn restore_image_height(&mut self) {
        self.image_height = IMAGE_HEIGHT;
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(stdout(), LeaveAlternateScreen);
}

/// Run the UI until quit or end of playlist, then shut the player down.
pub fn run(player: Player, options: UiOptions) -> Result<(), Error> {
    enable_raw_mode().map_err(|e| Error::terminal(e.to_string()))?;
    execute!(stdout(), EnterAlternateScreen).map_err(|e| Error::terminal(e.to_string()))?;

    // Leave the terminal usable even when we panic mid-draw.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        original_hook(panic_info);
    }));

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend).map_err(|e| Error::terminal(e.to_string()))?;

    let mut app = App::new(player, &options);
    let result = event_loop(&mut terminal, &mut app);

    restore_terminal();
    app.player.shutdown();
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
) -> Result<(), Error> {
    loop {
        app.player.tick();
        if app.player.should_quit() {
            return Ok(());
        }
        app.refresh();

        terminal
            .draw(|frame| draw::draw(frame, app))
            .map_err(|e| Error::terminal(e.to_string()))?;

        if poll_event(UPDATE_RATE)?
            && let Event::Key(key) = event::read().map_err(|e| Error::terminal(e.to_string()))?
            && key.kind != KeyEventKind::Release
        {
            handle_key(app, key);
        }
    }
}

fn poll_event(timeout: Duration) -> Result<bool, Error> {
    event::poll(timeout).map_err(|e| Error::terminal(e.to_string()))
}

fn handle_key(app: &mut App, key: KeyEvent) {
    use crossterm::event::KeyCode;

    match std::mem::replace(&mut app.mode, InputMode::Normal) {
        InputMode::Normal => keymap::dispatch(app, key),
        InputMode::Search(mut buf) => match key.code {
            KeyCode::Esc => app.player.cancel_search(),
            KeyCode::Enter => app.player.commit_search(),
            KeyCode::Backspace => {
                buf.pop();
                app.player.substring_search(&buf);
                app.mode = InputMode::Search(buf);
            }
            KeyCode::Char(c) => {
                buf.push(c);
                app.player.substring_search(&buf);
                app.mode = InputMode::Search(buf);
            }
            _ => app.mode = InputMode::Search(buf),
        },
        InputMode::Seek(mut buf) => match key.code {
            KeyCode::Esc => {}
            KeyCode::Enter => app.player.seek_from_input(&buf),
            KeyCode::Backspace => {
                buf.pop();
                app.mode = InputMode::Seek(buf);
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == ':' || c == '%' => {
                buf.push(c);
                app.mode = InputMode::Seek(buf);
            }
            _ => app.mode = InputMode::Seek(buf),
        },
    }
}
