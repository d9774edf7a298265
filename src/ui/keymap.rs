//! Key bindings for normal mode.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::{App, InputMode};
use crate::config::FOCUS_PAGE_STEP;

pub(crate) fn dispatch(app: &mut App, key: KeyEvent) {
    use KeyCode::*;

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match (key.code, ctrl) {
        (Char('q'), false) | (Char('c'), true) => app.player.quit(),

        (Char('/'), false) => {
            app.player.substring_search("");
            app.mode = InputMode::Search(String::new());
        }
        (Char('t'), false) => app.mode = InputMode::Seek(String::new()),

        (Down, _) | (Char('j'), false) => app.player.focus_next(),
        (Up, _) | (Char('k'), false) => app.player.focus_prev(),
        (Home, _) | (Char('g'), false) => app.player.focus_first(),
        (End, _) | (Char('G'), false) => app.player.focus_last(),
        (PageDown, false) | (Char('d'), true) => app.player.focus_down(FOCUS_PAGE_STEP),
        (PageUp, false) | (Char('u'), true) => app.player.focus_up(FOCUS_PAGE_STEP),
        (Char('z'), false) => {
            app.player.focus_selected();
            app.center_pending = true;
        }

        (Enter, _) => app.player.select_focused(),
        (Char('n'), false) => app.player.select_next(),
        (Char('p'), false) => app.player.select_prev(),

        (Char(' '), false) => app.player.toggle_pause(),
        (Char('m'), false) => app.player.toggle_mute(),
        (Char('r'), false) => {
            app.player.cycle_repeat(true);
        }
        (Char('R'), false) => {
            app.player.cycle_repeat(false);
        }

        (Char('9'), false) => app.player.volume_down(0.1),
        (Char('('), false) => app.player.volume_down(0.01),
        (Char('0'), false) => app.player.volume_up(0.1),
        (Char(')'), false) => app.player.volume_up(0.01),

        (Char('['), false) => app.player.change_sample_rate_down(1_000, false),
        (Char('{'), false) => app.player.change_sample_rate_down(100, false),
        (Char(']'), false) => app.player.change_sample_rate_up(1_000, false),
        (Char('}'), false) => app.player.change_sample_rate_up(100, false),
        (Char('\\'), false) => app.player.restore_sample_rate(),

        (Left, _) | (Char('h'), false) => app.player.seek_off(-10_000.0),
        (Char('H'), false) => app.player.seek_off(-1_000.0),
        (Right, _) | (Char('l'), false) => app.player.seek_off(10_000.0),
        (Char('L'), false) => app.player.seek_off(1_000.0),

        (Char('i'), false) => app.adjust_image_height(1),
        (Char('I'), false) => app.adjust_image_height(-1),
        (Char('o'), false) => app.restore_image_height(),

        _ => {}
    }
}
