//! Playlist controller: track list, two-stage filter indices, cursor and
//! selection motion, repeat-policy advancement and the user-message queue.
//!
//! Index spaces: `visible` is the current view (what the UI lists),
//! `matched` is the working refinement of an in-progress substring filter.
//! Both hold indices into `tracks`, strictly sorted, with
//! `matched ⊆ visible`. `focused` is a cursor position *within* `visible`;
//! `selected` is a track index (what is actually playing), independent of
//! the cursor.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::state::TrackInfo;
use crate::config::{MESSAGE_DURATION, MESSAGE_QUEUE_CAP};

/// End-of-stream advancement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    None,
    Track,
    Playlist,
}

impl RepeatMode {
    pub fn cycled(self, forward: bool) -> Self {
        match (self, forward) {
            (RepeatMode::None, true) => RepeatMode::Track,
            (RepeatMode::Track, true) => RepeatMode::Playlist,
            (RepeatMode::Playlist, true) => RepeatMode::None,
            (RepeatMode::None, false) => RepeatMode::Playlist,
            (RepeatMode::Track, false) => RepeatMode::None,
            (RepeatMode::Playlist, false) => RepeatMode::Track,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RepeatMode::None => "None",
            RepeatMode::Track => "Track",
            RepeatMode::Playlist => "Playlist",
        }
    }
}

/// One playlist entry: the path plus its display basename.
#[derive(Debug, Clone)]
pub struct Track {
    pub path: PathBuf,
    pub name: String,
}

impl Track {
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Notify,
    Warning,
    Error,
}

/// A user-visible message with its display duration.
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
    pub duration: Duration,
}

#[derive(Default)]
struct MessageQueue {
    queue: VecDeque<Message>,
    last_text: String,
    last_pushed: Option<Instant>,
}

/// What end-of-stream advancement decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Play this track index next.
    Play(usize),
    /// Last track with repeat None: stop after draining.
    End,
}

pub struct Playlist {
    tracks: Vec<Track>,
    /// The current view; indices into `tracks`, strictly sorted.
    visible: Vec<u32>,
    /// Working set of the in-progress filter; subset of `visible`.
    matched: Vec<u32>,
    /// Cursor position within `visible`.
    focused: usize,
    /// Track index currently being decoded/played.
    selected: usize,
    repeat: RepeatMode,
    messages: Mutex<MessageQueue>,
    info: TrackInfo,
    longest_name: usize,
    end_reached: bool,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        let longest_name = tracks.iter().map(|t| t.name.chars().count()).max().unwrap_or(0);
        let all: Vec<u32> = (0..tracks.len() as u32).collect();
        Self {
            tracks,
            visible: all.clone(),
            matched: all,
            focused: 0,
            selected: 0,
            repeat: RepeatMode::default(),
            messages: Mutex::new(MessageQueue::default()),
            info: TrackInfo::default(),
            longest_name,
            end_reached: false,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn visible_indices(&self) -> &[u32] {
        &self.visible
    }

    pub fn search_indices(&self) -> &[u32] {
        &self.matched
    }

    pub fn focused(&self) -> usize {
        self.focused
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn set_selected(&mut self, index: usize) {
        if index < self.tracks.len() {
            self.selected = index;
        }
    }

    pub fn selected_track(&self) -> Option<&Track> {
        self.tracks.get(self.selected)
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    pub fn cycle_repeat(&mut self, forward: bool) -> RepeatMode {
        self.repeat = self.repeat.cycled(forward);
        self.repeat
    }

    pub fn end_reached(&self) -> bool {
        self.end_reached
    }

    pub fn set_end_reached(&mut self) {
        self.end_reached = true;
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    /// Widest track name in chars, for sizing the filter input.
    pub fn longest_name(&self) -> usize {
        self.longest_name
    }

    /// Restore both index buffers to the full, unfiltered playlist.
    pub fn reset_indices(&mut self) {
        self.visible = (0..self.tracks.len() as u32).collect();
        self.matched = self.visible.clone();
    }

    // --- cursor motion ---------------------------------------------------

    pub fn focus(&mut self, i: isize) {
        if self.visible.is_empty() {
            self.focused = 0;
            return;
        }
        self.focused = i.clamp(0, self.visible.len() as isize - 1) as usize;
    }

    pub fn focus_next(&mut self) {
        if !self.visible.is_empty() {
            self.focused = (self.focused + 1) % self.visible.len();
        }
    }

    pub fn focus_prev(&mut self) {
        if !self.visible.is_empty() {
            self.focused = self.focused.checked_sub(1).unwrap_or(self.visible.len() - 1);
        }
    }

    pub fn focus_first(&mut self) {
        self.focus(0);
    }

    pub fn focus_last(&mut self) {
        self.focus(self.visible.len() as isize - 1);
    }

    pub fn focus_up(&mut self, step: usize) {
        self.focus(self.focused as isize - step as isize);
    }

    pub fn focus_down(&mut self, step: usize) {
        self.focus(self.focused as isize + step as isize);
    }

    /// Snap the cursor to the playing track. A selection that was filtered
    /// out restores the default indices first.
    pub fn focus_selected(&mut self) {
        let pos = self.position_in_visible(self.selected);
        self.focus(pos as isize);
    }

    /// Track index under the cursor.
    pub fn focused_track(&self) -> Option<usize> {
        self.visible.get(self.focused).map(|&i| i as usize)
    }

    // --- selection helpers ----------------------------------------------

    fn position_in_visible(&mut self, track: usize) -> usize {
        if let Some(pos) = self.visible.iter().position(|&i| i as usize == track) {
            return pos;
        }
        self.reset_indices();
        self.visible
            .iter()
            .position(|&i| i as usize == track)
            .unwrap_or(0)
    }

    fn position_in_matched(&mut self, track: usize) -> usize {
        if let Some(pos) = self.matched.iter().position(|&i| i as usize == track) {
            return pos;
        }
        self.reset_indices();
        self.matched
            .iter()
            .position(|&i| i as usize == track)
            .unwrap_or(0)
    }

    /// Adjacent track for manual next/prev, cycling through the filter's
    /// working set.
    pub fn neighbor(&mut self, track: usize, forward: bool) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        if self.matched.is_empty() {
            self.reset_indices();
        }
        // The position lookup may itself reset the indices, so the length
        // must be read after it.
        let pos = self.position_in_matched(track);
        let len = self.matched.len();
        let next = if forward {
            (pos + 1) % len
        } else {
            pos.checked_sub(1).unwrap_or(len - 1)
        };
        Some(self.matched[next] as usize)
    }

    /// End-of-stream advancement over the visible view, governed by the
    /// repeat policy.
    pub fn advance_after(&mut self, track: usize) -> Advance {
        if self.tracks.is_empty() {
            return Advance::End;
        }
        if self.visible.is_empty() {
            self.reset_indices();
        }

        let cur = self.position_in_visible(track);
        match self.repeat {
            RepeatMode::Track => Advance::Play(self.visible[cur] as usize),
            _ => {
                let next = cur + 1;
                if next >= self.visible.len() {
                    if self.repeat == RepeatMode::Playlist {
                        Advance::Play(self.visible[0] as usize)
                    } else {
                        Advance::End
                    }
                } else {
                    Advance::Play(self.visible[next] as usize)
                }
            }
        }
    }

    // --- filtering -------------------------------------------------------

    /// Refresh the working set from a live query: case-insensitive substring
    /// containment over the visible names. The empty query restores the
    /// working set to the whole view.
    pub fn filter(&mut self, query: &str) {
        if query.is_empty() {
            self.matched = self.visible.clone();
            return;
        }
        let needle = query.to_uppercase();
        let tracks = &self.tracks;
        self.matched = self
            .visible
            .iter()
            .copied()
            .filter(|&i| tracks[i as usize].name.to_uppercase().contains(&needle))
            .collect();
    }

    /// Commit the working set as the new view, narrowing the next query.
    pub fn commit_filter(&mut self) {
        self.visible = self.matched.clone();
        self.focus(self.focused as isize);
    }

    // --- metadata snapshot ----------------------------------------------

    /// Store the per-track metadata snapshot, falling back to the file name
    /// when the title tag is empty.
    pub fn update_info(&mut self, mut info: TrackInfo) {
        if info.title.is_empty()
            && let Some(track) = self.selected_track()
        {
            info.title = track.name.clone();
        }
        self.info = info;
    }

    // --- message queue ---------------------------------------------------

    /// Queue a user-visible message. An identical message arriving within
    /// its display window is suppressed; a full queue drops its oldest
    /// entry.
    pub fn push_message(&mut self, kind: MessageKind, text: impl Into<String>) {
        let text = text.into();
        let mut q = self.messages.lock();

        let duplicate = q.last_text == text
            && q.last_pushed
                .is_some_and(|at| at.elapsed() < MESSAGE_DURATION);
        if duplicate {
            return;
        }

        if q.queue.len() >= MESSAGE_QUEUE_CAP {
            q.queue.pop_front();
        }
        q.queue.push_back(Message {
            kind,
            text: text.clone(),
            duration: MESSAGE_DURATION,
        });
        q.last_text = text;
        q.last_pushed = Some(Instant::now());
    }

    pub fn pop_message(&self) -> Option<Message> {
        self.messages.lock().queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn playlist(names: &[&str]) -> Playlist {
        Playlist::new(
            names
                .iter()
                .map(|n| Track::new(PathBuf::from(format!("/music/{n}"))))
                .collect(),
        )
    }

    fn assert_invariants(pl: &Playlist) {
        assert!(pl.matched.len() <= pl.visible.len());
        assert!(pl.visible.len() <= pl.len());
        assert!(pl.visible.windows(2).all(|w| w[0] < w[1]));
        assert!(pl.matched.windows(2).all(|w| w[0] < w[1]));
        assert!(pl.matched.iter().all(|i| pl.visible.contains(i)));
    }

    #[test]
    fn defaults_cover_the_whole_list() {
        let pl = playlist(&["a.mp3", "b.mp3", "c.mp3"]);
        assert_eq!(pl.visible_indices(), &[0, 1, 2]);
        assert_eq!(pl.search_indices(), &[0, 1, 2]);
        assert_invariants(&pl);
    }

    #[test]
    fn filter_narrowing_and_commit() {
        let mut pl = playlist(&["alpha.mp3", "beta.mp3", "gamma.mp3", "alphabet.mp3"]);

        pl.filter("alp");
        assert_eq!(pl.search_indices(), &[0, 3]);
        pl.commit_filter();
        assert_eq!(pl.visible_indices(), &[0, 3]);

        pl.filter("bet");
        assert_eq!(pl.search_indices(), &[3]);
        pl.commit_filter();
        assert_eq!(pl.visible_indices(), &[3]);
        assert_eq!(pl.focused_track(), Some(3));
        assert_invariants(&pl);
    }

    #[test]
    fn empty_query_restores_working_set() {
        let mut pl = playlist(&["alpha.mp3", "beta.mp3"]);
        pl.filter("alp");
        assert_eq!(pl.search_indices(), &[0]);
        pl.filter("");
        assert_eq!(pl.search_indices(), pl.visible_indices());
    }

    #[test]
    fn filter_is_case_insensitive() {
        let mut pl = playlist(&["Ärzte Live.flac", "other.flac"]);
        pl.filter("ärz");
        assert_eq!(pl.search_indices(), &[0]);
        pl.filter("ÄRZ");
        assert_eq!(pl.search_indices(), &[0]);
    }

    #[test]
    fn cursor_wraps_and_clamps() {
        let mut pl = playlist(&["a", "b", "c"]);
        pl.focus_prev();
        assert_eq!(pl.focused(), 2);
        pl.focus_next();
        assert_eq!(pl.focused(), 0);
        pl.focus_down(100);
        assert_eq!(pl.focused(), 2);
        pl.focus_up(100);
        assert_eq!(pl.focused(), 0);
        pl.focus(-5);
        assert_eq!(pl.focused(), 0);
    }

    #[test]
    fn advancement_follows_repeat_policy() {
        let mut pl = playlist(&["a", "b", "c"]);

        pl.set_repeat(RepeatMode::None);
        assert_eq!(pl.advance_after(0), Advance::Play(1));
        assert_eq!(pl.advance_after(2), Advance::End);

        pl.set_repeat(RepeatMode::Track);
        assert_eq!(pl.advance_after(1), Advance::Play(1));

        pl.set_repeat(RepeatMode::Playlist);
        assert_eq!(pl.advance_after(2), Advance::Play(0));
    }

    #[test]
    fn neighbor_cycles_the_narrowed_set() {
        let mut pl = playlist(&["alpha", "beta", "alpine", "gamma"]);
        pl.filter("alp");
        assert_eq!(pl.search_indices(), &[0, 2]);
        assert_eq!(pl.neighbor(0, true), Some(2));
        assert_eq!(pl.neighbor(2, true), Some(0));
        assert_eq!(pl.neighbor(0, false), Some(2));
    }

    #[test]
    fn focus_selected_restores_defaults_when_filtered_out() {
        let mut pl = playlist(&["alpha", "beta", "gamma"]);
        pl.set_selected(1);
        pl.filter("alpha");
        pl.commit_filter();
        assert_eq!(pl.visible_indices(), &[0]);

        pl.focus_selected();
        // The filtered-out selection forced a reset to defaults.
        assert_eq!(pl.visible_indices(), &[0, 1, 2]);
        assert_eq!(pl.focused_track(), Some(1));
    }

    #[test]
    fn repeat_cycling_is_a_ring() {
        let mut pl = playlist(&["a"]);
        assert_eq!(pl.cycle_repeat(true), RepeatMode::Track);
        assert_eq!(pl.cycle_repeat(true), RepeatMode::Playlist);
        assert_eq!(pl.cycle_repeat(true), RepeatMode::None);
        assert_eq!(pl.cycle_repeat(false), RepeatMode::Playlist);
    }

    #[test]
    fn message_queue_deduplicates_and_bounds() {
        let mut pl = playlist(&["a"]);
        pl.push_message(MessageKind::Error, "failed to open \"x.mp3\"");
        pl.push_message(MessageKind::Error, "failed to open \"x.mp3\"");
        assert!(pl.pop_message().is_some());
        assert!(pl.pop_message().is_none(), "duplicate within window must drop");

        for i in 0..(MESSAGE_QUEUE_CAP + 4) {
            pl.push_message(MessageKind::Notify, format!("msg {i}"));
        }
        let mut drained = Vec::new();
        while let Some(m) = pl.pop_message() {
            drained.push(m.text);
        }
        assert_eq!(drained.len(), MESSAGE_QUEUE_CAP);
        // Overflow dropped the oldest entries.
        assert_eq!(drained[0], "msg 4");
    }

    #[test]
    fn update_info_falls_back_to_file_name() {
        let mut pl = playlist(&["nameless.ogg"]);
        pl.update_info(TrackInfo::default());
        assert_eq!(pl.info().title, "nameless.ogg");
    }

    proptest! {
        #[test]
        fn filter_keeps_sorted_subset_invariant(
            names in proptest::collection::vec("[a-d]{0,6}", 1..20),
            query in "[a-d]{0,3}",
        ) {
            let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            let mut pl = playlist(&refs);
            pl.filter(&query);
            assert_invariants(&pl);
            pl.commit_filter();
            pl.filter("");
            assert_invariants(&pl);
        }
    }
}
