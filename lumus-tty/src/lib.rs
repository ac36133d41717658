use std::io::Write;

use anyhow::Result;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind},
    queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};
use lumus_core::{Command, EntryKind, ExtractionStatus, Mode, Session};
use unicode_width::UnicodeWidthChar;

const LISTING_HINT: &str = "up/down move  enter open  backspace parent  q quit";
const READING_HINT: &str = "left/right page  up/down scroll  p jump  q back";
const JUMP_HINT: &str = "(q to quit)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    None,
    Command(Command),
    /// Ctrl+C leaves the program from any screen.
    Interrupt,
}

/// Translates terminal events into session commands for the active mode.
#[derive(Debug, Default)]
pub struct EventMapper;

impl EventMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn map_event(&self, event: Event, mode: Mode) -> UiEvent {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.map_key(key, mode),
            Event::Resize(columns, _) => UiEvent::Command(Command::Resize {
                width: usize::from(columns),
            }),
            Event::Mouse(mouse) if mode == Mode::Reading => match mouse.kind {
                MouseEventKind::ScrollUp => UiEvent::Command(Command::MoveUp),
                MouseEventKind::ScrollDown => UiEvent::Command(Command::MoveDown),
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn map_key(&self, key: KeyEvent, mode: Mode) -> UiEvent {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => UiEvent::Interrupt,
                _ => UiEvent::None,
            };
        }

        let command = match mode {
            Mode::Listing => match key.code {
                KeyCode::Up | KeyCode::Char('w') => Command::MoveUp,
                KeyCode::Down | KeyCode::Char('s') => Command::MoveDown,
                KeyCode::Enter => Command::Select,
                KeyCode::Backspace => Command::Ascend,
                KeyCode::Esc | KeyCode::Char('q') => Command::Quit,
                _ => return UiEvent::None,
            },
            Mode::Reading => match key.code {
                KeyCode::Up | KeyCode::Char('w') => Command::MoveUp,
                KeyCode::Down | KeyCode::Char('s') => Command::MoveDown,
                KeyCode::Right | KeyCode::Char('d') => Command::NextPage,
                KeyCode::Left | KeyCode::Char('a') => Command::PrevPage,
                KeyCode::Char('p') => Command::BeginPageJump,
                KeyCode::Esc | KeyCode::Char('q') => Command::Quit,
                _ => return UiEvent::None,
            },
            Mode::PageJump => match key.code {
                KeyCode::Enter => Command::SubmitJump,
                KeyCode::Backspace => Command::JumpBackspace,
                KeyCode::Esc | KeyCode::Char('q') => Command::Quit,
                KeyCode::Char(ch) => Command::JumpInput(ch),
                _ => return UiEvent::None,
            },
        };
        UiEvent::Command(command)
    }
}

/// Draws the session as plain text.
pub struct TextRenderer<W: Write> {
    writer: W,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn draw(&mut self, session: &Session, columns: u16, rows: u16) -> Result<()> {
        let width = usize::from(columns.max(1));
        let rows = rows.max(3);

        self.begin_sync_update()?;
        queue!(self.writer, Clear(ClearType::All))?;
        match session.mode() {
            Mode::Listing => self.draw_listing(session, width, rows)?,
            Mode::Reading | Mode::PageJump => self.draw_page(session, width, rows)?,
        }
        self.draw_footer(session, width, rows)?;
        self.end_sync_update()
    }

    fn draw_listing(&mut self, session: &Session, width: usize, rows: u16) -> Result<()> {
        let title = format!(" Lumus  {}", session.current_dir().display());
        self.print_inverted(0, &fit(&title, width))?;

        let visible = usize::from(rows - 2);
        let first = session.selection().saturating_sub(visible.saturating_sub(1));
        let entries = session.entries().iter().enumerate().skip(first).take(visible);
        for (row, (index, entry)) in (1u16..).zip(entries) {
            let marker = if index == session.selection() { '>' } else { ' ' };
            let suffix = if entry.kind == EntryKind::Directory { "/" } else { "" };
            let line = fit(&format!("{marker} {}{suffix}", entry.name), width);
            if index == session.selection() {
                self.print_inverted(row, &line)?;
            } else {
                self.print_at(row, &line)?;
            }
        }

        if session.entries().is_empty() {
            self.print_at(1, &fit("  (no folders or PDF files here)", width))?;
        }
        Ok(())
    }

    fn draw_page(&mut self, session: &Session, width: usize, rows: u16) -> Result<()> {
        let path = session
            .document()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        self.print_inverted(0, &fit(&format!(" {path}"), width))?;

        let body = session
            .content()
            .lines()
            .skip(session.scroll())
            .take(usize::from(rows - 2));
        for (row, line) in (1u16..).zip(body) {
            self.print_at(row, &fit(line, width))?;
        }
        Ok(())
    }

    fn draw_footer(&mut self, session: &Session, width: usize, rows: u16) -> Result<()> {
        let row = rows - 1;
        let text = if let Some(banner) = session.banner() {
            format!(" {banner}")
        } else if session.is_loading() {
            " Loading...".to_owned()
        } else {
            match session.mode() {
                Mode::Listing => format!(" {LISTING_HINT}"),
                Mode::Reading => {
                    let degraded = match session.status() {
                        Some(ExtractionStatus::Degraded) => " (partial)",
                        _ => "",
                    };
                    let percent = scroll_percent(
                        session.scroll(),
                        session.content().lines().count(),
                        usize::from(rows - 2),
                    );
                    format!(
                        " {percent:3.0}% Page {}/{}{degraded}  {READING_HINT}",
                        session.page(),
                        session.total_pages()
                    )
                }
                Mode::PageJump => {
                    let error = if session.jump_error().is_some() {
                        "  Non-existent page"
                    } else {
                        ""
                    };
                    format!(
                        " Go to Page: {}{error}  {JUMP_HINT}",
                        session.jump_input()
                    )
                }
            }
        };
        self.print_inverted(row, &fit(&text, width))
    }

    fn print_at(&mut self, row: u16, content: &str) -> Result<()> {
        queue!(self.writer, cursor::MoveTo(0, row), Print(content))?;
        Ok(())
    }

    fn print_inverted(&mut self, row: u16, content: &str) -> Result<()> {
        queue!(
            self.writer,
            cursor::MoveTo(0, row),
            SetAttribute(Attribute::Reverse),
            Print(content),
            SetAttribute(Attribute::Reset)
        )?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends a synchronized update and flushes, so the frame shows at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// How far down the page the view is, 0 to 100. A page that fits reads 100.
fn scroll_percent(scroll: usize, lines: usize, visible: usize) -> f64 {
    let Some(hidden) = lines.checked_sub(visible).filter(|hidden| *hidden > 0) else {
        return 100.0;
    };
    (scroll.min(hidden) as f64 / hidden as f64) * 100.0
}

/// Cuts `text` to `width` columns and pads it with spaces up to `width`.
fn fit(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(width);
    let mut used = 0;
    for ch in text.chars() {
        let glyph = ch.width().unwrap_or(0);
        if used + glyph > width {
            break;
        }
        out.push(ch);
        used += glyph;
    }
    out.extend(std::iter::repeat(' ').take(width - used));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crossterm::event::{KeyEventState, MouseEvent};
    use lumus_core::{
        DocumentFilter, Effect, ExtractionResult, Navigator, PageRequest, Provenance,
    };
    use tempfile::{tempdir, TempDir};

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn command(event: UiEvent) -> Command {
        match event {
            UiEvent::Command(command) => command,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    fn library() -> (TempDir, Session) {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("archive")).unwrap();
        fs::write(dir.path().join("notes.pdf"), b"%PDF").unwrap();
        let navigator = Navigator::open(dir.path(), DocumentFilter::default()).unwrap();
        (dir, Session::new(navigator, 40))
    }

    fn open_notes(session: &mut Session, text: &str, total: usize) {
        session.apply(Command::MoveDown);
        let Effect::Extract(PageRequest { id, .. }) = session.apply(Command::Select) else {
            panic!("selecting a document must request extraction");
        };
        session.complete(
            id,
            ExtractionResult {
                page: 1,
                text: text.to_owned(),
                total_pages: total,
                provenance: Provenance::TextLayer,
                status: ExtractionStatus::Ok,
            },
        );
    }

    fn render(session: &Session) -> String {
        render_sized(session, 40, 10)
    }

    fn render_sized(session: &Session, columns: u16, rows: u16) -> String {
        let mut renderer = TextRenderer::new(Vec::new());
        renderer.draw(session, columns, rows).unwrap();
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    fn wheel(kind: MouseEventKind) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column: 3,
            row: 4,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn listing_keys_map_to_navigation() {
        let mapper = EventMapper::new();
        let cases = [
            (KeyCode::Up, Command::MoveUp),
            (KeyCode::Char('w'), Command::MoveUp),
            (KeyCode::Down, Command::MoveDown),
            (KeyCode::Char('s'), Command::MoveDown),
            (KeyCode::Enter, Command::Select),
            (KeyCode::Backspace, Command::Ascend),
            (KeyCode::Char('q'), Command::Quit),
            (KeyCode::Esc, Command::Quit),
        ];
        for (code, expected) in cases {
            assert_eq!(command(mapper.map_event(key_event(code), Mode::Listing)), expected);
        }
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('d')), Mode::Listing),
            UiEvent::None
        );
    }

    #[test]
    fn reading_keys_map_to_paging() {
        let mapper = EventMapper::new();
        let cases = [
            (KeyCode::Right, Command::NextPage),
            (KeyCode::Char('d'), Command::NextPage),
            (KeyCode::Left, Command::PrevPage),
            (KeyCode::Char('a'), Command::PrevPage),
            (KeyCode::Char('p'), Command::BeginPageJump),
            (KeyCode::Down, Command::MoveDown),
            (KeyCode::Char('q'), Command::Quit),
        ];
        for (code, expected) in cases {
            assert_eq!(command(mapper.map_event(key_event(code), Mode::Reading)), expected);
        }
    }

    #[test]
    fn jump_mode_captures_typed_characters() {
        let mapper = EventMapper::new();
        assert_eq!(
            command(mapper.map_event(key_event(KeyCode::Char('7')), Mode::PageJump)),
            Command::JumpInput('7')
        );
        assert_eq!(
            command(mapper.map_event(key_event(KeyCode::Char('d')), Mode::PageJump)),
            Command::JumpInput('d')
        );
        assert_eq!(
            command(mapper.map_event(key_event(KeyCode::Char('q')), Mode::PageJump)),
            Command::Quit
        );
        assert_eq!(
            command(mapper.map_event(key_event(KeyCode::Enter), Mode::PageJump)),
            Command::SubmitJump
        );
        assert_eq!(
            command(mapper.map_event(key_event(KeyCode::Backspace), Mode::PageJump)),
            Command::JumpBackspace
        );
    }

    #[test]
    fn ctrl_c_interrupts_every_mode() {
        let mapper = EventMapper::new();
        for mode in [Mode::Listing, Mode::Reading, Mode::PageJump] {
            let event = key_event_with_modifiers(KeyCode::Char('c'), KeyModifiers::CONTROL);
            assert_eq!(mapper.map_event(event, mode), UiEvent::Interrupt);
        }
    }

    #[test]
    fn key_release_is_ignored() {
        let mapper = EventMapper::new();
        let event = Event::Key(KeyEvent {
            code: KeyCode::Enter,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert_eq!(mapper.map_event(event, Mode::Listing), UiEvent::None);
    }

    #[test]
    fn resize_reports_new_width() {
        let mapper = EventMapper::new();
        assert_eq!(
            command(mapper.map_event(Event::Resize(100, 30), Mode::Reading)),
            Command::Resize { width: 100 }
        );
    }

    #[test]
    fn mouse_wheel_scrolls_only_while_reading() {
        let mapper = EventMapper::new();
        assert_eq!(
            command(mapper.map_event(wheel(MouseEventKind::ScrollUp), Mode::Reading)),
            Command::MoveUp
        );
        assert_eq!(
            command(mapper.map_event(wheel(MouseEventKind::ScrollDown), Mode::Reading)),
            Command::MoveDown
        );
        assert_eq!(
            mapper.map_event(wheel(MouseEventKind::Moved), Mode::Reading),
            UiEvent::None
        );
        for mode in [Mode::Listing, Mode::PageJump] {
            assert_eq!(
                mapper.map_event(wheel(MouseEventKind::ScrollDown), mode),
                UiEvent::None
            );
        }
    }

    #[test]
    fn scroll_percent_tracks_position() {
        assert_eq!(scroll_percent(0, 5, 8), 100.0);
        assert_eq!(scroll_percent(0, 8, 8), 100.0);
        assert_eq!(scroll_percent(0, 18, 8), 0.0);
        assert_eq!(scroll_percent(5, 18, 8), 50.0);
        assert_eq!(scroll_percent(17, 18, 8), 100.0);
    }

    #[test]
    fn reading_header_shows_full_path() {
        let (dir, mut session) = library();
        open_notes(&mut session, "body", 2);
        let expected = dir.path().canonicalize().unwrap().join("notes.pdf");
        let output = render_sized(&session, 200, 10);
        assert!(output.contains(&format!(" {}", expected.display())), "{output}");
    }

    #[test]
    fn reading_footer_shows_scroll_percentage() {
        let (_dir, mut session) = library();
        let body = (1..=18).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        open_notes(&mut session, &body, 3);
        assert!(render(&session).contains("  0% Page 1/3"));

        for _ in 0..5 {
            session.apply(Command::MoveDown);
        }
        assert!(render(&session).contains(" 50% Page 1/3"));

        for _ in 0..20 {
            session.apply(Command::MoveDown);
        }
        assert!(render(&session).contains("100% Page 1/3"));
    }

    #[test]
    fn listing_marks_selection_and_directories() {
        let (_dir, session) = library();
        let output = render(&session);
        assert!(output.contains("> archive/"));
        assert!(output.contains("  notes.pdf"));
        assert!(output.contains(LISTING_HINT));
        assert!(output.starts_with("\u{1b}[?2026h"));
        assert!(output.ends_with("\u{1b}[?2026l"));
    }

    #[test]
    fn loading_overlay_replaces_hint() {
        let (_dir, mut session) = library();
        session.apply(Command::MoveDown);
        session.apply(Command::Select);
        let output = render(&session);
        assert!(output.contains("Loading..."));
        assert!(!output.contains(LISTING_HINT));
    }

    #[test]
    fn reading_shows_text_and_page_counter() {
        let (_dir, mut session) = library();
        open_notes(&mut session, "It was a dark and stormy night.", 12);
        let output = render_sized(&session, 200, 10);
        assert!(output.contains("notes.pdf"));
        assert!(output.contains("It was a dark and stormy night."));
        assert!(output.contains("Page 1/12"));
    }

    #[test]
    fn jump_prompt_shows_input_and_error() {
        let (_dir, mut session) = library();
        open_notes(&mut session, "body", 3);
        session.apply(Command::BeginPageJump);
        session.apply(Command::JumpInput('9'));
        let output = render(&session);
        assert!(output.contains("Go to Page: 9"));
        assert!(output.contains(JUMP_HINT));
        assert!(!output.contains("Non-existent page"));

        session.apply(Command::SubmitJump);
        let output = render(&session);
        assert!(output.contains("Non-existent page"));
    }

    #[test]
    fn fit_respects_wide_glyphs() {
        assert_eq!(fit("abc", 5), "abc  ");
        assert_eq!(fit("abcdef", 3), "abc");
        assert_eq!(fit("日本語", 5), "日本 ");
    }
}
