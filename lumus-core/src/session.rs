use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{NavigationError, PageInputError};
use crate::navigator::{Entry, EntryKind, Navigator};
use crate::pipeline::{ExtractionResult, ExtractionStatus, PageRequest, RequestId};
use crate::wrap::wrap;

/// Longest accepted page-jump input.
pub const JUMP_INPUT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Listing,
    Reading,
    PageJump,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    MoveUp,
    MoveDown,
    Select,
    Ascend,
    NextPage,
    PrevPage,
    BeginPageJump,
    JumpInput(char),
    JumpBackspace,
    SubmitJump,
    Quit,
    Resize { width: usize },
}

/// What the event loop has to do after a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    Redraw,
    Extract(PageRequest),
    Quit,
}

pub struct Session {
    navigator: Navigator,
    mode: Mode,
    selection: usize,
    loading: bool,
    document: Option<PathBuf>,
    page: usize,
    total_pages: usize,
    content: String,
    wrapped: String,
    status: Option<ExtractionStatus>,
    scroll: usize,
    width: usize,
    jump_input: String,
    jump_error: Option<PageInputError>,
    banner: Option<String>,
    next_request: u64,
    outstanding: Option<RequestId>,
}

impl Session {
    pub fn new(navigator: Navigator, width: usize) -> Self {
        Self {
            navigator,
            mode: Mode::Listing,
            selection: 0,
            loading: false,
            document: None,
            page: 1,
            total_pages: 0,
            content: String::new(),
            wrapped: String::new(),
            status: None,
            scroll: 0,
            width,
            jump_input: String::new(),
            jump_error: None,
            banner: None,
            next_request: 0,
            outstanding: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn current_dir(&self) -> &Path {
        self.navigator.current_dir()
    }

    pub fn entries(&self) -> &[Entry] {
        self.navigator.entries()
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    pub fn document(&self) -> Option<&Path> {
        self.document.as_deref()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Page text reflowed to the current width.
    pub fn content(&self) -> &str {
        &self.wrapped
    }

    pub fn status(&self) -> Option<ExtractionStatus> {
        self.status
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn jump_input(&self) -> &str {
        &self.jump_input
    }

    pub fn jump_error(&self) -> Option<&PageInputError> {
        self.jump_error.as_ref()
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn outstanding(&self) -> Option<RequestId> {
        self.outstanding
    }

    pub fn apply(&mut self, command: Command) -> Effect {
        if !matches!(command, Command::Resize { .. }) {
            self.banner = None;
        }

        match (self.mode, command) {
            (_, Command::Resize { width }) => {
                self.width = width;
                self.rewrap();
                Effect::Redraw
            }

            (Mode::Listing, Command::MoveUp) => {
                self.selection = self.selection.saturating_sub(1);
                Effect::Redraw
            }
            (Mode::Listing, Command::MoveDown) => {
                let last = self.navigator.len().saturating_sub(1);
                self.selection = (self.selection + 1).min(last);
                Effect::Redraw
            }
            (Mode::Listing, Command::Select) => self.select(),
            (Mode::Listing, Command::Ascend) => {
                let result = self.navigator.ascend();
                self.after_navigation(result)
            }
            (Mode::Listing, Command::Quit) => Effect::Quit,

            (Mode::Reading, Command::MoveUp) => {
                self.scroll = self.scroll.saturating_sub(1);
                Effect::Redraw
            }
            (Mode::Reading, Command::MoveDown) => {
                let last = self.wrapped.lines().count().saturating_sub(1);
                self.scroll = (self.scroll + 1).min(last);
                Effect::Redraw
            }
            (Mode::Reading, Command::NextPage) => {
                if self.page < self.total_pages {
                    self.go_to(self.page + 1)
                } else {
                    Effect::None
                }
            }
            (Mode::Reading, Command::PrevPage) => {
                if self.page > 1 {
                    self.go_to(self.page - 1)
                } else {
                    Effect::None
                }
            }
            (Mode::Reading, Command::BeginPageJump) => {
                self.mode = Mode::PageJump;
                self.jump_input.clear();
                self.jump_error = None;
                Effect::Redraw
            }
            (Mode::Reading, Command::Quit) => {
                self.close_document();
                Effect::Redraw
            }

            (Mode::PageJump, Command::JumpInput(ch)) => {
                if self.jump_input.chars().count() < JUMP_INPUT_LIMIT {
                    self.jump_input.push(ch);
                }
                Effect::Redraw
            }
            (Mode::PageJump, Command::JumpBackspace) => {
                self.jump_input.pop();
                Effect::Redraw
            }
            (Mode::PageJump, Command::SubmitJump) => {
                match parse_page(&self.jump_input, self.total_pages) {
                    Ok(page) => {
                        self.jump_input.clear();
                        self.jump_error = None;
                        self.go_to(page)
                    }
                    Err(err) => {
                        debug!(error = %err, "rejected page jump");
                        self.jump_error = Some(err);
                        Effect::Redraw
                    }
                }
            }
            (Mode::PageJump, Command::Quit) => {
                self.mode = Mode::Reading;
                self.jump_error = None;
                Effect::Redraw
            }

            _ => Effect::None,
        }
    }

    /// Applies a finished extraction. Returns `false` when the completion was
    /// superseded by a newer request or the document was closed meanwhile.
    pub fn complete(&mut self, id: RequestId, result: ExtractionResult) -> bool {
        if self.outstanding != Some(id) {
            debug!(%id, latest = ?self.outstanding, "discarding stale completion");
            return false;
        }

        self.outstanding = None;
        self.loading = false;
        // a failure that could not count pages keeps the count already known
        let uncounted = result.status == ExtractionStatus::Failed && result.total_pages == 0;
        if !uncounted {
            self.total_pages = result.total_pages;
        }
        self.page = result.page;
        self.status = Some(result.status);
        self.content = result.text;
        self.scroll = 0;
        self.rewrap();
        if self.mode == Mode::Listing {
            self.mode = Mode::Reading;
        }
        true
    }

    fn select(&mut self) -> Effect {
        let Some(entry) = self.navigator.entry(self.selection).cloned() else {
            return Effect::None;
        };
        match entry.kind {
            EntryKind::Directory => {
                let result = self.navigator.descend(&entry.name);
                self.after_navigation(result)
            }
            EntryKind::Document => {
                self.document = Some(entry.path);
                self.total_pages = 0;
                self.content.clear();
                self.wrapped.clear();
                self.status = None;
                self.dispatch(1)
            }
        }
    }

    fn after_navigation(&mut self, result: Result<(), NavigationError>) -> Effect {
        match result {
            Ok(()) => {
                self.selection = 0;
                // a document still loading belongs to the listing just left
                self.abandon_load();
            }
            Err(err) => {
                debug!(error = %err, "navigation failed");
                self.banner = Some(err.to_string());
            }
        }
        Effect::Redraw
    }

    fn go_to(&mut self, page: usize) -> Effect {
        self.mode = Mode::Reading;
        self.dispatch(page)
    }

    fn dispatch(&mut self, page: usize) -> Effect {
        let Some(path) = self.document.clone() else {
            return Effect::None;
        };
        self.next_request += 1;
        let id = RequestId(self.next_request);
        self.outstanding = Some(id);
        self.loading = true;
        self.page = page;
        Effect::Extract(PageRequest { id, path, page })
    }

    fn abandon_load(&mut self) {
        if let Some(id) = self.outstanding.take() {
            debug!(%id, "abandoning load after leaving its directory");
        }
        self.loading = false;
        self.document = None;
    }

    fn close_document(&mut self) {
        self.mode = Mode::Listing;
        self.document = None;
        self.page = 1;
        self.total_pages = 0;
        self.content.clear();
        self.wrapped.clear();
        self.status = None;
        self.scroll = 0;
        self.loading = false;
        self.outstanding = None;
    }

    fn rewrap(&mut self) {
        self.wrapped = wrap(&self.content, self.width);
    }
}

/// Validates page-jump input against the document length.
pub fn parse_page(input: &str, total_pages: usize) -> Result<usize, PageInputError> {
    let trimmed = input.trim();
    let page: i64 = trimmed
        .parse()
        .map_err(|_| PageInputError::NotANumber(trimmed.to_owned()))?;
    match usize::try_from(page) {
        Ok(valid) if (1..=total_pages).contains(&valid) => Ok(valid),
        _ => Err(PageInputError::OutOfRange {
            page,
            total: total_pages,
        }),
    }
}
