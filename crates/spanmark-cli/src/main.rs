use anyhow::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
        MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};
use spanmark_config::Config;
use spanmark_engine::surface::{Clipboard, CopyOutcome, EditKey, FormatRequest, SaveSink};
use spanmark_engine::{
    Cmd, EditableSurface, FormatId, Glyph, Mode, Point, Size, SpanStyle, SurfaceLayout,
    SurfaceOptions, TextRun, selection,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use std::{env, fs, io::stdout, path::PathBuf, process};

/// Toolbar popup footprint in cells.
const TOOLBAR_SIZE: Size = Size {
    width: 24.0,
    height: 1.0,
};

/// Persists the document back to its file on save.
struct FileSaveSink {
    path: PathBuf,
}

impl SaveSink for FileSaveSink {
    fn save(&mut self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// OSC 52 is not wired up; the surface's manual-selection fallback covers
/// terminals without clipboard access.
struct NoClipboard;

impl Clipboard for NoClipboard {
    fn set_text(&mut self, _text: &str) -> Result<()> {
        anyhow::bail!("terminal clipboard not available")
    }
}

/// Text input state for the link/color dialog.
struct ModalInput {
    buffer: String,
    error: Option<String>,
}

struct App {
    surface: EditableSurface,
    sink: FileSaveSink,
    notices: Rc<RefCell<Vec<String>>>,
    layout: SurfaceLayout,
    viewport: Size,
    started: Instant,
    sel_anchor: usize,
    sel_focus: usize,
    modal: Option<ModalInput>,
    should_quit: bool,
}

impl App {
    fn new(path: PathBuf, config: Config) -> Result<Self> {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("{} does not exist yet, starting empty", path.display());
                String::new()
            }
            Err(err) => return Err(err.into()),
        };

        let opts = SurfaceOptions {
            keep_editing_after_save: config.keep_editing_after_save,
            default_link_scheme: config.default_link_scheme,
            toolbar_debounce_ms: config.toolbar_debounce_ms,
            modal_guard_ms: config.modal_guard_ms,
        };
        let mut surface = EditableSurface::new(content, opts);

        let notices = Rc::new(RefCell::new(Vec::new()));
        let notice_sink = Rc::clone(&notices);
        surface.subscribe(move |event| {
            if let spanmark_engine::SurfaceEvent::Notice(text) = event {
                notice_sink.borrow_mut().push(text.clone());
            }
        });

        Ok(Self {
            surface,
            sink: FileSaveSink { path },
            notices,
            layout: SurfaceLayout::default(),
            viewport: Size::new(80.0, 24.0),
            started: Instant::now(),
            sel_anchor: 0,
            sel_focus: 0,
            modal: None,
            should_quit: false,
        })
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn last_notice(&self) -> Option<String> {
        self.notices.borrow().last().cloned()
    }

    // ---- selection helpers ----

    fn set_selection(&mut self, anchor: usize, focus: usize) {
        self.sel_anchor = anchor;
        self.sel_focus = focus;
        self.surface
            .selection_changed(self.now_ms(), Some((anchor, focus)));
    }

    fn move_focus(&mut self, to: usize, extend: bool) {
        let anchor = if extend { self.sel_anchor } else { to };
        self.set_selection(anchor, to);
    }

    // ---- event handling ----

    fn on_key(&mut self, key: KeyEvent) -> Result<()> {
        if self.modal.is_some() {
            self.on_modal_key(key);
            return Ok(());
        }
        match self.surface.mode() {
            Mode::Viewing => self.on_view_key(key),
            Mode::Editing => self.on_edit_key(key)?,
        }
        Ok(())
    }

    fn on_view_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('e') | KeyCode::Enter => self.surface.enter_edit(None),
            _ => {}
        }
    }

    fn on_edit_key(&mut self, key: KeyEvent) -> Result<()> {
        let now = self.now_ms();
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);

        if ctrl {
            match key.code {
                KeyCode::Char('s') | KeyCode::Enter => {
                    self.surface.handle_key(now, EditKey::SaveChord, &mut self.sink)?;
                }
                KeyCode::Char('c') => {
                    let message = match self.surface.copy_selection(&mut NoClipboard) {
                        CopyOutcome::Copied => "Copied",
                        CopyOutcome::ManualFallback => {
                            "Clipboard unavailable; selection left in place"
                        }
                    };
                    self.notices.borrow_mut().push(message.to_string());
                }
                KeyCode::Char(c) => {
                    if let Some(id) = format_for_key(c) {
                        self.request_format(id);
                    }
                }
                _ => {}
            }
            return Ok(());
        }

        match key.code {
            KeyCode::Esc => {
                self.surface.handle_key(now, EditKey::Escape, &mut self.sink)?;
            }
            KeyCode::Left => {
                let text = self.doc_text();
                let to = prev_boundary(&text, self.sel_focus);
                self.move_focus(to, shift);
            }
            KeyCode::Right => {
                let text = self.doc_text();
                let to = next_boundary(&text, self.sel_focus);
                self.move_focus(to, shift);
            }
            KeyCode::Backspace => {
                let sel = self.current_selection();
                let cmd = if sel.0 != sel.1 {
                    Cmd::DeleteRange { range: sel.0..sel.1 }
                } else if sel.0 > 0 {
                    let text = self.doc_text();
                    Cmd::DeleteRange {
                        range: prev_boundary(&text, sel.0)..sel.0,
                    }
                } else {
                    return Ok(());
                };
                self.edit_and_track(cmd);
            }
            KeyCode::Delete => {
                let sel = self.current_selection();
                let cmd = if sel.0 != sel.1 {
                    Cmd::DeleteRange { range: sel.0..sel.1 }
                } else {
                    let text = self.doc_text();
                    let end = next_boundary(&text, sel.0);
                    if end == sel.0 {
                        return Ok(());
                    }
                    Cmd::DeleteRange { range: sel.0..end }
                };
                self.edit_and_track(cmd);
            }
            KeyCode::Enter => self.insert_text("\n"),
            KeyCode::Char(c) => self.insert_text(&c.to_string()),
            _ => {}
        }
        Ok(())
    }

    fn on_modal_key(&mut self, key: KeyEvent) {
        let now = self.now_ms();
        match key.code {
            KeyCode::Esc => {
                self.surface.cancel_modal(now);
                self.modal = None;
            }
            KeyCode::Enter => {
                let Some(modal) = &mut self.modal else { return };
                let value = modal.buffer.clone();
                match self.surface.submit_modal(now, &value) {
                    Ok(()) => self.modal = None,
                    Err(err) => {
                        // Inline validation: the dialog stays open
                        if let Some(modal) = &mut self.modal {
                            modal.error = Some(err.to_string());
                        }
                    }
                }
            }
            KeyCode::Backspace => {
                if let Some(modal) = &mut self.modal {
                    modal.buffer.pop();
                    modal.error = None;
                }
            }
            KeyCode::Char(c) => {
                if let Some(modal) = &mut self.modal {
                    modal.buffer.push(c);
                    modal.error = None;
                }
            }
            _ => {}
        }
    }

    fn on_mouse(&mut self, mouse: MouseEvent) {
        let point = Point::new(mouse.column as f32, mouse.row as f32 + 0.5);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let offset = selection::capture_click_offset(&self.layout, point);
                match self.surface.mode() {
                    Mode::Viewing => {
                        self.surface.enter_edit(Some(offset));
                        self.sel_anchor = offset;
                        self.sel_focus = offset;
                    }
                    Mode::Editing => self.set_selection(offset, offset),
                }
            }
            MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Up(MouseButton::Left) => {
                if self.surface.mode() == Mode::Editing {
                    let offset = selection::capture_click_offset(&self.layout, point);
                    self.move_focus(offset, true);
                }
            }
            _ => {}
        }
    }

    // ---- formatting ----

    fn request_format(&mut self, id: FormatId) {
        let now = self.now_ms();
        if let FormatRequest::ModalOpened(_) = self.surface.apply_format(now, id.as_str(), None) {
            self.modal = Some(ModalInput {
                buffer: String::new(),
                error: None,
            });
        }
    }

    // ---- editing ----

    fn doc_text(&self) -> String {
        self.surface.doc().map(|d| d.text()).unwrap_or_default()
    }

    fn current_selection(&self) -> (usize, usize) {
        self.surface
            .doc()
            .map(|d| {
                let sel = d.selection();
                (sel.start, sel.end)
            })
            .unwrap_or((0, 0))
    }

    fn insert_text(&mut self, text: &str) {
        let sel = self.current_selection();
        let cmd = if sel.0 != sel.1 {
            Cmd::ReplaceRange {
                range: sel.0..sel.1,
                text: text.to_string(),
            }
        } else {
            Cmd::InsertText {
                at: sel.0,
                text: text.to_string(),
            }
        };
        self.edit_and_track(cmd);
    }

    fn edit_and_track(&mut self, cmd: Cmd) {
        if let Some(patch) = self.surface.edit(cmd) {
            self.sel_anchor = patch.new_selection.start;
            self.sel_focus = patch.new_selection.end;
        }
    }
}

/// Ctrl+<key> bindings for the format buttons.
fn format_for_key(c: char) -> Option<FormatId> {
    match c {
        'b' => Some(FormatId::Bold),
        'e' => Some(FormatId::Italic),
        'u' => Some(FormatId::Underline),
        'r' => Some(FormatId::Strikethrough),
        'd' => Some(FormatId::Code),
        'k' => Some(FormatId::Link),
        'g' => Some(FormatId::Color),
        'y' => Some(FormatId::BackgroundColor),
        _ => None,
    }
}

fn prev_boundary(text: &str, at: usize) -> usize {
    if at == 0 {
        return 0;
    }
    let mut i = at.min(text.len()) - 1;
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_boundary(text: &str, at: usize) -> usize {
    if at >= text.len() {
        return text.len();
    }
    let mut i = at + 1;
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn main() -> Result<()> {
    env_logger::init();

    // Determine document path from CLI args or config file
    let args: Vec<String> = env::args().collect();
    let config_path = Config::config_path();
    let config = match Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let document_path = if args.len() == 2 {
        PathBuf::from(&args[1])
    } else if args.len() == 1 {
        match &config.notes_path {
            Some(path) => path.clone(),
            None => {
                eprintln!("Error: No document path provided and none configured");
                eprintln!("Usage: {} <document-path>", args[0]);
                eprintln!("Or set notes_path in {}", config_path.display());
                process::exit(1);
            }
        }
    } else {
        eprintln!("Usage: {} [document-path]", args[0]);
        process::exit(1);
    };

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create app
    let mut app = App::new(document_path, config)?;

    // Main loop
    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    <B as ratatui::backend::Backend>::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        // Let the toolbar debounce settle between input bursts
        let now = app.now_ms();
        app.surface
            .position_toolbar(now, &app.layout, TOOLBAR_SIZE, app.viewport);

        if app.should_quit {
            return Ok(());
        }

        if !event::poll(Duration::from_millis(33))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => app.on_key(key)?,
            Event::Mouse(mouse) => app.on_mouse(mouse),
            _ => {}
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(2)].as_ref())
        .split(f.area());

    app.viewport = Size::new(f.area().width as f32, f.area().height as f32);

    // Document panel
    let title = match app.surface.mode() {
        Mode::Viewing => format!("{} — viewing", app.sink.path.display()),
        Mode::Editing => format!("{} — editing", app.sink.path.display()),
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(chunks[0]);

    let doc = match app.surface.doc() {
        Some(doc) => doc.clone(),
        None => app.surface.display_doc(),
    };
    let selection = match app.surface.mode() {
        Mode::Editing => Some(doc.selection()),
        Mode::Viewing => None,
    };

    let (lines, layout) = render_document(&doc, selection, inner);
    app.layout = layout;

    let content = Paragraph::new(lines).block(block);
    f.render_widget(content, chunks[0]);

    // Help + notice line
    let help = match app.surface.mode() {
        Mode::Viewing => "q: Quit | e/click: Edit".to_string(),
        Mode::Editing => {
            "Esc: Cancel | ^S: Save | ^B bold ^E italic ^U underline ^R strike ^D code ^K link ^G color ^Y highlight"
                .to_string()
        }
    };
    let mut status_lines = vec![Line::from(help)];
    if let Some(notice) = app.last_notice() {
        status_lines.push(Line::from(Span::styled(
            notice,
            Style::default().fg(Color::Yellow),
        )));
    }
    f.render_widget(Paragraph::new(status_lines), chunks[1]);

    // Floating toolbar
    if app.modal.is_none()
        && let Some(state) = app.surface.toolbar_state()
        && state.visible
    {
        let x = state.position.x.max(0.0) as u16;
        let y = state.position.y.max(0.0) as u16;
        let area = ratatui::layout::Rect::new(
            x.min(f.area().width.saturating_sub(TOOLBAR_SIZE.width as u16)),
            y.min(f.area().height.saturating_sub(1)),
            TOOLBAR_SIZE.width as u16,
            TOOLBAR_SIZE.height as u16,
        );
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("[B][I][U][S][`][K][G][Y]")
                .style(Style::default().bg(Color::DarkGray).fg(Color::White)),
            area,
        );
    }

    // Modal dialog
    if let Some(modal) = &app.modal {
        let title = match app.surface.pending_format() {
            Some(FormatId::Link) => "Link URL",
            Some(FormatId::BackgroundColor) => "Background color",
            _ => "Text color",
        };
        let area = centered_rect(f.area(), 44, 4);
        f.render_widget(Clear, area);
        let mut lines = vec![Line::from(format!("> {}", modal.buffer))];
        if let Some(error) = &modal.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        }
        f.render_widget(
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
            area,
        );
    }
}

/// Renders the document into styled lines and reports the layout used, so
/// mouse hit-testing sees exactly what was drawn.
fn render_document(
    doc: &spanmark_engine::SpanDoc,
    selection: Option<std::ops::Range<usize>>,
    area: ratatui::layout::Rect,
) -> (Vec<Line<'static>>, SurfaceLayout) {
    let text = doc.text();
    let mut lines = Vec::new();
    let mut runs = Vec::new();
    let mut offset = 0;

    for (row, raw_line) in text.split('\n').enumerate() {
        if row as u16 >= area.height {
            break;
        }
        let line_start = offset;
        let mut spans: Vec<Span<'static>> = Vec::new();
        let mut glyphs = Vec::new();
        let mut pending = String::new();
        let mut pending_style: Option<Style> = None;
        let mut byte_at = line_start;

        for ch in raw_line.chars() {
            let style = cell_style(doc, byte_at, &selection);
            byte_at += ch.len_utf8();
            glyphs.push(Glyph {
                byte_len: ch.len_utf8(),
                advance: 1.0,
            });
            match pending_style {
                Some(current) if current == style => pending.push(ch),
                Some(current) => {
                    spans.push(Span::styled(std::mem::take(&mut pending), current));
                    pending.push(ch);
                    pending_style = Some(style);
                }
                None => {
                    pending.push(ch);
                    pending_style = Some(style);
                }
            }
        }
        if let Some(style) = pending_style {
            spans.push(Span::styled(std::mem::take(&mut pending), style));
        }

        runs.push(TextRun {
            start: line_start,
            rect: spanmark_engine::Rect::new(
                area.x as f32,
                (area.y + row as u16) as f32,
                raw_line.chars().count().max(1) as f32,
                1.0,
            ),
            glyphs,
        });
        lines.push(Line::from(spans));
        offset += raw_line.len() + 1; // the split-off newline
    }

    (lines, SurfaceLayout { runs })
}

/// Terminal style for the byte at `offset`.
fn cell_style(
    doc: &spanmark_engine::SpanDoc,
    offset: usize,
    selection: &Option<std::ops::Range<usize>>,
) -> Style {
    let mut style = Style::default();
    for span_style in doc.styles_at(offset) {
        style = match span_style {
            SpanStyle::Bold => style.add_modifier(Modifier::BOLD),
            SpanStyle::Italic => style.add_modifier(Modifier::ITALIC),
            SpanStyle::Underline => style.add_modifier(Modifier::UNDERLINED),
            SpanStyle::Strikethrough => style.add_modifier(Modifier::CROSSED_OUT),
            SpanStyle::Code { .. } => style.fg(Color::Yellow),
            SpanStyle::Link { .. } => style.fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
            SpanStyle::Color(v) => match parse_color(v) {
                Some(color) => style.fg(color),
                None => style,
            },
            SpanStyle::Background(v) => match parse_color(v) {
                Some(color) => style.bg(color),
                None => style,
            },
        };
    }
    if let Some(sel) = selection
        && sel.contains(&offset)
    {
        style = style.add_modifier(Modifier::REVERSED);
    }
    style
}

/// Maps a CSS-ish color string to a terminal color.
fn parse_color(value: &str) -> Option<Color> {
    let v = value.trim().to_ascii_lowercase();
    if let Some(hex) = v.strip_prefix('#') {
        let hex = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
            6 => hex.to_string(),
            _ => return None,
        };
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        return Some(Color::Rgb(r, g, b));
    }
    match v.as_str() {
        "black" => Some(Color::Black),
        "red" => Some(Color::Red),
        "green" => Some(Color::Green),
        "yellow" => Some(Color::Yellow),
        "blue" => Some(Color::Blue),
        "magenta" | "purple" => Some(Color::Magenta),
        "cyan" => Some(Color::Cyan),
        "white" => Some(Color::White),
        "gray" | "grey" => Some(Color::Gray),
        "orange" => Some(Color::Rgb(0xff, 0xa5, 0x00)),
        _ => None,
    }
}

fn centered_rect(area: ratatui::layout::Rect, width: u16, height: u16) -> ratatui::layout::Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    ratatui::layout::Rect::new(
        area.x + (area.width - w) / 2,
        area.y + (area.height - h) / 2,
        w,
        h,
    )
}
