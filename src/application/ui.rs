use std::io;

use anyhow::Result;
use crossterm::cursor;
use crossterm::event::DisableBracketedPaste;
use crossterm::event::DisableMouseCapture;
use crossterm::event::EnableBracketedPaste;
use crossterm::event::EnableMouseCapture;
use crossterm::terminal::disable_raw_mode;
use crossterm::terminal::enable_raw_mode;
use crossterm::terminal::EnterAlternateScreen;
use crossterm::terminal::LeaveAlternateScreen;
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use ratatui::widgets::Block;
use ratatui::widgets::BorderType;
use ratatui::widgets::Borders;
use ratatui::widgets::Paragraph;
use ratatui::widgets::Wrap;
use ratatui::Terminal;
use tokio::sync::mpsc;

use super::cli::Launch;
use crate::configuration::ConfigKey;
use crate::domain::models::Event;
use crate::domain::models::NoticeType;
use crate::domain::services::events::EventsService;
use crate::domain::services::AppState;
use crate::domain::services::SessionList;

const SIDEBAR_WIDTH: u16 = 28;

fn render<B: Backend>(frame: &mut Frame<B>, app_state: &mut AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
        .split(frame.size());

    let mut info_height = 0;
    if let Some(info) = &app_state.info {
        info_height = info.lines().count() as u16 + 2;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![
            Constraint::Min(1),
            Constraint::Length(info_height),
            Constraint::Length(4),
            Constraint::Length(1),
        ])
        .split(columns[1]);

    if rows[0].width != app_state.last_known_width
        || rows[0].height != app_state.last_known_height
    {
        app_state.set_rect(rows[0]);
    }

    SessionList::render(
        frame,
        columns[0],
        app_state.orchestrator.sessions(),
        app_state.orchestrator.current_index(),
        app_state.waiting_for_reply(),
    );

    app_state
        .bubble_list
        .render(frame, rows[0], app_state.scroll.position);

    if let Some(info) = &app_state.info {
        frame.render_widget(
            Paragraph::new(info.to_string())
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded)
                        .title("Info"),
                )
                .wrap(Wrap { trim: false }),
            rows[1],
        );
    }

    if app_state.waiting_for_reply() {
        app_state.loading.render(frame, rows[2], &app_state.model);
    } else {
        frame.render_widget(app_state.textarea.widget(), rows[2]);
    }

    if let Some(notice) = &app_state.notice {
        let mut style = Style::default().fg(Color::Gray);
        if notice.notice_type() == NoticeType::Error {
            style = Style::default().fg(Color::Red);
        }
        frame.render_widget(
            Paragraph::new(notice.text.to_string()).style(style),
            rows[3],
        );
    }
}

async fn start_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app_state: &mut AppState<'_>,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    let mut events = EventsService::new(rx);

    #[cfg(feature = "dev")]
    {
        app_state
            .textarea
            .insert_str("Explain the difference between a process and a thread in three sentences.");
    }

    loop {
        terminal.draw(|frame| {
            render(frame, app_state);
        })?;

        match events.next().await? {
            Event::KeyboardCharInput(input) => {
                if !app_state.waiting_for_reply() {
                    app_state.textarea.input(input);
                }
            }
            Event::KeyboardPaste(text) => {
                if !app_state.waiting_for_reply() {
                    app_state.textarea.insert_str(text);
                }
            }
            Event::KeyboardCTRLC() => {
                break;
            }
            Event::KeyboardEnter() => {
                if app_state.waiting_for_reply() {
                    continue;
                }
                if app_state.submit_input(&tx).await {
                    break;
                }
            }
            Event::KeyboardTab() => {
                app_state.cycle_session(1);
            }
            Event::KeyboardCTRLP() => {
                app_state.cycle_session(-1);
            }
            Event::KeyboardCTRLN() => {
                app_state.new_session().await;
            }
            Event::KeyboardCTRLW() => {
                app_state.delete_current_session().await;
            }
            Event::ReplyFragment(text) => {
                app_state.handle_reply_fragment(&text);
                app_state.scroll.last();
            }
            Event::ReplyDone() => {
                app_state.handle_reply_done().await;
                app_state.scroll.last();
            }
            Event::ReplyFailed(err) => {
                app_state.handle_reply_failed(err);
            }
            Event::UIResize() => (),
            Event::UIScrollDown() => {
                app_state.scroll.down();
            }
            Event::UIScrollUp() => {
                app_state.scroll.up();
            }
            Event::UIScrollPageDown() => {
                app_state.scroll.down_page();
            }
            Event::UIScrollPageUp() => {
                app_state.scroll.up_page();
            }
            Event::UITick() => {
                app_state.loading.tick();
            }
        }
    }

    return Ok(());
}

/// Restores the terminal from the panic hook. Failures are ignored.
pub fn destruct_terminal_for_panic() {
    let _ = disable_raw_mode();
    let _ = crossterm::execute!(
        io::stdout(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    );
    let _ = crossterm::execute!(io::stdout(), cursor::Show);
}

pub async fn start(
    launch: Launch,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    let mut app_state = AppState::new(
        launch.orchestrator,
        &launch.config.get(ConfigKey::Username),
        &launch.config.get(ConfigKey::Model),
    )
    .await;

    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    enable_raw_mode()?;
    crossterm::execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )?;
    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend)?;

    let res = start_loop(&mut terminal, &mut app_state, tx, rx).await;

    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    return res;
}
