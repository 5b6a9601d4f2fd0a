mod app;
mod scenario;

use anyhow::Result;
use app::App;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use plume_config::{Config, TriggerConfig};
use plume_engine::EditorOptions;
use plume_engine::resize::ResizeLimits;
use plume_engine::suggestion::SuggestionOptions;
use plume_engine::suggestion::mentions::MentionItem;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use scenario::Scenario;
use std::{env, io::stdout, process};

fn trigger_options(trigger: &TriggerConfig) -> SuggestionOptions {
    SuggestionOptions {
        trigger: trigger.trigger,
        start_of_line: trigger.start_of_line,
        close_on_empty: trigger.close_on_empty,
    }
}

fn editor_options(config: &Config) -> EditorOptions {
    let mut options = EditorOptions {
        mentions: trigger_options(&config.suggestion.mentions),
        slash: trigger_options(&config.suggestion.slash),
        limits: ResizeLimits::new(config.resize.min_width, config.resize.max_width),
        emoji: config.input_rules.emoji,
        spaghetto: config.input_rules.spaghetto,
        ..EditorOptions::default()
    };
    if !config.mentions.users.is_empty() {
        options.users = config
            .mentions
            .users
            .iter()
            .map(|user| MentionItem {
                id: user.id.clone(),
                label: user.label.clone(),
                avatar: user.avatar.clone(),
            })
            .collect();
    }
    options
}

/// Logs go to stderr, which the TUI's alternate screen shares, so the
/// interactive mode stays silent
fn log_level(args: &[String]) -> log::LevelFilter {
    match args.get(1) {
        None => log::LevelFilter::Off,
        Some(_) => log::LevelFilter::Info,
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    env_logger::Builder::from_default_env()
        .filter_level(log_level(&args))
        .init();

    let config = match Config::load_or_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };
    log::info!("Config path: {}", Config::config_path().display());
    let options = editor_options(&config);

    match args.get(1).map(String::as_str) {
        None => run_tui(options),
        Some("replay") if args.len() == 3 => {
            let scenario = Scenario::load(&args[2])?;
            let editor = scenario.replay(options)?;
            println!("{}", editor.to_html());
            Ok(())
        }
        _ => {
            eprintln!("Usage: {} [replay <scenario.toml>]", args[0]);
            process::exit(1);
        }
    }
}

fn run_tui(options: EditorOptions) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(App::demo_document(), options);

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
    B::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && !app.handle_key(key)
        {
            return Ok(());
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(f.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .margin(1)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)].as_ref())
        .split(rows[0]);

    // Document panel
    let content_text: Vec<Line> = app
        .document_lines()
        .into_iter()
        .map(|line| Line::from(vec![Span::raw(line)]))
        .collect();
    let title = format!("Document (v{})", app.editor().document().version());
    let content = Paragraph::new(content_text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    f.render_widget(content, chunks[0]);

    // Suggestion panel
    match app.popup() {
        Some(props) => {
            let title = format!("{}{}", props.trigger, props.query);
            let items: Vec<ListItem> = if props.items.is_empty() {
                vec![ListItem::new(props.empty_message)]
            } else {
                props
                    .items
                    .iter()
                    .map(|item| {
                        let text = match &item.detail {
                            Some(detail) => format!("{} - {}", item.label, detail),
                            None => item.label.clone(),
                        };
                        ListItem::new(vec![Line::from(vec![Span::raw(text)])])
                    })
                    .collect()
            };
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title(title))
                .highlight_style(Style::default().bg(Color::Yellow).fg(Color::Black));
            f.render_stateful_widget(list, chunks[1], &mut app.popup_state);
        }
        None => {
            let hint = Paragraph::new("No suggestions")
                .block(Block::default().borders(Borders::ALL).title("Suggestions"));
            f.render_widget(hint, chunks[1]);
        }
    }

    // Instructions
    let help_text = Line::from(vec![
        Span::raw("Ctrl-q: Quit | "),
        Span::raw("Ctrl-z: Undo | "),
        Span::raw("↑/↓: Choose | Enter: Apply | Esc: Dismiss | "),
        Span::raw("Ctrl-Shift-r: Rainbow"),
    ]);
    let help = Paragraph::new(vec![help_text]).block(Block::default());
    f.render_widget(help, rows[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_config::UserEntry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tui_mode_silences_logging() {
        let args = |list: &[&str]| list.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        assert_eq!(log_level(&args(&["plume"])), log::LevelFilter::Off);
        assert_eq!(
            log_level(&args(&["plume", "replay", "demo.toml"])),
            log::LevelFilter::Info
        );
    }

    #[test]
    fn test_default_config_gives_default_options() {
        assert_eq!(editor_options(&Config::default()), EditorOptions::default());
    }

    #[test]
    fn test_config_overrides_reach_editor_options() {
        let mut config = Config::default();
        config.resize.max_width = 640;
        config.input_rules.emoji = false;
        config.suggestion.mentions.trigger = '#';
        config.mentions.users.push(UserEntry {
            id: "42".to_string(),
            label: "Grace Hopper".to_string(),
            avatar: None,
        });

        let options = editor_options(&config);
        assert_eq!(options.limits, ResizeLimits::new(100, 640));
        assert!(!options.emoji);
        assert!(options.spaghetto);
        assert_eq!(options.mentions.trigger, '#');
        assert_eq!(options.users, vec![MentionItem::new("42", "Grace Hopper")]);
    }
}
