//! Chat with Lumos AI in the terminal.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use lumos::core::{
    ChatPhase, ChatWidget, Language, Role, SubmitOutcome, WidgetError,
    WidgetEvent, WidgetView,
};
use lumos::{FALLBACK_KEY_VAR, StudioBuilder};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Chat with Lumos AI about the Lokal AI Studio.
#[derive(Debug, Parser)]
#[command(name = "lumos", version)]
struct Args {
    /// Language of the conversation (`de` or `en`).
    #[arg(long, env = "LUMOS_LANG", default_value = "de")]
    lang: Language,

    /// Gemini model to talk to.
    #[arg(long, env = "LUMOS_MODEL")]
    model: Option<String>,

    /// Base URL of the Gemini API.
    #[arg(long, env = "LUMOS_BASE_URL")]
    base_url: Option<String>,

    /// Where to store the API key.
    #[arg(long, env = "LUMOS_CREDENTIAL_FILE")]
    credential_file: Option<PathBuf>,

    /// Ignore the `API_KEY` environment variable.
    #[arg(long)]
    no_env_key: bool,
}

enum UiEvent {
    Widget(WidgetEvent),
    Idle,
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Message(&'a str),
    Key(&'a str),
    Settings,
    Reset,
    Lang(Option<&'a str>),
    Suggest,
    Suggestion(usize),
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Message(line);
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name {
        "key" => Command::Key(arg),
        "settings" => Command::Settings,
        "reset" => Command::Reset,
        "lang" => Command::Lang(Some(arg).filter(|arg| !arg.is_empty())),
        "suggest" => Command::Suggest,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => match name.parse::<usize>() {
            Ok(index @ 1..=4) => Command::Suggestion(index),
            _ => Command::Unknown(name),
        },
    }
}

const BAR_CHAR: &str = "▎";

const HELP: &str = "\
/key <value>   save your Google Gemini API key
/settings      show the API key settings
/reset         start a new conversation
/lang [de|en]  switch the language
/suggest       list suggested questions
/1 ... /4      ask a suggested question
/quit          leave";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let fallback_key = if args.no_env_key {
        None
    } else {
        env::var(FALLBACK_KEY_VAR).ok()
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut builder = StudioBuilder::new()
        .with_language(args.lang)
        .with_fallback_key(fallback_key)
        .on_event({
            let event_tx = event_tx.clone();
            move |event| {
                event_tx.send(UiEvent::Widget(event)).ok();
            }
        })
        .on_idle(move || {
            event_tx.send(UiEvent::Idle).ok();
        });
    if let Some(model) = args.model {
        builder = builder.with_model(model);
    }
    if let Some(base_url) = args.base_url {
        builder = builder.with_base_url(base_url);
    }
    if let Some(path) = args.credential_file {
        builder = builder.with_credential_file(path);
    }
    let widget = builder.build();

    if let Err(err) = run(&widget, &mut event_rx).await {
        error!("{err}");
    }
}

async fn run(
    widget: &ChatWidget,
    event_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
) -> Result<(), WidgetError> {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let view = widget.snapshot().await?;
    print_log(&view);
    println!("{}", "Type /help for commands.".dimmed());

    let mut stdin = BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line(&mut stdin).await else {
            break;
        };
        // Events of earlier commands have been rendered from snapshots.
        while event_rx.try_recv().is_ok() {}

        let text = match parse_command(line.trim()) {
            Command::Message(text) => text.to_owned(),
            Command::Suggestion(index) => {
                let suggestions = widget.suggestions().await?;
                suggestions[index - 1].to_owned()
            }
            Command::Key(value) => {
                match widget.save_credential(value).await {
                    Ok(()) => {
                        let view = widget.snapshot().await?;
                        let hint = view.credential_hint.unwrap_or_default();
                        println!("{} {hint}", "✔".bright_green());
                    }
                    Err(WidgetError::Credential(_)) => {
                        print_prompt(&widget.snapshot().await?);
                    }
                    Err(err) => return Err(err),
                }
                continue;
            }
            Command::Settings => {
                widget.open_credential_prompt().await?;
                print_prompt(&widget.snapshot().await?);
                widget.dismiss_credential_prompt().await?;
                continue;
            }
            Command::Reset => {
                if widget.reset().await? {
                    print_log(&widget.snapshot().await?);
                } else {
                    print_prompt(&widget.snapshot().await?);
                }
                continue;
            }
            Command::Lang(arg) => {
                let language = match arg {
                    Some(arg) => match arg.parse::<Language>() {
                        Ok(language) => language,
                        Err(err) => {
                            println!("{}", err.bright_red());
                            continue;
                        }
                    },
                    None => widget.snapshot().await?.language.toggled(),
                };
                widget.set_language(language).await?;
                print_log(&widget.snapshot().await?);
                continue;
            }
            Command::Suggest => {
                let suggestions = widget.suggestions().await?;
                for (idx, suggestion) in suggestions.iter().enumerate() {
                    println!("  /{} {}", idx + 1, suggestion.bright_white());
                }
                continue;
            }
            Command::Help => {
                println!("{HELP}");
                continue;
            }
            Command::Quit => break,
            Command::Unknown(name) => {
                println!("{} /{name}, try /help", "unknown command".bright_red());
                continue;
            }
        };

        match widget.submit(text).await? {
            SubmitOutcome::Started => {
                if !stream_reply(event_rx, &progress_style).await {
                    break;
                }
                let view = widget.snapshot().await?;
                if view.prompt.open {
                    print_prompt(&view);
                }
            }
            SubmitOutcome::NeedsCredential => {
                print_prompt(&widget.snapshot().await?);
            }
            SubmitOutcome::Busy | SubmitOutcome::Empty => {}
        }
    }

    Ok(())
}

/// Renders a reply as it streams in. Returns `false` if the widget is gone.
async fn stream_reply(
    event_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
    progress_style: &ProgressStyle,
) -> bool {
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(progress_style.clone());
    progress_bar.set_message("Lumos AI...");
    let mut spinning = true;

    let mut printed = String::new();
    let mut final_text = None;
    let mut failed = false;

    loop {
        let event = if spinning {
            progress_bar.inc(1);
            select! {
                event = event_rx.recv() => event,
                _ = sleep(Duration::from_millis(100)) => continue,
            }
        } else {
            event_rx.recv().await
        };
        let Some(event) = event else {
            progress_bar.finish_and_clear();
            return false;
        };

        match event {
            UiEvent::Widget(WidgetEvent::MessageUpdated(msg))
                if msg.role == Role::Model =>
            {
                if !msg.is_streaming {
                    final_text = Some(msg.text);
                    continue;
                }
                if spinning {
                    // Finish the spinner before printing anything else.
                    progress_bar.finish_and_clear();
                    spinning = false;
                    print!("{}🤖 ", BAR_CHAR.bright_cyan());
                }
                if let Some(delta) = msg.text.strip_prefix(printed.as_str()) {
                    print!("{}", delta.bright_white());
                    std::io::stdout().flush().ok();
                }
                printed = msg.text;
            }
            UiEvent::Widget(WidgetEvent::PhaseChanged(ChatPhase::Failed)) => {
                failed = true;
            }
            UiEvent::Widget(_) => {}
            UiEvent::Idle => break,
        }
    }

    progress_bar.finish_and_clear();
    let final_text = final_text.unwrap_or_default();
    if failed {
        if !printed.is_empty() {
            println!();
        }
        println!("{}⚠️  {}", BAR_CHAR.bright_red(), final_text.bright_red());
    } else {
        if printed.is_empty() {
            print!("{}🤖 ", BAR_CHAR.bright_cyan());
        }
        if let Some(rest) = final_text.strip_prefix(printed.as_str()) {
            print!("{}", rest.bright_white());
        }
        println!();
    }
    true
}

fn print_log(view: &WidgetView) {
    for msg in &view.messages {
        match msg.role {
            Role::Model => {
                println!("{}🤖 {}", BAR_CHAR.bright_cyan(), msg.text.bright_white());
            }
            Role::User => println!("> {}", msg.text),
        }
    }
}

fn print_prompt(view: &WidgetView) {
    let bar = BAR_CHAR.bright_yellow();
    println!("{bar}🔑 {}", view.language.key_prompt());
    if let Some(hint) = &view.credential_hint {
        println!("{bar}   {hint}");
    }
    if let Some(err) = &view.prompt.error {
        println!("{bar}{}", err.bright_red());
    }
    println!("{bar}   /key <API key>");
}

async fn read_line<R>(input: &mut Lines<R>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    match input.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
