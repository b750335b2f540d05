//! Chat command handler.
//!
//! Interactive loop over one [`Session`]. Replies are printed word by word.

use clap::Args;
use policypro_agent::Session;
use policypro_core::{config::AppConfig, AppResult};
use policypro_llm::Role;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const GREETING: &str = "Hola, ¿en qué puedo ayudarte?";
const THINKING: &str = "Policy Pro - 🤖 Estoy pensando...";

/// Interactive conversation
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Delay between streamed words, in milliseconds
    #[arg(long, default_value = "50")]
    pub word_delay_ms: u64,

    /// Print replies at once instead of word by word
    #[arg(long)]
    pub no_stream: bool,
}

/// A line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Exit,
    Reset,
    History,
    Empty,
    Question(String),
}

impl Input {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Input::Empty,
            "/exit" | "/quit" => Input::Exit,
            "/reset" => Input::Reset,
            "/history" => Input::History,
            text => Input::Question(text.to_string()),
        }
    }
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let mut session = Session::from_config(config).await?;

        println!("Policy Pro");
        println!("Comandos: /reset, /history, /exit");
        println!();
        self.print_reply(GREETING).await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match Input::parse(&line) {
                Input::Empty => continue,
                Input::Exit => break,
                Input::Reset => {
                    session.reset();
                    println!("Conversación reiniciada.");
                }
                Input::History => print_history(&session),
                Input::Question(question) => {
                    eprintln!("{}", THINKING);
                    match session.query(&question).await {
                        Ok(answer) => self.print_reply(&answer).await?,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            tracing::warn!("Turn failed: {}", e);
                            eprintln!("Error: {}", e);
                        }
                    }
                }
            }
        }

        tracing::info!(tokens = session.state().token_count(), "Chat finished");
        Ok(())
    }

    async fn print_reply(&self, text: &str) -> AppResult<()> {
        let mut stdout = std::io::stdout();
        if self.no_stream {
            writeln!(stdout, "{}", text)?;
            return Ok(());
        }

        let delay = Duration::from_millis(self.word_delay_ms);
        for word in stream_words(text) {
            write!(stdout, "{}", word)?;
            stdout.flush()?;
            tokio::time::sleep(delay).await;
        }
        writeln!(stdout)?;
        Ok(())
    }
}

/// Words of `text` with the separator that followed each one, so the
/// concatenation reproduces the text.
fn stream_words(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut in_space = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_space = true;
        } else if in_space {
            chunks.push(&text[start..i]);
            start = i;
            in_space = false;
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

fn print_history(session: &Session) {
    let history = session.history();
    if history.is_empty() {
        println!("(sin mensajes)");
        return;
    }
    for message in history {
        let speaker = match message.role {
            Role::System => "Resumen",
            Role::User => "Tú",
            _ => "Policy Pro",
        };
        println!("{}: {}", speaker, message.content);
    }
}
