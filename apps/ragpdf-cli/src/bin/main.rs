use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use ragpdf_chain::{Answer, Session};
use ragpdf_cli::{build_session, init_tracing, load_settings, ChatCommand, CHAT_HELP};

/// Ask questions about a PDF using a local embedding model and Ollama.
#[derive(Parser, Debug)]
#[command(name = "ragpdf", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short, env = "RAGPDF_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Keep collections in memory only; nothing is written to disk.
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a PDF
    Load {
        pdf: PathBuf,
        /// Start chatting once the PDF is loaded
        #[arg(long)]
        chat: bool,
    },
    /// Chat with a previously loaded PDF
    Chat {
        /// Collection to reopen (asked for when several exist)
        collection: Option<String>,
    },
    /// List stored collections
    Collections,
}

fn read_line(label: &str) -> io::Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn load(session: &mut Session, path: &Path) -> bool {
    println!("📄 Loading {}", path.display());
    match session.load(path) {
        Ok(report) => {
            println!(
                "✅ {} pages, {} chunks indexed as '{}' in {:.1}s",
                report.pages,
                report.chunks,
                report.collection,
                report.elapsed.as_secs_f32()
            );
            true
        }
        Err(e) => {
            eprintln!("❌ {e}");
            false
        }
    }
}

fn print_answer(answer: &Answer, show_sources: bool) {
    println!("\n{}\n", answer.answer);
    if show_sources && !answer.passages.is_empty() {
        println!("Sources:");
        for p in &answer.passages {
            let preview: String = p.chunk.text.chars().take(120).collect();
            println!(
                "  [{}] {} p.{} (score {:.3}) {}",
                p.rank,
                p.chunk.source,
                p.chunk.page_label(),
                p.score,
                preview.replace('\n', " ")
            );
        }
        println!();
    }
}

fn chat(session: &mut Session, show_sources: bool) -> anyhow::Result<()> {
    println!("💬 Chatting with '{}'. Type /help for commands.", session.collection().unwrap_or("?"));
    loop {
        let Some(line) = read_line("> ")? else { break };
        match ChatCommand::parse(&line) {
            ChatCommand::Empty => {}
            ChatCommand::Exit => break,
            ChatCommand::Help => println!("{CHAT_HELP}"),
            ChatCommand::Clear => match session.clear_memory() {
                Ok(()) => println!("🧹 Conversation cleared"),
                Err(e) => eprintln!("❌ {e}"),
            },
            ChatCommand::Load(path) => {
                load(session, &path);
            }
            ChatCommand::Unknown(cmd) => eprintln!("Unknown command {cmd}. Type /help."),
            ChatCommand::Ask(question) => match session.ask(&question) {
                Ok(answer) => print_answer(&answer, show_sources),
                Err(e) => eprintln!("❌ {e}"),
            },
        }
    }
    Ok(())
}

/// Reopen a stored collection: the named one, the only one, or one the
/// user picks.
fn resume(session: &mut Session, wanted: Option<String>) -> anyhow::Result<bool> {
    let name = match wanted {
        Some(name) => name,
        None => {
            let collections = session.collections()?;
            match collections.len() {
                0 => {
                    println!("No collections yet. Load a PDF first.");
                    return Ok(false);
                }
                1 => collections[0].name.clone(),
                _ => {
                    for (i, c) in collections.iter().enumerate() {
                        println!("  {}. {} ({} chunks)", i + 1, c.name, c.entries);
                    }
                    let Some(choice) = read_line("Collection number: ")? else { return Ok(false) };
                    match choice.parse::<usize>().ok().and_then(|n| collections.get(n.wrapping_sub(1))) {
                        Some(c) => c.name.clone(),
                        None => {
                            eprintln!("❌ Invalid choice");
                            return Ok(false);
                        }
                    }
                }
            }
        }
    };
    match session.resume(&name) {
        Ok(n) => {
            println!("✅ Reopened '{name}' ({n} chunks)");
            Ok(true)
        }
        Err(e) => {
            eprintln!("❌ {e}");
            Ok(false)
        }
    }
}

fn list(session: &Session) -> anyhow::Result<()> {
    let collections = session.collections()?;
    if collections.is_empty() {
        println!("No collections yet.");
    }
    for c in collections {
        println!("  {} ({} chunks)", c.name, c.entries);
    }
    Ok(())
}

fn menu(session: &mut Session, show_sources: bool) -> anyhow::Result<()> {
    println!("RAG PDF\n=======");
    loop {
        println!("\n1. Load a PDF\n2. Chat\n3. Clear memory\n4. List collections\n5. Exit");
        let Some(choice) = read_line("Choose: ")? else { break };
        match choice.as_str() {
            "1" => {
                let Some(path) = read_line("PDF path: ")? else { break };
                if !path.is_empty() {
                    load(session, Path::new(&path));
                }
            }
            "2" => {
                let ready = session.collection().is_some() || resume(session, None)?;
                if ready {
                    chat(session, show_sources)?;
                }
            }
            "3" => match session.clear_memory() {
                Ok(()) => println!("🧹 Conversation cleared"),
                Err(e) => eprintln!("❌ {e}"),
            },
            "4" => list(session)?,
            "5" | "q" | "exit" => break,
            other => eprintln!("Unknown choice '{other}'"),
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let (settings, base) = load_settings(&cli.config).map_err(|e| {
        eprintln!("Error loading config: {e:#}");
        e
    })?;
    let show_sources = settings.cli.show_sources;
    let mut session = build_session(settings, &base, cli.ephemeral)?.with_progress(true);

    match cli.command {
        Some(Command::Load { pdf, chat: then_chat }) => {
            if !load(&mut session, &pdf) {
                std::process::exit(1);
            }
            if then_chat {
                chat(&mut session, show_sources)?;
            }
        }
        Some(Command::Chat { collection }) => {
            if resume(&mut session, collection)? {
                chat(&mut session, show_sources)?;
            }
        }
        Some(Command::Collections) => list(&session)?,
        None => menu(&mut session, show_sources)?,
    }

    session.exit()?;
    Ok(())
}
