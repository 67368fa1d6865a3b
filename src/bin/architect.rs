use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use architect::error::ArchitectError;
use architect::formatting::{
    render_audit_entry, render_entry, render_knowledge_item, render_usage,
};
use architect::store::{FileStore, KnowledgeStore, MemoryStore, Store};
use architect::types::{KnowledgeId, KnowledgeItem, KnowledgePatch, UsageStats};
use architect::utils::{ConversationExport, ingest_file};
use architect::{Analysis, AppConfig, ConversationSession, Result, SendOutcome, logging};

const RECENT_AUDIT: usize = 20;
const DEBUG_END: &str = "/end";

#[tokio::main]
async fn main() -> Result<()> {
    // Rayon parses the stored collections when the file store opens
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .thread_name(|i| format!("architect-worker-{}", i))
        .build_global()
        .map_err(ArchitectError::ThreadPoolInit)?;

    logging::init();
    let config = AppConfig::from_env();

    match tokio::spawn(run(config)).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            tracing::error!(error = %e, "front-end task panicked");
            eprintln!(
                "{}",
                "Sorry, something went wrong. Stored messages are safe; please restart architect."
                    .red()
                    .bold()
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run(config: AppConfig) -> Result<()> {
    if let Some(banner) = config.banner() {
        println!("{}", banner.yellow().bold());
    }
    for warning in &config.warnings {
        eprintln!("{} {}", "config:".yellow(), warning);
    }

    let store = open_store(&config).await;
    let session = ConversationSession::open(
        store,
        config.gateway()?,
        Arc::new(config.rates.clone()),
        config.session_options(),
    )
    .await?;

    println!(
        "{} {} on {} (type /help for commands)",
        "Architect".bold(),
        config.model.to_string().yellow(),
        config.provider
    );
    for entry in session.entries() {
        println!("{}", render_entry(&entry));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match Command::parse(&line) {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Cost => println!(
                "💰 {} session ({} charged messages)",
                session.total_cost().to_string().bold(),
                session.charged_events()
            ),
            Command::Audit => show_audit(&session).await,
            Command::Export(path) => match ConversationExport::from_session(&session)
                .write_to(&path)
                .await
            {
                Ok(()) => println!("Exported to {}", path.display()),
                Err(e) => eprintln!("{} {e}", "export failed:".red()),
            },
            Command::Knowledge(action) => knowledge(session.store().as_ref(), action).await,
            Command::Debug(code) => {
                let code = match code {
                    Some(code) => code,
                    None => read_block(&mut lines).await?,
                };
                debug(&session, &code).await;
            }
            Command::Say(text) => say(&session, &text).await,
            Command::Unknown(name) => eprintln!("unknown command /{name}, try /help"),
        }
    }

    let undelivered = session.close().await;
    if undelivered > 0 {
        eprintln!(
            "{} {undelivered} audit entries could not be stored",
            "warning:".yellow()
        );
    }
    println!("Session total: {}", session.total_cost());
    Ok(())
}

async fn open_store(config: &AppConfig) -> Arc<dyn Store> {
    let Some(dir) = &config.data_dir else {
        eprintln!("{}", "No data directory, conversation is kept in memory.".yellow());
        return Arc::new(MemoryStore::new());
    };
    match FileStore::open(dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "file store unavailable");
            eprintln!(
                "{} {e}; conversation is kept in memory",
                "storage unavailable:".yellow()
            );
            Arc::new(MemoryStore::new())
        }
    }
}

fn prompt() -> Result<()> {
    print!("{} ", ">".bold());
    std::io::stdout().flush()?;
    Ok(())
}

async fn read_block(lines: &mut Lines<BufReader<Stdin>>) -> Result<String> {
    println!("{}", format!("Paste code, finish with {DEBUG_END}").dimmed());
    let mut block = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == DEBUG_END {
            break;
        }
        block.push(line);
    }
    Ok(block.join("\n"))
}

async fn say(session: &ConversationSession, text: &str) {
    println!("{}", "thinking…".dimmed());
    match session.send(text).await {
        Ok(SendOutcome::Answered { reply, cost }) => {
            let line = session
                .entries()
                .iter()
                .find(|entry| entry.message.id == reply.id)
                .map(render_entry)
                .unwrap_or_else(|| reply.content.clone());
            println!("{line} {}", format!("({cost})").dimmed());
        }
        Ok(SendOutcome::Failed(error)) => {
            println!("{} Error: {error}", "system>".red().bold());
        }
        Err(e) => eprintln!("{} {e}", "not sent:".yellow()),
    }
}

async fn debug(session: &ConversationSession, code: &str) {
    println!("{}", "analysing…".dimmed());
    match session.analyze(code).await {
        Ok(Analysis::Report(report)) => match serde_json::to_string_pretty(&report) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{report}"),
        },
        Ok(Analysis::Raw(text)) => println!("{text}"),
        Ok(Analysis::Failed(error)) => println!("{} Error: {error}", "system>".red().bold()),
        Err(e) => eprintln!("{} {e}", "not sent:".yellow()),
    }
}

async fn show_audit(session: &ConversationSession) {
    let mut entries = match session.audit_entries().await {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("{} {e}", "audit log unavailable:".yellow());
            Vec::new()
        }
    };
    let pending = session.pending_audit();
    if !pending.is_empty() {
        println!(
            "{}",
            format!("{} entries waiting to be stored", pending.len()).yellow()
        );
    }
    entries.extend(pending);
    entries.sort_by_key(|entry| entry.created_at);

    for line in render_usage(&UsageStats::from_entries(&entries)) {
        println!("{line}");
    }
    let skip = entries.len().saturating_sub(RECENT_AUDIT);
    for entry in &entries[skip..] {
        println!("{}", render_audit_entry(entry));
    }
}

async fn knowledge(store: &dyn Store, action: KnowledgeAction) {
    let result: Result<()> = async {
        match action {
            KnowledgeAction::List => {
                let items = store.list_knowledge().await?;
                if items.is_empty() {
                    println!("Knowledge base is empty");
                }
                for item in &items {
                    println!("{}", render_knowledge_item(item));
                }
            }
            KnowledgeAction::Add { title, content } => {
                let id = store
                    .add_knowledge(KnowledgeItem::new(title, content))
                    .await?;
                println!("Added {id}");
            }
            KnowledgeAction::Edit { id, content } => {
                let patch = KnowledgePatch {
                    title: None,
                    content: Some(content),
                };
                let item = store.update_knowledge(&id, patch).await?;
                println!("{}", render_knowledge_item(&item));
            }
            KnowledgeAction::Remove(id) => {
                store.delete_knowledge(&id).await?;
                println!("Removed {id}");
            }
            KnowledgeAction::Ingest(path) => {
                let item = ingest_file(store, &path).await?;
                println!("{}", render_knowledge_item(&item));
            }
            KnowledgeAction::Usage => {
                println!(
                    "usage: /kb list | add <title> | <content> | edit <id> <content> | rm <id> | ingest <path>"
                );
            }
        }
        Ok::<(), ArchitectError>(())
    }
    .await;

    if let Err(e) = result {
        eprintln!("{} {e}", "knowledge:".red());
    }
}

fn print_help() {
    println!(
        "\
/cost                      running session cost
/audit                     usage summary and recent audit entries
/export <path>             write the conversation as JSON
/kb list                   list knowledge items
/kb add <title> | <text>   add a knowledge item
/kb edit <id> <text>       replace an item's content
/kb rm <id>                delete an item
/kb ingest <path>          add a text file as an item
/debug [code]              analyse code (without code, paste until {DEBUG_END})
/quit                      leave"
    );
}

#[derive(Debug, PartialEq)]
enum KnowledgeAction {
    List,
    Add { title: String, content: String },
    Edit { id: KnowledgeId, content: String },
    Remove(KnowledgeId),
    Ingest(PathBuf),
    Usage,
}

#[derive(Debug, PartialEq)]
enum Command {
    Say(String),
    Cost,
    Audit,
    Export(PathBuf),
    Knowledge(KnowledgeAction),
    Debug(Option<String>),
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };
        let (name, args) = split_word(rest);
        match name {
            "cost" => Command::Cost,
            "audit" => Command::Audit,
            "export" if !args.is_empty() => Command::Export(PathBuf::from(args)),
            "export" => Command::Export(PathBuf::from("architect-export.json")),
            "kb" => Command::Knowledge(KnowledgeAction::parse(args)),
            "debug" => Command::Debug((!args.is_empty()).then(|| args.to_string())),
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

impl KnowledgeAction {
    fn parse(args: &str) -> Self {
        let (verb, rest) = split_word(args);
        match verb {
            "list" | "ls" | "" => KnowledgeAction::List,
            "add" => match rest.split_once('|') {
                Some((title, content)) if !title.trim().is_empty() => KnowledgeAction::Add {
                    title: title.trim().to_string(),
                    content: content.trim().to_string(),
                },
                _ => KnowledgeAction::Usage,
            },
            "edit" => match split_word(rest) {
                (id, content) if !id.is_empty() && !content.is_empty() => KnowledgeAction::Edit {
                    id: KnowledgeId::from(id),
                    content: content.to_string(),
                },
                _ => KnowledgeAction::Usage,
            },
            "rm" | "delete" if !rest.is_empty() => KnowledgeAction::Remove(KnowledgeId::from(rest)),
            "ingest" if !rest.is_empty() => KnowledgeAction::Ingest(PathBuf::from(rest)),
            _ => KnowledgeAction::Usage,
        }
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_sent() {
        assert_eq!(
            Command::parse("  design a cache  "),
            Command::Say("design a cache".into())
        );
    }

    #[test]
    fn test_commands() {
        assert_eq!(Command::parse("/cost"), Command::Cost);
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(
            Command::parse("/export out/backup.json"),
            Command::Export(PathBuf::from("out/backup.json"))
        );
        assert_eq!(Command::parse("/debug"), Command::Debug(None));
        assert_eq!(
            Command::parse("/debug let x = 1;"),
            Command::Debug(Some("let x = 1;".into()))
        );
        assert_eq!(Command::parse("/nope"), Command::Unknown("nope".into()));
    }

    #[test]
    fn test_knowledge_commands() {
        assert_eq!(
            Command::parse("/kb add Rates | gemini is 4.50"),
            Command::Knowledge(KnowledgeAction::Add {
                title: "Rates".into(),
                content: "gemini is 4.50".into()
            })
        );
        assert_eq!(
            Command::parse("/kb edit abc new text here"),
            Command::Knowledge(KnowledgeAction::Edit {
                id: KnowledgeId::from("abc"),
                content: "new text here".into()
            })
        );
        assert_eq!(
            Command::parse("/kb rm abc"),
            Command::Knowledge(KnowledgeAction::Remove(KnowledgeId::from("abc")))
        );
        assert_eq!(Command::parse("/kb"), Command::Knowledge(KnowledgeAction::List));
        assert_eq!(
            Command::parse("/kb add no separator"),
            Command::Knowledge(KnowledgeAction::Usage)
        );
    }
}
