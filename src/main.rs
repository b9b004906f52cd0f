//! skt - concept prerequisite graphs and per-user learning progress.

use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::info;
use skilltree::{
    Branch, Client, ConceptFilter, ConceptUpdate, Daemon, DependencyNode, Gate, NewConcept, Store, is_daemon_running,
    load_snapshot,
};
use std::fs;
use std::path::PathBuf;

mod cli;

use cli::{Cli, Command};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skilltree")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("skilltree.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_store_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn print_tree(node: &DependencyNode, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{}{} {} {}",
        indent,
        node.concept_id.cyan(),
        node.title,
        format!("(L{})", node.difficulty_level).dimmed()
    );
    for branch in &node.prerequisites {
        match branch {
            Branch::Node(child) => print_tree(child, depth + 1),
            Branch::Truncated { concept_id, .. } => {
                println!("{}  {} {}", indent, concept_id.cyan(), "(see above)".dimmed());
            }
            Branch::Missing { concept_id, .. } => {
                println!("{}  {} {}", indent, concept_id.red(), "(missing)".red());
            }
        }
    }
}

fn print_gate(action: &str, done: &str, user_id: &str, concept_id: &str, gate: &Gate) {
    match gate {
        Gate::Granted => println!("{} {} {} {}", "✓".green(), user_id, done, concept_id.cyan()),
        Gate::Denied { missing } => {
            println!(
                "{} {} cannot {} {}: complete {} first",
                "⊘".red(),
                user_id,
                action,
                concept_id.cyan(),
                missing.join(", ").yellow()
            );
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let store_dir = get_store_dir(&cli);

    match cli.command {
        Command::Init => {
            Store::init(&store_dir).context("Failed to initialize skilltree store")?;
            println!("{} Initialized skilltree store in {}", "✓".green(), store_dir.display());
        }

        Command::Add {
            concept_id,
            title,
            description,
            category,
            difficulty,
            prerequisites,
        } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let concept = store
                .create_concept(
                    NewConcept::new(concept_id, title)
                        .with_description(description)
                        .with_category(category)
                        .with_difficulty(difficulty)
                        .with_prerequisites(prerequisites.unwrap_or_default()),
                )
                .context("Failed to create concept")?;

            println!("{} Created: {} {}", "✓".green(), concept.concept_id.cyan(), concept.title);
        }

        Command::Show { concept_id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let Some(concept) = store.get_concept(&concept_id).context("Failed to get concept")? else {
                eprintln!("{} Concept not found: {}", "✗".red(), concept_id);
                std::process::exit(1);
            };

            println!("{}: {}", "ID".bold(), concept.concept_id.cyan());
            println!("{}: {}", "Title".bold(), concept.title);
            if !concept.category.is_empty() {
                println!("{}: {}", "Category".bold(), concept.category);
            }
            println!("{}: {}", "Difficulty".bold(), concept.difficulty_level);
            if !concept.description.is_empty() {
                println!("{}: {}", "Description".bold(), concept.description);
            }
            if !concept.prerequisites.is_empty() {
                println!("{}: {}", "Prerequisites".bold(), concept.prerequisites.join(", "));
            }
            if concept.is_archived {
                println!("{}: {}", "Archived".bold(), "yes".yellow());
            }
            println!("{}: {}", "Created".bold(), concept.created_at);
            println!("{}: {}", "Updated".bold(), concept.updated_at);
        }

        Command::Update {
            concept_id,
            title,
            description,
            category,
            difficulty,
            prerequisites,
            unarchive,
        } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let update = ConceptUpdate {
                title,
                description,
                category,
                difficulty_level: difficulty,
                prerequisites: prerequisites.as_deref().map(split_ids),
                is_archived: unarchive.then_some(false),
            };
            if update.is_empty() {
                bail!("Nothing to update");
            }

            match store
                .update_concept(&concept_id, update)
                .context("Failed to update concept")?
            {
                Some(concept) => println!("{} Updated: {} {}", "✓".green(), concept.concept_id.cyan(), concept.title),
                None => {
                    eprintln!("{} Concept not found: {}", "✗".red(), concept_id);
                    std::process::exit(1);
                }
            }
        }

        Command::Archive { concept_id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            if store
                .archive_concept(&concept_id)
                .context("Failed to archive concept")?
            {
                println!("{} Archived: {}", "✓".green(), concept_id.cyan());
            } else {
                eprintln!("{} Concept not found: {}", "✗".red(), concept_id);
                std::process::exit(1);
            }
        }

        Command::List { category, all } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let mut filter = ConceptFilter::new();
            if let Some(category) = category {
                filter = filter.category(category);
            }
            if all {
                filter = filter.include_archived();
            }

            let concepts = store.list_concepts(&filter).context("Failed to list concepts")?;
            if concepts.is_empty() {
                println!("{}", "No concepts found".dimmed());
            } else {
                for concept in concepts {
                    let archived = if concept.is_archived { " (archived)" } else { "" };
                    let prereqs = if concept.prerequisites.is_empty() {
                        String::new()
                    } else {
                        format!(" <- {}", concept.prerequisites.join(", "))
                    };
                    println!(
                        "{} L{} {}{}{}",
                        concept.concept_id.cyan(),
                        concept.difficulty_level,
                        concept.title,
                        prereqs.dimmed(),
                        archived.yellow()
                    );
                }
            }
        }

        Command::Deps { concept_id, flat } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            if flat {
                let graph = store.graph().context("Failed to load graph")?;
                if !graph.contains(&concept_id) {
                    eprintln!("{} Concept not found: {}", "✗".red(), concept_id);
                    std::process::exit(1);
                }
                for id in graph.transitive_dependency_ids(&concept_id) {
                    println!("{} {}", id.cyan(), graph.title_of(&id));
                }
            } else {
                match store
                    .dependency_tree(&concept_id)
                    .context("Failed to build dependency tree")?
                {
                    Some(tree) => print_tree(&tree, 0),
                    None => {
                        eprintln!("{} Concept not found: {}", "✗".red(), concept_id);
                        std::process::exit(1);
                    }
                }
            }
        }

        Command::Dependents { concept_id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let graph = store.graph().context("Failed to load graph")?;
            if !graph.contains(&concept_id) {
                eprintln!("{} Concept not found: {}", "✗".red(), concept_id);
                std::process::exit(1);
            }

            let dependents = graph.dependents(&concept_id);
            if dependents.is_empty() {
                println!("{}", "No dependents".dimmed());
            } else {
                println!("{} required by {} concept(s):", concept_id.cyan(), dependents.len());
                for id in dependents {
                    println!("  {} {}", id.cyan(), graph.title_of(&id));
                }
            }
        }

        Command::Graph { category } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let graph = store
                .category_graph(category.as_deref())
                .context("Failed to build category graph")?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }

        Command::Progress { user_id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let report = store.progress(&user_id).context("Failed to get progress")?;

            println!(
                "{} ({}): {} completed, {} in progress, {:.1}%",
                report.user_id.bold(),
                report.skill_tree_name,
                report.stats.completed.to_string().green(),
                report.stats.in_progress.to_string().yellow(),
                report.stats.progress_percentage
            );
            for concept in &report.completed_concepts {
                let when = concept
                    .completed_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!("  {} {} {} {}", "✓".green(), concept.concept_id.cyan(), concept.title, when.dimmed());
            }
            for concept in &report.in_progress_concepts {
                println!("  {} {} {}", "→".yellow(), concept.concept_id.cyan(), concept.title);
            }
        }

        Command::Start { user_id, concept_id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let gate = store
                .start_concept(&user_id, &concept_id)
                .context("Failed to start concept")?;
            print_gate("start", "started", &user_id, &concept_id, &gate);
            if !gate.is_granted() {
                std::process::exit(2);
            }
        }

        Command::Complete { user_id, concept_id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let gate = store
                .complete_concept(&user_id, &concept_id)
                .context("Failed to complete concept")?;
            print_gate("complete", "completed", &user_id, &concept_id, &gate);
            if !gate.is_granted() {
                std::process::exit(2);
            }
        }

        Command::Available { user_id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let concepts = store
                .available_concepts(&user_id)
                .context("Failed to get available concepts")?;

            if concepts.is_empty() {
                println!("{}", "Nothing available".dimmed());
            } else {
                println!("{} {} concept(s) available:", "→".blue(), concepts.len());
                for concept in concepts {
                    println!("  {} L{} {}", concept.concept_id.cyan(), concept.difficulty_level, concept.title);
                }
            }
        }

        Command::Blocked { user_id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let blocked = store
                .blocked_concepts(&user_id)
                .context("Failed to get blocked concepts")?;

            if blocked.is_empty() {
                println!("{}", "Nothing blocked".dimmed());
            } else {
                println!("{} {} concept(s) blocked:", "⊘".red(), blocked.len());
                for entry in blocked {
                    let by: Vec<&str> = entry.blocked_by.iter().map(|r| r.concept_id.as_str()).collect();
                    println!(
                        "  {} {} {}",
                        entry.concept_id.cyan(),
                        entry.title,
                        format!("needs {}", by.join(", ")).dimmed()
                    );
                }
            }
        }

        Command::Export { user_id, print } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let snapshot = store.export_snapshot(&user_id).context("Failed to export snapshot")?;
            let path = store.snapshots().path_for(&user_id);

            if print {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!(
                    "{} Exported {} completed concept(s) to {}",
                    "✓".green(),
                    snapshot.completed_concepts.len(),
                    path.display()
                );
            }
        }

        Command::Import { user_id, file } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let snapshot = match file {
                Some(path) => load_snapshot(&path)?,
                None => match store.saved_snapshot(&user_id)? {
                    Some(snapshot) => snapshot,
                    None => bail!(
                        "No snapshot for {} at {}",
                        user_id,
                        store.snapshots().path_for(&user_id).display()
                    ),
                },
            };

            let user = store
                .import_snapshot(&user_id, &snapshot)
                .context("Failed to import snapshot")?;
            println!(
                "{} Imported {} completed concept(s) for {}",
                "✓".green(),
                user.completed_concepts.len(),
                user_id
            );
        }

        Command::Daemon => {
            println!("{} Starting daemon for {}", "→".blue(), store_dir.display());

            let mut daemon = Daemon::new(&store_dir).context("Failed to create daemon")?;

            let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
            rt.block_on(async { daemon.run().await }).context("Daemon error")?;
        }

        Command::DaemonStop => {
            if !is_daemon_running(&store_dir) {
                println!("{} Daemon is not running", "✗".red());
                std::process::exit(1);
            }

            let mut client = Client::connect(&store_dir, false).context("Failed to connect to daemon")?;
            client.shutdown().context("Failed to shutdown daemon")?;
            println!("{} Daemon stopped", "✓".green());
        }

        Command::DaemonStatus => {
            if is_daemon_running(&store_dir) {
                println!("{} Daemon is running", "✓".green());

                if let Ok(mut client) = Client::connect(&store_dir, false)
                    && client.ping().is_ok()
                {
                    println!("  {} Responding to requests", "✓".green());
                }
            } else {
                println!("{} Daemon is not running", "✗".red());
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
