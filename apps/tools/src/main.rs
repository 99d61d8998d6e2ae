use anyhow::Result;
use clap::{Parser, Subcommand};
use server_api::{create_todo, delete_todo, list_todos, reorder_todos, update_todo, ApiContext};
use shared::{
    domain::{ItemId, TodoItem},
    error::ApiException,
    protocol::{CreateTodoRequest, ListTodosQuery, ReorderRequest, UpdateTodoRequest},
};
use storage::Storage;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Maintenance commands for the to-do database")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/todos.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print items in list order.
    List {
        #[arg(long)]
        completed: Option<bool>,
    },
    Add {
        text: String,
    },
    /// Move SOURCE next to DESTINATION.
    Move {
        source: String,
        destination: String,
    },
    Complete {
        id: String,
        #[arg(long)]
        undo: bool,
    },
    Delete {
        id: String,
    },
    /// Rewrite every seq to 1..n, keeping the current order.
    Renumber,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    let ctx = ApiContext::new(storage);

    match cli.command {
        Command::List { completed } => {
            let page = list_todos(
                &ctx,
                &ListTodosQuery {
                    completed,
                    ..ListTodosQuery::default()
                },
            )
            .await
            .map_err(ApiException::from)?;
            for item in &page.data {
                println!("{}", format_item(item));
            }
            println!("{} item(s)", page.count);
        }
        Command::Add { text } => {
            let item = create_todo(&ctx, CreateTodoRequest { text })
                .await
                .map_err(ApiException::from)?;
            println!("created {}", format_item(&item));
        }
        Command::Move {
            source,
            destination,
        } => {
            let response = reorder_todos(
                &ctx,
                ReorderRequest {
                    source_id: ItemId(source),
                    destination_id: ItemId(destination),
                },
            )
            .await
            .map_err(ApiException::from)?;
            if response.moved {
                println!("moved {}", format_item(&response.item));
            } else {
                println!("unchanged {}", format_item(&response.item));
            }
        }
        Command::Complete { id, undo } => {
            let item = update_todo(
                &ctx,
                &ItemId(id),
                UpdateTodoRequest::CompleteTask { completed: !undo },
            )
            .await
            .map_err(ApiException::from)?;
            println!("updated {}", format_item(&item));
        }
        Command::Delete { id } => {
            let id = ItemId(id);
            delete_todo(&ctx, &id).await.map_err(ApiException::from)?;
            println!("deleted {id}");
        }
        Command::Renumber => {
            let count = ctx.storage.renumber_seq().await?;
            info!(count, "renumbered items");
            println!("renumbered {count} item(s)");
        }
    }

    Ok(())
}

fn format_item(item: &TodoItem) -> String {
    let mark = if item.completed { "x" } else { " " };
    let due = item
        .due_date
        .map(|due| format!(" (due {})", due.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    format!("[{mark}] {:>10} {} {}{due}", item.seq, item.id, item.text)
}
