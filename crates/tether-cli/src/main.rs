use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tether_client::prelude::*;
use tether_common::{StorageConfig, truncate_string};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for the Tether CLI
#[derive(Parser)]
#[command(
    name = "tether",
    about = "Tether - persistent agents with durable memory and tools"
)]
pub struct Args {
    /// Path to the config file
    #[clap(long, default_value = "tether.toml")]
    config: PathBuf,

    /// Path to the data directory
    #[clap(long)]
    data_dir: Option<String>,

    /// Use a throwaway in-memory store
    #[clap(long)]
    in_memory: bool,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage agents
    #[command(subcommand)]
    Agents(AgentsCommand),
    /// Inspect tools
    #[command(subcommand)]
    Tools(ToolsCommand),
    /// Read and write an agent's core memory
    #[command(subcommand)]
    Memory(MemoryCommand),
    /// Manage an agent's archival memory
    #[command(subcommand)]
    Archival(ArchivalCommand),
    /// Send and list messages
    #[command(subcommand)]
    Messages(MessagesCommand),
}

#[derive(Subcommand)]
enum AgentsCommand {
    List,
    Create {
        name: String,
        /// Initial human block; the default template when unset
        #[clap(long, requires = "persona")]
        human: Option<String>,
        /// Initial persona block; the default template when unset
        #[clap(long, requires = "human")]
        persona: Option<String>,
        #[clap(long)]
        description: Option<String>,
        #[clap(long)]
        system: Option<String>,
    },
    /// Show an agent by id or name
    Show { agent: String },
    Delete { agent: String },
}

#[derive(Subcommand)]
enum ToolsCommand {
    List,
}

#[derive(Subcommand)]
enum MemoryCommand {
    Show { agent: String },
    Set {
        agent: String,
        label: String,
        value: String,
    },
}

#[derive(Subcommand)]
enum ArchivalCommand {
    Insert { agent: String, text: String },
    List { agent: String },
    Delete { agent: String, passage_id: String },
}

#[derive(Subcommand)]
enum MessagesCommand {
    Send {
        agent: String,
        text: String,
        #[clap(long, default_value = "user", value_parser = parse_role)]
        role: MessageRole,
    },
    List {
        agent: String,
        /// Only the messages in the agent's context window
        #[clap(long)]
        in_context: bool,
    },
}

fn parse_role(s: &str) -> std::result::Result<MessageRole, String> {
    s.parse().map_err(|e: TetherError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = TetherConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    if let Some(data_dir) = &args.data_dir {
        config.set_data_dir(data_dir.clone());
    }
    if args.in_memory {
        config.storage = StorageConfig::in_memory();
    }

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.base.log_level.as_str().into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("Using storage {:?}", config.storage);
    let client = LocalClient::connect(&config).await?;

    match args.command {
        Command::Agents(cmd) => agents(&client, cmd).await,
        Command::Tools(cmd) => tools(&client, cmd).await,
        Command::Memory(cmd) => memory(&client, cmd).await,
        Command::Archival(cmd) => archival(&client, cmd).await,
        Command::Messages(cmd) => messages(&client, cmd).await,
    }
}

/// Look an agent up by id, then by name
async fn resolve_agent(client: &LocalClient, agent: &str) -> Result<AgentState> {
    if let Some(state) = client.get_agent(agent).await? {
        return Ok(state);
    }
    let id = client
        .get_agent_id(agent)
        .await?
        .ok_or_else(|| anyhow!("no agent with id or name '{}'", agent))?;
    client
        .get_agent(&id)
        .await?
        .ok_or_else(|| anyhow!("agent '{}' disappeared", agent))
}

async fn agents(client: &LocalClient, cmd: AgentsCommand) -> Result<()> {
    match cmd {
        AgentsCommand::List => {
            let agents = client.list_agents().await?;
            if agents.is_empty() {
                println!("{}", "No agents yet.".bright_black());
            }
            for agent in agents {
                println!(
                    "{} {} {}",
                    agent.name.bright_green().bold(),
                    agent.id.bright_blue(),
                    agent.description.unwrap_or_default().white()
                );
            }
        }
        AgentsCommand::Create {
            name,
            human,
            persona,
            description,
            system,
        } => {
            let mut request = CreateAgent::new(name);
            if let (Some(human), Some(persona)) = (human, persona) {
                request = request.with_memory(BlockMemory::chat(human, persona)?);
            }
            request.description = description;
            request.system = system;

            let agent = client.create_agent(request).await?;
            println!(
                "{} {} ({})",
                "Created agent".bright_cyan(),
                agent.name.bright_green().bold(),
                agent.id.bright_blue()
            );
        }
        AgentsCommand::Show { agent } => {
            let agent = resolve_agent(client, &agent).await?;
            display_agent(&agent).await?;
        }
        AgentsCommand::Delete { agent } => {
            let agent = resolve_agent(client, &agent).await?;
            client.delete_agent(&agent.id).await?;
            println!("{} {}", "Deleted agent".red(), agent.name.bold());
        }
    }
    Ok(())
}

async fn display_agent(agent: &AgentState) -> Result<()> {
    println!("{}", "Agent".bright_cyan().bold());
    println!("{} {}", "Name:".bright_yellow(), agent.name.bright_green().bold());
    println!("{} {}", "ID:".bright_yellow(), agent.id.bright_blue());
    if let Some(description) = &agent.description {
        println!("{} {}", "Description:".bright_yellow(), description);
    }
    println!(
        "{} {} ({} tokens)",
        "Model:".bright_yellow(),
        agent.llm_config.model.bright_magenta(),
        agent.llm_config.context_window
    );
    println!(
        "{} {}",
        "Tools:".bright_yellow(),
        agent.tools.join(", ").bright_cyan()
    );
    println!(
        "{} {}",
        "Messages in context:".bright_yellow(),
        agent.message_ids.len()
    );
    for (label, block) in agent.memory.blocks().await? {
        println!(
            "{} {}",
            format!("[{}]", label).bright_yellow(),
            truncate_string(&block.value, 80)
        );
    }
    Ok(())
}

async fn tools(client: &LocalClient, cmd: ToolsCommand) -> Result<()> {
    match cmd {
        ToolsCommand::List => {
            for tool in client.list_tools().await? {
                let tags = if tool.tags.is_empty() {
                    String::new()
                } else {
                    format!("[{}]", tool.tags.join(", "))
                };
                println!(
                    "{} {} {} {}",
                    tool.name.bright_green().bold(),
                    tool.source_type.to_string().bright_magenta(),
                    tags.bright_cyan(),
                    tool.description.unwrap_or_default().white()
                );
            }
        }
    }
    Ok(())
}

async fn memory(client: &LocalClient, cmd: MemoryCommand) -> Result<()> {
    match cmd {
        MemoryCommand::Show { agent } => {
            let agent = resolve_agent(client, &agent).await?;
            let memory = client.get_in_context_memory(&agent.id).await?;
            println!("{}", memory.compile().await?);
        }
        MemoryCommand::Set {
            agent,
            label,
            value,
        } => {
            let agent = resolve_agent(client, &agent).await?;
            let memory = client
                .update_in_context_memory(&agent.id, &label, &value)
                .await?;
            let block = memory
                .get_block(&label)
                .await?
                .ok_or_else(|| anyhow!("memory section '{}' vanished", label))?;
            println!(
                "{} {} ({}/{} characters)",
                "Updated".bright_cyan(),
                label.bright_yellow(),
                block.char_count(),
                block.limit
            );
        }
    }
    Ok(())
}

async fn archival(client: &LocalClient, cmd: ArchivalCommand) -> Result<()> {
    match cmd {
        ArchivalCommand::Insert { agent, text } => {
            let agent = resolve_agent(client, &agent).await?;
            let passages = client.insert_archival_memory(&agent.id, &text).await?;
            for passage in passages {
                println!("{} {}", "Stored".bright_cyan(), passage.id.bright_blue());
            }
        }
        ArchivalCommand::List { agent } => {
            let agent = resolve_agent(client, &agent).await?;
            for passage in client.get_archival_memory(&agent.id).await? {
                println!(
                    "{} {}",
                    passage.id.bright_blue(),
                    truncate_string(&passage.text, 100)
                );
            }
        }
        ArchivalCommand::Delete { agent, passage_id } => {
            let agent = resolve_agent(client, &agent).await?;
            if client
                .delete_archival_memory(&agent.id, &passage_id)
                .await?
            {
                println!("{} {}", "Deleted".red(), passage_id);
            } else {
                println!("{} {}", "No passage".bright_black(), passage_id);
            }
        }
    }
    Ok(())
}

async fn messages(client: &LocalClient, cmd: MessagesCommand) -> Result<()> {
    match cmd {
        MessagesCommand::Send { agent, text, role } => {
            let agent = resolve_agent(client, &agent).await?;
            let message = client.send_message(&agent.id, &text, role).await?;
            println!("{} {}", "Sent".bright_cyan(), message.id.bright_blue());
        }
        MessagesCommand::List { agent, in_context } => {
            let agent = resolve_agent(client, &agent).await?;
            let messages = if in_context {
                client.get_in_context_messages(&agent.id).await?
            } else {
                client.get_messages(&agent.id).await?
            };
            for message in messages {
                let role = match message.role {
                    MessageRole::System => message.role.to_string().bright_black(),
                    MessageRole::User => message.role.to_string().bright_green(),
                    MessageRole::Assistant => message.role.to_string().bright_cyan(),
                    MessageRole::Tool => message.role.to_string().bright_magenta(),
                };
                println!("{} {}", role.bold(), truncate_string(&message.text, 120));
            }
        }
    }
    Ok(())
}
