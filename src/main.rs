//! phpunit-mate CLI - PHPUnit test execution for AI agents.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use phpunit_mate::config::{self, DEFAULT_SETTINGS_FILE, Settings};
use phpunit_mate::format::{Formatter, JsonEncoder};
use phpunit_mate::mcp::McpServer;
use phpunit_mate::tools::{
    ListTestsParams, RunFileParams, RunMethodParams, RunSuiteParams, ToolRegistry, Toolbox,
};

#[derive(Parser)]
#[command(name = "phpunit-mate")]
#[command(about = "Token-efficient PHPUnit test execution for AI agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file path (defaults are used when it doesn't exist)
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Project root, overriding the settings file
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON instead of TOON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tools over MCP on stdin/stdout
    Serve,

    /// Run the full test suite
    Run {
        /// PHPUnit configuration file (detected when omitted)
        #[arg(short, long)]
        configuration: Option<String>,

        /// PHPUnit --filter pattern
        #[arg(short, long)]
        filter: Option<String>,

        /// Stop on the first failure
        #[arg(long)]
        stop_on_failure: bool,

        /// Output mode (default, summary, detailed, by-file, by-class)
        #[arg(short, long, default_value = "default")]
        mode: String,
    },

    /// Run the tests of one file
    RunFile {
        /// Test file path relative to the project root
        file: String,

        /// PHPUnit --filter pattern
        #[arg(short, long)]
        filter: Option<String>,

        /// Stop on the first failure
        #[arg(long)]
        stop_on_failure: bool,

        /// Output mode (default, summary, detailed, by-file, by-class)
        #[arg(short, long, default_value = "default")]
        mode: String,
    },

    /// Run a single test method
    RunMethod {
        /// Fully qualified test class
        class: String,

        /// Test method name
        method: String,

        /// Output mode (default, summary, detailed, by-file, by-class)
        #[arg(short, long, default_value = "default")]
        mode: String,
    },

    /// List discoverable tests without running them
    List {
        /// Directory relative to the project root
        #[arg(short, long)]
        directory: Option<String>,
    },

    /// Show the detected PHPUnit configuration
    Config,

    /// List the tools exposed over MCP
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results and the MCP channel.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = config::load_settings_or_default(&cli.settings)?;
    let project_root = match &cli.root {
        Some(root) => root.clone(),
        None => settings.project_root()?,
    };

    let registry = build_registry(&settings, &project_root, cli.json);

    match cli.command {
        Commands::Serve => serve(registry, &project_root).await,
        Commands::Run {
            configuration,
            filter,
            stop_on_failure,
            mode,
        } => {
            let params = RunSuiteParams {
                configuration,
                filter,
                stop_on_failure,
                mode: Some(mode),
            };
            print_output(registry.toolbox().run_suite(params).await?)
        }
        Commands::RunFile {
            file,
            filter,
            stop_on_failure,
            mode,
        } => {
            let params = RunFileParams {
                file: Some(file),
                filter,
                stop_on_failure,
                mode: Some(mode),
            };
            print_output(registry.toolbox().run_file(params).await?)
        }
        Commands::RunMethod {
            class,
            method,
            mode,
        } => {
            let params = RunMethodParams {
                class: Some(class),
                method: Some(method),
                mode: Some(mode),
            };
            print_output(registry.toolbox().run_method(params).await?)
        }
        Commands::List { directory } => {
            print_output(registry.toolbox().list_tests(ListTestsParams { directory })?)
        }
        Commands::Config => print_output(registry.toolbox().config_report()?),
        Commands::Tools => list_tools(&registry, cli.json),
    }
}

fn build_registry(settings: &Settings, project_root: &Path, json: bool) -> ToolRegistry {
    let mut toolbox = Toolbox::from_settings(settings, project_root);
    if json {
        toolbox = toolbox.with_formatter(Formatter::with_encoder(JsonEncoder));
    }
    ToolRegistry::new(toolbox)
}

async fn serve(registry: ToolRegistry, project_root: &Path) -> Result<()> {
    info!("Serving PHPUnit tools for {}", project_root.display());

    McpServer::new(registry)
        .serve_stdio()
        .await
        .context("MCP server failed")
}

fn print_output(output: String) -> Result<()> {
    println!("{}", output);
    Ok(())
}

fn list_tools(registry: &ToolRegistry, json: bool) -> Result<()> {
    let tools: Vec<_> = registry.definitions().collect();

    if json {
        let output = serde_json::to_string_pretty(&serde_json::json!({
            "tools": tools,
            "count": tools.len()
        }))?;
        println!("{}", output);
    } else {
        println!("Available MCP Tools:\n");
        for tool in &tools {
            println!("  {} - {}", tool.name, tool.description);
        }
        println!("\n{} tools available.", tools.len());
    }

    Ok(())
}
