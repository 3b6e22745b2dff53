use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use trellis_compiler::{CompileError, Compiler, StaticToolRegistry};
use trellis_engine::Engine;
use trellis_host::{
  MemoryStateClient, NamespacedStateClient, StubToolExecutor, UnsupportedCodeExecutor,
};
use trellis_workflow::Workflow;

/// Trellis - a workflow orchestration engine
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a workflow against structure, tools, and schemas
  Compile {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Path to a tool manifest: {"tool.id": <canned output>, ...}
    #[arg(long)]
    tools: Option<PathBuf>,
  },

  /// Print the workflow tree
  Tree {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Dry-run a workflow with canned tool outputs
  ///
  /// Tool nodes answer from the manifest; code nodes are rejected because
  /// no sandbox runtime is wired into the CLI.
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Path to a tool manifest: {"tool.id": <canned output>, ...}
    #[arg(long)]
    tools: Option<PathBuf>,

    /// Path to the user context JSON (defaults to stdin)
    #[arg(long)]
    context: Option<PathBuf>,

    /// State namespace for the run
    #[arg(long, default_value = "local")]
    namespace: String,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let cli = Cli::parse();
  match cli.command {
    Commands::Compile {
      workflow_file,
      tools,
    } => compile(workflow_file, tools).await,
    Commands::Tree { workflow_file } => {
      let workflow = load_workflow(&workflow_file).await?;
      print!("{}", workflow.render_tree());
      Ok(())
    }
    Commands::Run {
      workflow_file,
      tools,
      context,
      namespace,
    } => run(workflow_file, tools, context, namespace).await,
  }
}

async fn compile(workflow_file: PathBuf, tools: Option<PathBuf>) -> Result<()> {
  let workflow = load_workflow(&workflow_file).await?;
  let manifest = load_manifest(tools.as_deref()).await?;

  let compiler = Compiler::new(StaticToolRegistry::new(manifest.keys().map(String::as_str)));
  match compiler.compile(&workflow).await {
    Ok(_) => {
      println!("workflow '{}' compiles cleanly", workflow.title);
      Ok(())
    }
    Err(CompileError::SchemaMismatch {
      errors,
      suggestions,
    }) => {
      for (error, suggestion) in errors.iter().zip(&suggestions) {
        eprintln!("error: {error}");
        eprintln!("  suggestion: {suggestion}");
      }
      bail!("workflow '{}' has incompatible schemas", workflow.title)
    }
    Err(e) => Err(e).with_context(|| format!("workflow '{}' failed to compile", workflow.title)),
  }
}

async fn run(
  workflow_file: PathBuf,
  tools: Option<PathBuf>,
  context: Option<PathBuf>,
  namespace: String,
) -> Result<()> {
  let workflow = load_workflow(&workflow_file).await?;
  workflow.validate().context("invalid workflow")?;

  let manifest = load_manifest(tools.as_deref()).await?;
  let mut tool_executor = StubToolExecutor::new();
  for (identifier, output) in manifest {
    tool_executor = tool_executor.with_response(identifier, output);
  }

  let user_context = match context {
    Some(path) => {
      let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read context file: {}", path.display()))?;
      serde_json::from_str(&text).context("failed to parse context JSON")?
    }
    None => read_context_from_stdin()?,
  };

  let engine = Engine::new(
    Arc::new(tool_executor),
    Arc::new(UnsupportedCodeExecutor),
    Arc::new(NamespacedStateClient::new(
      MemoryStateClient::new(),
      namespace,
    )),
  );

  let output = engine
    .execute(&workflow, user_context, CancellationToken::new())
    .await
    .context("workflow run failed")?;
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

async fn load_workflow(path: &Path) -> Result<Workflow> {
  let text = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read workflow file: {}", path.display()))?;
  let workflow: Workflow = serde_json::from_str(&text)
    .with_context(|| format!("failed to parse workflow file: {}", path.display()))?;
  Ok(workflow)
}

async fn load_manifest(path: Option<&Path>) -> Result<HashMap<String, serde_json::Value>> {
  let Some(path) = path else {
    return Ok(HashMap::new());
  };
  let text = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read tool manifest: {}", path.display()))?;
  serde_json::from_str(&text).context("failed to parse tool manifest")
}

fn read_context_from_stdin() -> Result<serde_json::Value> {
  let mut buffer = String::new();
  std::io::stdin()
    .read_to_string(&mut buffer)
    .context("failed to read context from stdin")?;
  if buffer.trim().is_empty() {
    return Ok(serde_json::json!({}));
  }
  serde_json::from_str(&buffer).context("failed to parse context JSON from stdin")
}
