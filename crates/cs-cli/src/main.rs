//! canvas-sync command line.
//!
//! Runs an import against an in-memory board and prints the resulting
//! board as JSON. A previous board dump can be fed back with `--board` to
//! exercise re-imports and the existing-node modes.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cs_core::{ColumnMapping, GraphData, Row, SyncConfig, TemplateRegistry, Widget, diff, rows_to_graph};
use cs_engine::{
    Board, ExistingMode, GraphProcessor, HierarchyProcessor, MemoryCanvas, ProcessOptions, ProcessReport,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Synchronize structured data onto a canvas board
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a `{ nodes, edges }` graph document
    Graph {
        file: PathBuf,
        #[command(flatten)]
        import: ImportArgs,
    },
    /// Import a nested `{ label, children }` hierarchy document
    Hierarchy {
        file: PathBuf,
        #[command(flatten)]
        import: ImportArgs,
    },
    /// Import spreadsheet rows (a JSON array of objects)
    Rows {
        file: PathBuf,
        /// Column holding the row id (default: 1-based row number)
        #[arg(long)]
        id_column: Option<String>,
        /// Column holding the widget label
        #[arg(long, default_value = "name")]
        label_column: String,
        /// Column naming the template per row
        #[arg(long)]
        template_column: Option<String>,
        /// Columns copied into widget metadata
        #[arg(long = "meta", value_delimiter = ',')]
        metadata_columns: Vec<String>,
        #[command(flatten)]
        import: ImportArgs,
    },
    /// Compare the nodes of two graph documents by id
    Diff { original: PathBuf, modified: PathBuf },
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// What to do with nodes already on the board: ignore, move or layout
    #[arg(long, default_value_t = ExistingMode::Ignore)]
    mode: ExistingMode,
    /// Wrap the result in a frame with this title
    #[arg(long)]
    frame: Option<String>,
    /// Sync configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Template registry (JSON); merged over the built-in templates
    #[arg(long)]
    templates: Option<PathBuf>,
    /// Existing board contents: a JSON array of widgets
    #[arg(long)]
    board: Option<PathBuf>,
    /// Undo the import right after it commits
    #[arg(long)]
    undo: bool,
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

impl ImportArgs {
    fn options(&self) -> ProcessOptions {
        ProcessOptions {
            existing_mode: self.mode,
            create_frame: self.frame.is_some(),
            frame_title: self.frame.clone(),
        }
    }

    fn canvas(&self) -> Result<Arc<MemoryCanvas>> {
        let widgets: Vec<Widget> = match &self.board {
            Some(path) => serde_json::from_str(&read(path)?).context("parsing board")?,
            None => Vec::new(),
        };
        log::debug!("seeding board with {} widget(s)", widgets.len());
        Ok(Arc::new(MemoryCanvas::with_widgets(widgets)))
    }

    fn config(&self) -> Result<SyncConfig> {
        match &self.config {
            Some(path) => Ok(SyncConfig::from_json(&read(path)?)?),
            None => Ok(SyncConfig::default()),
        }
    }

    fn board(&self, canvas: Arc<MemoryCanvas>) -> Result<Board> {
        let config = self.config()?;
        let mut templates = TemplateRegistry::builtin();
        if let Some(path) = &self.templates {
            let extra = TemplateRegistry::from_json(&read(path)?)?;
            templates.tokens.extend(extra.tokens);
            for t in extra.templates.into_values() {
                templates.insert(t);
            }
            for c in extra.connectors.into_values() {
                templates.insert_connector(c);
            }
        }
        Ok(Board::new(canvas, Arc::new(templates), config))
    }
}

fn print_board(canvas: &MemoryCanvas, report: &ProcessReport, undone: Option<usize>) -> Result<()> {
    let out = json!({
        "report": report,
        "undone": undone,
        "widgets": canvas.widgets(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn import_graph(graph: &GraphData, args: &ImportArgs) -> Result<()> {
    let canvas = args.canvas()?;
    let mut proc = GraphProcessor::new(args.board(canvas.clone())?);
    let report = proc.process_graph(graph, &args.options()).await?;
    let undone = if args.undo { Some(proc.undo_last().await?) } else { None };
    print_board(&canvas, &report, undone)
}

async fn import_hierarchy(text: &str, args: &ImportArgs) -> Result<()> {
    let canvas = args.canvas()?;
    let mut proc = HierarchyProcessor::new(args.board(canvas.clone())?);
    let report = proc.process_hierarchy_json(text, &args.options()).await?;
    let undone = if args.undo { Some(proc.undo_last().await?) } else { None };
    print_board(&canvas, &report, undone)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Graph { file, import } => {
            let graph = GraphData::from_json(&read(&file)?)?;
            import_graph(&graph, &import).await
        }
        Command::Hierarchy { file, import } => import_hierarchy(&read(&file)?, &import).await,
        Command::Rows {
            file,
            id_column,
            label_column,
            template_column,
            metadata_columns,
            import,
        } => {
            let rows: Vec<Row> = serde_json::from_str(&read(&file)?).context("parsing rows")?;
            let mapping = ColumnMapping {
                id_column,
                label_column: Some(label_column),
                template_column,
                text_column: None,
                metadata_columns,
            };
            let config = import.config()?;
            let graph = rows_to_graph(&rows, &mapping, &config.default_node_type)?;
            import_graph(&graph, &import).await
        }
        Command::Diff { original, modified } => {
            let original = GraphData::from_json(&read(&original)?)?;
            let modified = GraphData::from_json(&read(&modified)?)?;
            let result = diff(&original.nodes, &modified.nodes);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}
