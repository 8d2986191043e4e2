use std::{fs::{self, File}, path::{Path, PathBuf}, sync::Mutex};

use anyhow::{anyhow, Context, Result};
use apple_snake::{game::SnakeGame, term::TermManager, Direction, GameEngine, GameOptions, Position};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apple-snake")]
#[command(version, about = "Steer the snake to the apples without hitting the wall")]
struct Cli {
    /// JSON file with game options; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Board width, in the same unit as the cell size
    #[arg(long)]
    width: Option<u32>,

    /// Board height, in the same unit as the cell size
    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    cell_size: Option<u32>,

    /// Cells per second, below 1000
    #[arg(long)]
    velocity: Option<u32>,

    /// Starting row (needs --col)
    #[arg(long, requires = "col")]
    row: Option<i32>,

    /// Starting column (needs --row)
    #[arg(long, requires = "row")]
    col: Option<i32>,

    /// up, down, left or right
    #[arg(long)]
    direction: Option<Direction>,

    /// Seed for apple placement
    #[arg(long)]
    seed: Option<u64>,

    /// Announce a loss with a blocking alert instead of the status line
    #[arg(long)]
    no_fail_board: bool,

    /// Write logs here (filter with SNAKE_LOG)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> Result<GameOptions> {
        let mut options = match &self.config {
            Some(path) => load_options(path)?,
            None => GameOptions::default(),
        };

        if let Some(width) = self.width {
            options.board_width = width;
        }
        if let Some(height) = self.height {
            options.board_height = height;
        }
        if let Some(cell_size) = self.cell_size {
            options.cell_size = cell_size;
        }
        if let Some(velocity) = self.velocity {
            options.velocity = velocity;
        }
        if let (Some(row), Some(col)) = (self.row, self.col) {
            options.initial_position = Some(Position::new(row, col));
        }
        if let Some(direction) = self.direction {
            options.initial_direction = direction;
        }
        if self.seed.is_some() {
            options.seed = self.seed;
        }

        Ok(options)
    }
}

fn load_options(path: &Path) -> Result<GameOptions> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_env("SNAKE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The game owns the terminal, so logs only go to a file.
    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }

    let options = cli.options()?;
    let engine = GameEngine::new(&options).context("Invalid game options")?;

    let term = TermManager::new().context("Failed to read terminal size")?;
    let mut game = SnakeGame::new(term, engine, !cli.no_fail_board)?;

    game.term_mut().setup().context("Failed to set up terminal")?;
    let played = game.play();
    let restored = game.term_mut().restore().context("Failed to restore terminal");

    finish(played, restored)
}

/// Combines the outcome of the game with that of restoring the terminal,
/// keeping the game's error in front when both fail.
fn finish(played: Result<()>, restored: Result<()>) -> Result<()> {
    match (played, restored) {
        (Err(err), Err(restore_err)) => Err(anyhow!("{:#}; terminal not restored: {:#}", err, restore_err)),
        (Err(err), Ok(())) => Err(err),
        (Ok(()), restored) => restored,
    }
}
