use std::{io, sync::mpsc::{channel, Receiver}, thread::sleep, time::{Duration, Instant}};

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::engine::{GameEngine, GameEvent, LOSS_MESSAGE};
use crate::input::{map_key, KeyAction};
use crate::snake::Position;
use crate::term::TermManager;
use crate::{Coords, TermInt};

const POLL_INTERVAL_MS: u64 = 5;

const APPLE_CHAR: char = 'O';
const EMPTY_CHAR: char = ' ';

/// Terminal front end. Owns the engine, forwards key presses to it from a
/// single polling loop and draws whatever the engine reports.
pub struct SnakeGame {
    term: TermManager,
    engine: GameEngine,
    events: Receiver<GameEvent>,
    /// Show losses on a status line instead of a blocking alert.
    fail_board: bool,
    board_size: Coords,
}

impl SnakeGame {
    pub fn new(term: TermManager, mut engine: GameEngine, fail_board: bool) -> Result<Self> {
        let bound = engine.bound();
        let board_size = (
            TermInt::try_from(bound.cols() + 2)?,
            TermInt::try_from(bound.rows() + 2)?,
        );

        if !fits_terminal(board_size, term.size()) {
            let (term_w, term_h) = term.size();
            bail!(
                "board of {}x{} cells does not fit in a {}x{} terminal",
                bound.cols(), bound.rows(), term_w, term_h
            );
        }

        let (tx, events) = channel();
        engine.subscribe(Box::new(tx));

        Ok(SnakeGame { term, engine, events, fail_board, board_size })
    }

    pub fn term_mut(&mut self) -> &mut TermManager {
        &mut self.term
    }

    pub fn play(&mut self) -> Result<()> {
        self.draw_board()?;
        self.show_help()?;

        loop {
            sleep(Duration::from_millis(POLL_INTERVAL_MS));

            for key_ev in self.term.read_key_events_queue()? {
                match map_key(&key_ev) {
                    KeyAction::Quit => return Ok(()),
                    KeyAction::Start => {
                        self.term.hide_message()?;
                        self.engine.start(Instant::now());
                    }
                    KeyAction::Stop => self.engine.stop(),
                    KeyAction::Turn(dir) => self.engine.change_direction(dir),
                    KeyAction::None => {}
                }
            }

            self.engine.update(Instant::now());
            self.render_events()?;
        }
    }

    ///////////////////////////////////////////////////////////////////////////

    fn render_events(&mut self) -> Result<()> {
        let pending: Vec<GameEvent> = self.events.try_iter().collect();
        if pending.is_empty() {
            return Ok(());
        }

        for event in pending {
            match event {
                GameEvent::Started => self.print_status("")?,
                GameEvent::Moved { from, to, direction } => {
                    let under = if from == self.engine.apple() { APPLE_CHAR } else { EMPTY_CHAR };
                    self.print_cell(from, under)?;
                    self.print_cell(to, direction.head_char())?;
                }
                GameEvent::Captured { score, apple } => {
                    self.print_cell(apple, APPLE_CHAR)?;
                    self.print_score(score)?;
                }
                GameEvent::Lost { score, .. } => self.show_loss(score)?,
                GameEvent::Stopped => self.print_status("Paused, Enter to resume")?,
                GameEvent::Reset { .. } => self.draw_board()?,
            }
        }

        self.term.flush()?;
        Ok(())
    }

    fn draw_board(&mut self) -> io::Result<()> {
        self.term.clear()?;
        self.term.draw_borders(self.board_size)?;

        self.print_cell(self.engine.apple(), APPLE_CHAR)?;
        self.print_cell(self.engine.snake(), self.engine.direction().head_char())?;
        self.print_score(self.engine.score())?;
        self.print_status("")?;

        self.term.flush()
    }

    fn show_help(&mut self) -> io::Result<()> {
        self.term.show_message(&[
            "Arrow keys or WASD to turn",
            "Enter to start, again to reset",
            "Esc to stop, q to quit",
        ])
    }

    fn show_loss(&mut self, score: u32) -> Result<()> {
        info!(score, "showing loss");

        if self.fail_board {
            self.print_status(LOSS_MESSAGE)?;
            return Ok(());
        }

        // Without a fail board the loss blocks until acknowledged.
        self.term.show_message(&[LOSS_MESSAGE, &*format!("Score: {}", score), "", "Press any key"])?;
        let key = self.term.read_key_blocking()?;
        debug!(?key, "loss acknowledged");
        self.term.hide_message()?;
        Ok(())
    }

    fn print_cell(&mut self, pos: Position, ch: char) -> io::Result<()> {
        match self.cell_coords(pos) {
            Some(coords) => self.term.print_at(coords, ch),
            None => Ok(()),
        }
    }

    fn print_score(&mut self, score: u32) -> io::Result<()> {
        self.term.print_line((0, self.board_size.1), &format!("Score: {}", score))
    }

    fn print_status(&mut self, text: &str) -> io::Result<()> {
        self.term.print_line((0, self.board_size.1 + 1), text)
    }

    /// Terminal coordinates of a grid cell, inside the border.
    fn cell_coords(&self, pos: Position) -> Option<Coords> {
        let bound = self.engine.bound();
        if !bound.contains(pos) {
            return None;
        }
        let x = TermInt::try_from(pos.col - bound.left + 1).ok()?;
        let y = TermInt::try_from(pos.row - bound.top + 1).ok()?;
        Some((x, y))
    }
}

/// Whether a bordered board plus the score and status rows below it fit on
/// screen.
fn fits_terminal(board_size: Coords, term_size: Coords) -> bool {
    let rows_needed = u32::from(board_size.1) + 2;
    board_size.0 <= term_size.0 && rows_needed <= u32::from(term_size.1)
}
