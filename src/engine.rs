use std::{sync::mpsc::Sender, time::{Duration, Instant}};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info, trace};

use crate::config::{ConfigError, GameOptions, START_DELAY};
use crate::snake::{Bound, Direction, Position};

pub const LOSS_MESSAGE: &str = "You Lost 😢";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Moved,
    /// The apple was under the snake before this move.
    Captured,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Started,
    Moved { from: Position, to: Position, direction: Direction },
    Captured { score: u32, apple: Position },
    Lost { snake: Position, score: u32 },
    Stopped,
    /// Snake and score went back to their initial values; any loss display
    /// should be cleared.
    Reset { snake: Position, apple: Position, score: u32 },
}

/// Presentation side of the engine. Implementors get every state change in
/// the order it happened.
pub trait Observer {
    fn notify(&mut self, event: &GameEvent);
}

impl Observer for Sender<GameEvent> {
    fn notify(&mut self, event: &GameEvent) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.send(event.clone());
    }
}

/// The one timer slot an engine owns. Holding it in an `Option` keeps a
/// second tick stream from ever existing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Timer {
    Starting { at: Instant },
    Ticking { next: Instant },
}

pub struct GameEngine {
    bound: Bound,
    initial_position: Position,
    snake: Position,
    apple: Position,
    direction: Direction,
    score: u32,
    tick_interval: Duration,
    timer: Option<Timer>,
    needs_reset: bool,
    rng: StdRng,
    observers: Vec<Box<dyn Observer>>,
}

impl GameEngine {
    pub fn new(options: &GameOptions) -> Result<Self, ConfigError> {
        let settings = options.validate()?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut engine = GameEngine {
            bound: settings.bound,
            initial_position: settings.initial_position,
            snake: settings.initial_position,
            apple: settings.initial_position,
            direction: settings.initial_direction,
            score: 0,
            tick_interval: settings.tick_interval,
            timer: None,
            needs_reset: false,
            rng,
            observers: vec![],
        };
        engine.apple = engine.random_apple();

        debug!(bound = %engine.bound, snake = %engine.snake, apple = %engine.apple, "game created");
        Ok(engine)
    }

    pub fn subscribe(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Arms the start delay, or resets the game if it is already running or
    /// has been lost.
    pub fn start(&mut self, now: Instant) {
        if self.needs_reset || self.run_state() == RunState::Running {
            self.reset();
            return;
        }

        if self.is_start_pending() {
            debug!("start already pending");
            return;
        }

        debug!(delay = ?START_DELAY, interval = ?self.tick_interval, "start armed");
        self.timer = Some(Timer::Starting { at: now + START_DELAY });
    }

    pub fn stop(&mut self) {
        if self.timer.take().is_some() {
            debug!(snake = %self.snake, score = self.score, "stopped");
            self.emit(GameEvent::Stopped);
        }
    }

    pub fn change_direction(&mut self, requested: Direction) {
        if self.direction.is_orthogonal(requested) {
            trace!(from = %self.direction, to = %requested, "direction changed");
            self.direction = requested;
        }
    }

    pub fn is_captured(&self) -> bool {
        self.snake == self.apple
    }

    /// Drives the timer slot up to `now`: promotes a pending start once its
    /// delay has elapsed and fires the tick that has come due, if any.
    /// Deadlines missed while the host was busy are skipped, never replayed,
    /// so a call fires at most one tick. Returns the number of ticks fired.
    pub fn update(&mut self, now: Instant) -> usize {
        if let Some(Timer::Starting { at }) = self.timer {
            if now < at {
                return 0;
            }
            self.timer = Some(Timer::Ticking { next: at + self.tick_interval });
            info!(snake = %self.snake, direction = %self.direction, "game running");
            self.emit(GameEvent::Started);
        }

        match self.timer {
            Some(Timer::Ticking { next }) if next <= now => {
                self.timer = Some(Timer::Ticking { next: self.following_deadline(next, now) });
                self.tick();
                1
            }
            _ => 0,
        }
    }

    /// One simulation step. The edge and capture checks both look at the
    /// position *before* the move, so a capture registers on the tick after
    /// the snake reached the apple.
    pub fn tick(&mut self) -> TickOutcome {
        if self.bound.is_at_edge(self.snake, self.direction) {
            self.lose();
            return TickOutcome::Lost;
        }

        let captured = self.is_captured();
        if captured {
            self.capture();
        }

        let from = self.snake;
        self.snake = from.moved(self.direction);
        trace!(snake = %self.snake, "tick");
        self.emit(GameEvent::Moved { from, to: self.snake, direction: self.direction });

        if captured {
            TickOutcome::Captured
        } else {
            TickOutcome::Moved
        }
    }

    pub fn bound(&self) -> Bound {
        self.bound
    }

    pub fn snake(&self) -> Position {
        self.snake
    }

    pub fn apple(&self) -> Position {
        self.apple
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn run_state(&self) -> RunState {
        match self.timer {
            Some(Timer::Ticking { .. }) => RunState::Running,
            _ => RunState::Stopped,
        }
    }

    pub fn is_start_pending(&self) -> bool {
        matches!(self.timer, Some(Timer::Starting { .. }))
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    ///////////////////////////////////////////////////////////////////////////

    fn lose(&mut self) {
        self.timer = None;
        self.needs_reset = true;
        info!(snake = %self.snake, direction = %self.direction, score = self.score, "game lost");

        if self.observers.is_empty() {
            eprintln!("{}", LOSS_MESSAGE);
        }
        self.emit(GameEvent::Lost { snake: self.snake, score: self.score });
    }

    fn capture(&mut self) {
        self.score += 1;
        self.apple = self.random_apple();
        info!(score = self.score, apple = %self.apple, "apple captured");
        self.emit(GameEvent::Captured { score: self.score, apple: self.apple });
    }

    fn reset(&mut self) {
        self.timer = None;
        self.needs_reset = false;
        self.snake = self.initial_position;
        self.score = 0;
        debug!(snake = %self.snake, "game reset");
        self.emit(GameEvent::Reset { snake: self.snake, apple: self.apple, score: self.score });
    }

    /// First deadline on the tick grid after `now`, given that `due` fired.
    fn following_deadline(&self, due: Instant, now: Instant) -> Instant {
        let late = now.saturating_duration_since(due);
        let missed = late.as_nanos() / self.tick_interval.as_nanos();
        if missed > 0 {
            debug!(missed = missed as u64, "skipping missed ticks");
        }

        u32::try_from(missed + 1)
            .ok()
            .and_then(|steps| self.tick_interval.checked_mul(steps))
            .and_then(|offset| due.checked_add(offset))
            .unwrap_or(now + self.tick_interval)
    }

    fn random_apple(&mut self) -> Position {
        let row = self.rng.gen_range(self.bound.top..self.bound.bottom);
        let col = self.rng.gen_range(self.bound.left..self.bound.right);
        Position::new(row, col)
    }

    fn emit(&mut self, event: GameEvent) {
        for observer in self.observers.iter_mut() {
            observer.notify(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{channel, Receiver};

    use super::*;
    use crate::config::TICK_BASE_RATE;
    use crate::snake::Direction::*;

    fn options(row: i32, col: i32, direction: Direction) -> GameOptions {
        GameOptions {
            initial_position: Some(Position::new(row, col)),
            initial_direction: direction,
            seed: Some(7),
            ..Default::default()
        }
    }

    fn engine_with_events(options: &GameOptions) -> (GameEngine, Receiver<GameEvent>) {
        let mut engine = GameEngine::new(options).unwrap();
        let (tx, rx) = channel();
        engine.subscribe(Box::new(tx));
        (engine, rx)
    }

    /// Starts the engine and lets the start delay pass, leaving it right
    /// before its first tick.
    fn running(engine: &mut GameEngine) -> Instant {
        let t0 = Instant::now();
        engine.start(t0);
        assert_eq!(engine.update(t0 + START_DELAY), 0);
        assert_eq!(engine.run_state(), RunState::Running);
        t0 + START_DELAY
    }

    #[test]
    fn test_new_game() {
        let engine = GameEngine::new(&GameOptions::default()).unwrap();

        assert_eq!(engine.run_state(), RunState::Stopped);
        assert_eq!(engine.score(), 0);
        assert_eq!(engine.snake(), Position::new(20, 20));
        assert_eq!(engine.direction(), Down);
        assert!(engine.bound().contains(engine.apple()));
        assert!(!engine.has_timer());
    }

    #[test]
    fn test_new_rejects_fast_velocity() {
        let options = GameOptions { velocity: TICK_BASE_RATE + 5, ..Default::default() };
        assert!(matches!(GameEngine::new(&options), Err(ConfigError::VelocityTooHigh { .. })));
    }

    #[test]
    fn test_change_direction() {
        let mut engine = GameEngine::new(&options(5, 5, Down)).unwrap();

        engine.change_direction(Up);
        assert_eq!(engine.direction(), Down);
        engine.change_direction(Down);
        assert_eq!(engine.direction(), Down);

        engine.change_direction(Left);
        assert_eq!(engine.direction(), Left);
        engine.change_direction(Right);
        assert_eq!(engine.direction(), Left);

        engine.change_direction(Up);
        assert_eq!(engine.direction(), Up);
    }

    #[test]
    fn test_change_direction_every_pair() {
        for current in Direction::ALL {
            for requested in Direction::ALL {
                let mut engine = GameEngine::new(&options(5, 5, current)).unwrap();
                engine.change_direction(requested);

                let expected = if current.is_orthogonal(requested) { requested } else { current };
                assert_eq!(engine.direction(), expected, "{} -> {}", current, requested);
            }
        }
    }

    #[test]
    fn test_start_waits_for_delay() {
        let mut engine = GameEngine::new(&GameOptions::default()).unwrap();
        let t0 = Instant::now();

        engine.start(t0);
        assert!(engine.is_start_pending());
        assert_eq!(engine.run_state(), RunState::Stopped);

        assert_eq!(engine.update(t0 + START_DELAY - Duration::from_millis(1)), 0);
        assert_eq!(engine.run_state(), RunState::Stopped);

        assert_eq!(engine.update(t0 + START_DELAY), 0);
        assert_eq!(engine.run_state(), RunState::Running);
        assert!(!engine.is_start_pending());
    }

    #[test]
    fn test_first_interval_moves_down() {
        let mut engine = GameEngine::new(&options(20, 20, Down)).unwrap();
        assert_eq!(engine.tick_interval(), Duration::from_millis(50));

        let t = running(&mut engine);
        assert_eq!(engine.update(t + Duration::from_millis(49)), 0);
        assert_eq!(engine.update(t + Duration::from_millis(50)), 1);

        assert_eq!(engine.snake(), Position::new(21, 20));
        assert_eq!(engine.score(), 0);
        assert_eq!(engine.run_state(), RunState::Running);
    }

    #[test]
    fn test_stall_fires_single_tick() {
        let mut engine = GameEngine::new(&options(20, 5, Right)).unwrap();
        engine.apple = Position::new(0, 0);

        let t = running(&mut engine);
        assert_eq!(engine.update(t + Duration::from_secs(2)), 1);
        assert_eq!(engine.snake(), Position::new(20, 6));
        assert_eq!(engine.run_state(), RunState::Running);

        // The missed deadlines are dropped; the next one stays on the
        // 50 ms grid after the stall.
        assert_eq!(engine.update(t + Duration::from_millis(2049)), 0);
        assert_eq!(engine.update(t + Duration::from_millis(2050)), 1);
        assert_eq!(engine.snake(), Position::new(20, 7));
    }

    #[test]
    fn test_late_tick_keeps_grid() {
        let mut engine = GameEngine::new(&options(20, 5, Right)).unwrap();
        engine.apple = Position::new(0, 0);

        let t = running(&mut engine);
        assert_eq!(engine.update(t + Duration::from_millis(60)), 1);
        assert_eq!(engine.update(t + Duration::from_millis(99)), 0);
        assert_eq!(engine.update(t + Duration::from_millis(100)), 1);
        assert_eq!(engine.snake(), Position::new(20, 7));
    }

    #[test]
    fn test_interior_tick_advances_one_cell() {
        for direction in Direction::ALL {
            let mut engine = GameEngine::new(&options(10, 10, direction)).unwrap();
            engine.apple = Position::new(0, 0);
            running(&mut engine);

            assert_eq!(engine.tick(), TickOutcome::Moved);
            assert_eq!(engine.snake(), Position::new(10, 10).moved(direction));
            assert_eq!(engine.run_state(), RunState::Running);
        }
    }

    #[test]
    fn test_edge_tick_loses_without_moving() {
        let (mut engine, rx) = engine_with_events(&options(39, 5, Down));
        let t = running(&mut engine);

        assert_eq!(engine.update(t + engine.tick_interval()), 1);

        assert_eq!(engine.snake(), Position::new(39, 5));
        assert_eq!(engine.run_state(), RunState::Stopped);
        assert!(!engine.has_timer());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![GameEvent::Started, GameEvent::Lost { snake: Position::new(39, 5), score: 0 }]
        );

        // No zombie ticks after the loss.
        assert_eq!(engine.update(t + Duration::from_secs(5)), 0);
        assert_eq!(engine.snake(), Position::new(39, 5));
    }

    #[test]
    fn test_every_edge_loses() {
        let cases = [
            (Position::new(0, 7), Up),
            (Position::new(39, 7), Down),
            (Position::new(7, 0), Left),
            (Position::new(7, 39), Right),
        ];

        for (pos, direction) in cases {
            let mut engine = GameEngine::new(&options(pos.row, pos.col, direction)).unwrap();
            running(&mut engine);

            assert_eq!(engine.tick(), TickOutcome::Lost);
            assert_eq!(engine.snake(), pos);
            assert!(!engine.has_timer());
        }
    }

    #[test]
    fn test_capture_checks_before_moving() {
        let (mut engine, rx) = engine_with_events(&options(10, 10, Right));
        engine.apple = Position::new(10, 10);
        assert!(engine.is_captured());
        running(&mut engine);

        assert_eq!(engine.tick(), TickOutcome::Captured);

        assert_eq!(engine.score(), 1);
        assert_eq!(engine.snake(), Position::new(10, 11));
        assert!(engine.bound().contains(engine.apple()));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], GameEvent::Captured { score: 1, apple: engine.apple() });
        assert_eq!(
            events[2],
            GameEvent::Moved { from: Position::new(10, 10), to: Position::new(10, 11), direction: Right }
        );
    }

    #[test]
    fn test_capture_lags_one_tick() {
        let mut engine = GameEngine::new(&options(10, 10, Right)).unwrap();
        engine.apple = Position::new(10, 11);
        running(&mut engine);

        // Moving onto the apple does not score yet.
        assert_eq!(engine.tick(), TickOutcome::Moved);
        assert_eq!(engine.score(), 0);
        assert!(engine.is_captured());

        assert_eq!(engine.tick(), TickOutcome::Captured);
        assert_eq!(engine.score(), 1);
        assert_eq!(engine.snake(), Position::new(10, 12));
    }

    #[test]
    fn test_edge_beats_capture() {
        let mut engine = GameEngine::new(&options(39, 5, Down)).unwrap();
        engine.apple = Position::new(39, 5);
        running(&mut engine);

        assert_eq!(engine.tick(), TickOutcome::Lost);
        assert_eq!(engine.score(), 0);
    }

    #[test]
    fn test_apples_stay_in_bounds() {
        let options = GameOptions { board_width: 30, board_height: 20, seed: Some(1), ..options(1, 1, Right) };
        let mut engine = GameEngine::new(&options).unwrap();

        for _ in 0..500 {
            let apple = engine.random_apple();
            assert!(engine.bound().contains(apple), "{} outside {}", apple, engine.bound());
        }
    }

    #[test]
    fn test_stop_cancels_timer_and_keeps_state() {
        let (mut engine, rx) = engine_with_events(&options(10, 10, Right));
        engine.apple = Position::new(0, 0);
        let t = running(&mut engine);
        engine.update(t + Duration::from_millis(50));
        engine.update(t + Duration::from_millis(100));
        assert_eq!(engine.snake(), Position::new(10, 12));

        engine.stop();
        assert_eq!(engine.run_state(), RunState::Stopped);
        assert!(!engine.has_timer());
        assert_eq!(engine.update(t + Duration::from_secs(1)), 0);
        assert_eq!(engine.snake(), Position::new(10, 12));
        assert_eq!(rx.try_iter().last(), Some(GameEvent::Stopped));
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let (mut engine, rx) = engine_with_events(&GameOptions::default());

        engine.stop();
        engine.stop();

        assert_eq!(engine.run_state(), RunState::Stopped);
        assert!(!engine.has_timer());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_cancels_pending_start() {
        let mut engine = GameEngine::new(&GameOptions::default()).unwrap();
        let t0 = Instant::now();

        engine.start(t0);
        engine.stop();

        assert_eq!(engine.update(t0 + Duration::from_secs(1)), 0);
        assert_eq!(engine.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_start_after_stop_resumes() {
        let mut engine = GameEngine::new(&options(10, 10, Right)).unwrap();
        engine.apple = Position::new(0, 0);
        let t = running(&mut engine);
        engine.update(t + Duration::from_millis(50));
        engine.stop();

        let t1 = t + Duration::from_secs(1);
        engine.start(t1);
        assert!(engine.is_start_pending());
        assert_eq!(engine.update(t1 + START_DELAY + Duration::from_millis(50)), 1);
        assert_eq!(engine.snake(), Position::new(10, 12));
    }

    #[test]
    fn test_second_start_while_running_resets() {
        let (mut engine, rx) = engine_with_events(&options(10, 10, Right));
        engine.apple = Position::new(10, 10);
        let t = running(&mut engine);
        engine.update(t + Duration::from_millis(50));
        assert_eq!(engine.score(), 1);
        assert_eq!(engine.snake(), Position::new(10, 11));

        engine.start(t + Duration::from_millis(60));

        assert_eq!(engine.run_state(), RunState::Stopped);
        assert!(!engine.has_timer());
        assert_eq!(engine.snake(), Position::new(10, 10));
        assert_eq!(engine.score(), 0);
        assert_eq!(
            rx.try_iter().last(),
            Some(GameEvent::Reset { snake: Position::new(10, 10), apple: engine.apple(), score: 0 })
        );
    }

    #[test]
    fn test_start_after_loss_resets_then_starts() {
        let mut engine = GameEngine::new(&options(39, 5, Down)).unwrap();
        let t = running(&mut engine);
        engine.update(t + Duration::from_millis(50));
        assert!(!engine.has_timer());

        engine.start(t + Duration::from_secs(1));
        assert!(!engine.has_timer());
        assert_eq!(engine.snake(), Position::new(39, 5));

        engine.start(t + Duration::from_secs(2));
        assert!(engine.is_start_pending());
    }

    #[test]
    fn test_loss_without_observers() {
        let mut engine = GameEngine::new(&options(0, 5, Up)).unwrap();
        assert!(engine.observers.is_empty());
        let t = running(&mut engine);

        assert_eq!(engine.update(t + Duration::from_millis(50)), 1);

        assert_eq!(engine.snake(), Position::new(0, 5));
        assert!(!engine.has_timer());
        assert!(engine.needs_reset);
        assert_eq!(engine.run_state(), RunState::Stopped);

        engine.start(t + Duration::from_secs(1));
        assert!(!engine.needs_reset);
        assert!(!engine.has_timer());
    }

    #[test]
    fn test_repeated_start_keeps_single_timer() {
        let mut engine = GameEngine::new(&options(5, 5, Right)).unwrap();
        engine.apple = Position::new(30, 30);
        let t0 = Instant::now();

        engine.start(t0);
        engine.start(t0 + Duration::from_millis(100));
        assert!(engine.is_start_pending());

        // Only the first arming counts: one tick per interval after it.
        assert_eq!(engine.update(t0 + START_DELAY + Duration::from_millis(50)), 1);
        assert_eq!(engine.snake(), Position::new(5, 6));
    }

    #[test]
    fn test_direction_change_visible_to_next_tick() {
        let mut engine = GameEngine::new(&options(10, 10, Down)).unwrap();
        engine.apple = Position::new(0, 0);
        let t = running(&mut engine);

        engine.update(t + Duration::from_millis(50));
        engine.change_direction(Right);
        engine.update(t + Duration::from_millis(100));

        assert_eq!(engine.snake(), Position::new(11, 11));
    }
}
