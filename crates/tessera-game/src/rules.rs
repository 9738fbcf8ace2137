//! Move and power legality, and their effects.
//!
//! [`apply_action`] validates first and mutates only once every check has
//! passed, so an illegal action leaves the state untouched.

use std::fmt;

use tessera_protocol::UserId;

use crate::model::{GameState, PieceId, PowerId, TileId};
use crate::powers::PowerDefinitions;
use crate::spawn::SpawnPolicy;

/// Something a player can do on their turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Move { piece_id: PieceId, tile_id: TileId },
    ApplyPower { power_id: PowerId },
}

/// Why an action was refused. Expected and frequent, so it is a value
/// rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IllegalAction {
    GameFinished,
    NotYourTurn,
    PieceNotFound,
    TileNotFound,
    PowerNotFound,
    NotYourPiece,
    TileTooHigh,
    PowerNotHeld,
    PowerNotAuthorized,
    UnknownPowerDefinition,
}

impl IllegalAction {
    /// The reason reported to the client.
    pub fn reason(self) -> &'static str {
        match self {
            Self::GameFinished => "Game is finished",
            Self::NotYourTurn => "Not your turn",
            Self::PieceNotFound => "Piece not found",
            Self::TileNotFound => "Tile not found",
            Self::PowerNotFound => "Power not found",
            Self::NotYourPiece => "Not your piece",
            Self::TileTooHigh => "Tile too high",
            Self::PowerNotHeld => "Power is not held",
            Self::PowerNotAuthorized => "Power not authorized",
            Self::UnknownPowerDefinition => "Unknown power",
        }
    }
}

impl fmt::Display for IllegalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// What the engine needs besides the state itself.
pub struct Rules<'a> {
    pub powers: &'a PowerDefinitions,
    pub spawn: &'a mut dyn SpawnPolicy,
}

/// Validates and applies `action` by `actor` against `opponent`.
///
/// On success the turn has passed to `opponent`.
pub fn apply_action(
    state: &mut GameState,
    actor: &UserId,
    opponent: &UserId,
    action: &Action,
    rules: &mut Rules<'_>,
) -> Result<(), IllegalAction> {
    if state.finished {
        return Err(IllegalAction::GameFinished);
    }
    if &state.current_player_id != actor {
        return Err(IllegalAction::NotYourTurn);
    }

    match action {
        Action::Move { piece_id, tile_id } => {
            check_move(state, actor, piece_id, tile_id)?;
            apply_move(state, actor, opponent, piece_id, tile_id, rules);
        }
        Action::ApplyPower { power_id } => {
            check_power(state, actor, power_id, rules.powers)?;
            apply_power(state, power_id, rules.powers)?;
        }
    }

    state.current_player_id = opponent.clone();
    Ok(())
}

fn check_move(
    state: &GameState,
    actor: &UserId,
    piece_id: &PieceId,
    tile_id: &TileId,
) -> Result<(), IllegalAction> {
    let board = &state.board;
    let piece = board.pieces.get(piece_id).ok_or(IllegalAction::PieceNotFound)?;
    let destination = board.tiles.get(tile_id).ok_or(IllegalAction::TileNotFound)?;
    let source = board
        .tiles
        .get(&piece.tile_id)
        .ok_or(IllegalAction::TileNotFound)?;
    if &piece.owner_id != actor {
        return Err(IllegalAction::NotYourPiece);
    }
    if destination.elevation > source.elevation + 1 {
        return Err(IllegalAction::TileTooHigh);
    }
    Ok(())
}

fn apply_move(
    state: &mut GameState,
    actor: &UserId,
    opponent: &UserId,
    piece_id: &PieceId,
    tile_id: &TileId,
    rules: &mut Rules<'_>,
) {
    state.moves_played += 1;
    let board = &mut state.board;

    // Capture by position: a piece counts as "there" if its tile sits at
    // the destination's coordinates, whatever tile id it was recorded on.
    let destination = board.tiles.get(tile_id).map(|t| t.position);
    let captured: Vec<PieceId> = board
        .pieces
        .values()
        .filter(|p| &p.id != piece_id)
        .filter(|p| {
            board.tiles.get(&p.tile_id).map(|t| t.position) == destination
        })
        .map(|p| p.id.clone())
        .collect();
    for id in &captured {
        board.pieces.remove(id);
        tracing::debug!(piece_id = %id, "piece captured");
    }
    board.powers.retain(|_, power| {
        !power.is_held()
            || power.piece_id.as_ref().is_none_or(|h| !captured.contains(h))
    });

    for power in board.powers.values_mut() {
        if power.tile_id.as_ref() == Some(tile_id) {
            power.tile_id = None;
            power.piece_id = Some(piece_id.clone());
            if !power.is_authorized(actor) {
                power.authorized_player_ids.push(actor.clone());
            }
        }
    }

    if let Some(piece) = board.pieces.get_mut(piece_id) {
        piece.tile_id = tile_id.clone();
    }

    if board.piece_count(opponent) == 0 {
        state.finished = true;
        state.winner_id = Some(actor.clone());
    } else {
        rules.spawn.after_move(state, rules.powers);
    }
}

fn check_power(
    state: &GameState,
    actor: &UserId,
    power_id: &PowerId,
    powers: &PowerDefinitions,
) -> Result<(), IllegalAction> {
    let power = state
        .board
        .powers
        .get(power_id)
        .ok_or(IllegalAction::PowerNotFound)?;
    if !power.is_held() {
        return Err(IllegalAction::PowerNotHeld);
    }
    if !power.is_authorized(actor) {
        return Err(IllegalAction::PowerNotAuthorized);
    }
    let holder = power
        .piece_id
        .as_ref()
        .and_then(|id| state.board.pieces.get(id))
        .ok_or(IllegalAction::PieceNotFound)?;
    if &holder.owner_id != actor {
        return Err(IllegalAction::NotYourPiece);
    }
    if powers.by_id(&power.power_definition_id).is_none() {
        return Err(IllegalAction::UnknownPowerDefinition);
    }
    Ok(())
}

/// Runs the power's definition, then consumes the power.
fn apply_power(
    state: &mut GameState,
    power_id: &PowerId,
    powers: &PowerDefinitions,
) -> Result<(), IllegalAction> {
    let definition = state
        .board
        .powers
        .get(power_id)
        .and_then(|p| powers.by_id(&p.power_definition_id))
        .ok_or(IllegalAction::UnknownPowerDefinition)?;
    definition.apply(state, power_id)?;
    state.board.powers.remove(power_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GameConfig, Piece, Position, Power};
    use crate::spawn::NoSpawn;

    struct Fixture {
        state: GameState,
        a: UserId,
        b: UserId,
        powers: PowerDefinitions,
    }

    impl Fixture {
        fn new() -> Self {
            let a = UserId::from("alice");
            let b = UserId::from("bob");
            Self {
                state: GameState::initial(&a, &b, &GameConfig::default()),
                a,
                b,
                powers: PowerDefinitions::builtin(),
            }
        }

        fn piece(&self, x: u32, y: u32) -> PieceId {
            self.state.board.piece_at(Position::new(x, y)).unwrap().id.clone()
        }

        fn tile(&self, x: u32, y: u32) -> TileId {
            self.state.board.tile_at(Position::new(x, y)).unwrap().id.clone()
        }

        fn play(&mut self, actor: &str, action: Action) -> Result<(), IllegalAction> {
            let actor = UserId::from(actor);
            let opponent = if actor == self.a { self.b.clone() } else { self.a.clone() };
            let mut spawn = NoSpawn;
            let mut rules = Rules {
                powers: &self.powers,
                spawn: &mut spawn,
            };
            apply_action(&mut self.state, &actor, &opponent, &action, &mut rules)
        }

        fn step(&mut self, actor: &str, from: (u32, u32), to: (u32, u32)) -> Result<(), IllegalAction> {
            let action = Action::Move {
                piece_id: self.piece(from.0, from.1),
                tile_id: self.tile(to.0, to.1),
            };
            self.play(actor, action)
        }

        fn held_power(&mut self, holder: (u32, u32), authorized: &[&UserId]) -> PowerId {
            let piece_id = self.piece(holder.0, holder.1);
            let id = PowerId::from("held");
            self.state.board.powers.insert(
                id.clone(),
                Power {
                    id: id.clone(),
                    power_definition_id: "raise_tile".into(),
                    tile_id: None,
                    piece_id: Some(piece_id),
                    authorized_player_ids: authorized.iter().map(|u| (*u).clone()).collect(),
                },
            );
            id
        }
    }

    #[test]
    fn test_legal_move_passes_the_turn() {
        let mut f = Fixture::new();
        let piece = f.piece(0, 1);
        f.step("alice", (0, 1), (0, 2)).unwrap();

        assert_eq!(f.state.current_player_id, f.b);
        assert_eq!(f.state.moves_played, 1);
        assert_eq!(f.state.board.position_of(&piece), Some(Position::new(0, 2)));
    }

    #[test]
    fn test_wrong_player_is_refused_without_change() {
        let mut f = Fixture::new();
        let before = f.state.clone();
        assert_eq!(f.step("bob", (0, 6), (0, 5)), Err(IllegalAction::NotYourTurn));
        assert_eq!(f.state, before);

        f.step("alice", (0, 1), (0, 2)).unwrap();
        let before = f.state.clone();
        assert_eq!(f.step("alice", (0, 2), (0, 3)), Err(IllegalAction::NotYourTurn));
        assert_eq!(f.state, before);
        f.step("bob", (1, 6), (1, 5)).unwrap();
        assert_eq!(f.state.current_player_id, f.a);
    }

    #[test]
    fn test_validation_order_and_reasons() {
        let mut f = Fixture::new();
        let good_tile = f.tile(0, 2);

        let missing_piece = Action::Move {
            piece_id: PieceId::from("nope"),
            tile_id: good_tile.clone(),
        };
        assert_eq!(f.play("alice", missing_piece), Err(IllegalAction::PieceNotFound));

        let missing_tile = Action::Move {
            piece_id: f.piece(0, 1),
            tile_id: TileId::from("nope"),
        };
        assert_eq!(f.play("alice", missing_tile), Err(IllegalAction::TileNotFound));

        assert_eq!(f.step("alice", (0, 6), (0, 5)), Err(IllegalAction::NotYourPiece));

        f.state.finished = true;
        assert_eq!(f.step("bob", (0, 6), (0, 5)), Err(IllegalAction::GameFinished));
        assert_eq!(IllegalAction::NotYourTurn.to_string(), "Not your turn");
    }

    #[test]
    fn test_elevation_boundary() {
        let mut f = Fixture::new();
        let step_up = f.tile(0, 2);
        f.state.board.tiles.get_mut(&step_up).unwrap().elevation = 1;
        let too_high = f.tile(1, 2);
        f.state.board.tiles.get_mut(&too_high).unwrap().elevation = 2;

        assert_eq!(f.step("alice", (1, 1), (1, 2)), Err(IllegalAction::TileTooHigh));
        f.step("alice", (0, 1), (0, 2)).unwrap();
    }

    #[test]
    fn test_capture_is_by_position() {
        let mut f = Fixture::new();
        // A second tile at (5, 5) with bob's piece recorded on it.
        let twin = TileId::from("twin");
        f.state.board.tiles.insert(
            twin.clone(),
            crate::model::Tile {
                id: twin.clone(),
                position: Position::new(5, 5),
                elevation: 0,
            },
        );
        let victim = f.piece(5, 6);
        f.state.board.pieces.get_mut(&victim).unwrap().tile_id = twin;
        let mover = f.piece(5, 1);
        let target = f.tile(5, 5);

        f.play(
            "alice",
            Action::Move {
                piece_id: mover.clone(),
                tile_id: target.clone(),
            },
        )
        .unwrap();

        assert!(!f.state.board.pieces.contains_key(&victim));
        assert_eq!(f.state.board.pieces[&mover].tile_id, target);
    }

    #[test]
    fn test_moving_onto_own_piece_captures_it() {
        let mut f = Fixture::new();
        let own = f.piece(2, 0);
        f.step("alice", (2, 1), (2, 0)).unwrap();
        assert!(!f.state.board.pieces.contains_key(&own));
        assert_eq!(f.state.board.piece_count(&f.a), 19);
    }

    #[test]
    fn test_loose_power_is_picked_up() {
        let mut f = Fixture::new();
        let tile = f.tile(0, 2);
        let power = PowerId::from("loose");
        f.state
            .board
            .powers
            .insert(power.clone(), Power::on_tile(power.clone(), "raise_tile", tile));
        let mover = f.piece(0, 1);

        f.step("alice", (0, 1), (0, 2)).unwrap();

        let power = &f.state.board.powers[&power];
        assert_eq!(power.tile_id, None);
        assert_eq!(power.piece_id, Some(mover));
        assert_eq!(power.authorized_player_ids, vec![f.a.clone()]);
    }

    #[test]
    fn test_held_powers_fall_with_their_piece() {
        let mut f = Fixture::new();
        let b = f.b.clone();
        let power = f.held_power((3, 6), &[&b]);
        let target = f.tile(3, 6);
        let victim = f.piece(3, 6);
        let mover = f.piece(3, 1);
        f.play(
            "alice",
            Action::Move {
                piece_id: mover,
                tile_id: target,
            },
        )
        .unwrap();
        assert!(!f.state.board.pieces.contains_key(&victim));
        assert!(!f.state.board.powers.contains_key(&power));
    }

    #[test]
    fn test_victory_when_opponent_has_no_pieces() {
        let mut f = Fixture::new();
        let a_tile = f.tile(0, 0);
        let b_tile = f.tile(0, 1);
        f.state.board.pieces.clear();
        for (id, owner, tile) in [("0", &f.a, a_tile), ("1", &f.b, b_tile.clone())] {
            f.state.board.pieces.insert(
                PieceId::from(id),
                Piece {
                    id: PieceId::from(id),
                    owner_id: owner.clone(),
                    tile_id: tile,
                },
            );
        }

        f.play(
            "alice",
            Action::Move {
                piece_id: PieceId::from("0"),
                tile_id: b_tile,
            },
        )
        .unwrap();

        assert!(f.state.finished);
        assert_eq!(f.state.winner_id, Some(f.a.clone()));
        assert_eq!(f.step("bob", (0, 1), (0, 2)), Err(IllegalAction::GameFinished));
    }

    #[test]
    fn test_apply_power_raises_and_consumes() {
        let mut f = Fixture::new();
        let a = f.a.clone();
        let power = f.held_power((4, 1), &[&a]);
        let under = f.tile(4, 1);

        f.play("alice", Action::ApplyPower { power_id: power.clone() }).unwrap();

        assert_eq!(f.state.board.tiles[&under].elevation, 1);
        assert!(!f.state.board.powers.contains_key(&power));
        assert_eq!(f.state.current_player_id, f.b);
        assert_eq!(f.state.moves_played, 0);
    }

    #[test]
    fn test_apply_power_refusals() {
        let mut f = Fixture::new();
        let b = f.b.clone();
        let power = f.held_power((4, 1), &[&b]);
        assert_eq!(
            f.play("alice", Action::ApplyPower { power_id: power.clone() }),
            Err(IllegalAction::PowerNotAuthorized)
        );
        assert_eq!(
            f.play("alice", Action::ApplyPower { power_id: PowerId::from("x") }),
            Err(IllegalAction::PowerNotFound)
        );

        let tile = f.tile(4, 4);
        f.state.board.powers.get_mut(&power).unwrap().tile_id = Some(tile);
        assert_eq!(
            f.play("alice", Action::ApplyPower { power_id: power }),
            Err(IllegalAction::PowerNotHeld)
        );
    }
}
