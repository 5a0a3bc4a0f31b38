//! The per-room voting lifecycle: open voting, close, reveal, reset, finish,
//! and the auto-reveal rule.

use super::AppState;
use crate::error::{RoomError, RoomResult};
use crate::notify::SessionParticipant;
use crate::protocol::{ServerMessage, VoteResult};
use crate::types::*;
use chrono::Utc;
use unicode_segmentation::UnicodeSegmentation;

/// Outcome of a vote attempt
enum VoteOutcome {
    /// Recorded; other online participants still have to vote
    Recorded,
    /// Recorded and it was the last outstanding vote: auto-reveal fired
    Revealed(Vec<VoteResult>, Vec<SessionParticipant>),
    /// Voting not open; vote dropped silently to avoid racing a close
    Ignored,
}

/// Validate a raw vote payload.
///
/// The emoji must be exactly one grapheme (a multi-codepoint emoji like a
/// skin-tone variant still counts as one) and the scale an integer in 1..=10.
pub fn validate_vote(emoji: &str, scale: i64) -> RoomResult<VoteValue> {
    let mut graphemes = emoji.graphemes(true);
    if graphemes.next().is_none() || graphemes.next().is_some() {
        return Err(RoomError::InvalidPayload(
            "emoji must be exactly one character".to_string(),
        ));
    }
    if !(1..=10).contains(&scale) {
        return Err(RoomError::InvalidPayload(
            "scale must be an integer between 1 and 10".to_string(),
        ));
    }
    Ok(VoteValue {
        emoji: emoji.to_string(),
        scale: scale as u8,
    })
}

impl Room {
    /// Results list: one entry per participant who voted, highest mood first
    pub fn results(&self) -> Vec<VoteResult> {
        let mut results: Vec<VoteResult> = self
            .participants
            .values()
            .filter_map(|p| {
                p.vote.as_ref().map(|v| VoteResult {
                    participant_id: p.persistent_id.clone(),
                    display_name: p.display_name.clone(),
                    emoji: v.emoji.clone(),
                    scale: v.scale,
                })
            })
            .collect();
        results.sort_by(|a, b| {
            b.scale
                .cmp(&a.scale)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        results
    }

    /// Flattened participant snapshot handed to the notifier boundary
    pub fn session_participants(&self) -> Vec<SessionParticipant> {
        let mut participants: Vec<SessionParticipant> = self
            .participants
            .values()
            .map(|p| SessionParticipant {
                persistent_id: p.persistent_id.clone(),
                display_name: p.display_name.clone(),
                vote: p.vote.clone(),
            })
            .collect();
        participants.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        participants
    }
}

impl AppState {
    /// Join or rejoin a room.
    ///
    /// Valid in every phase except `Finished`. The joiner's ack is queued
    /// before the presence broadcast, and a rejoiner after reveal receives
    /// the current results directly so it never renders the stale
    /// pre-reveal view.
    pub async fn join_room(
        &self,
        connection_id: &str,
        code: &str,
        display_name: &str,
        persistent_id: Option<&str>,
    ) -> RoomResult<()> {
        struct JoinView {
            voting_open: bool,
            revealed: Option<Vec<VoteResult>>,
        }

        let view = self
            .with_room_mut(code, |room| {
                if room.finished {
                    return Err(RoomError::Finished);
                }
                room.resolve_participant(connection_id, persistent_id, display_name);
                Ok(JoinView {
                    voting_open: room.voting_open,
                    revealed: room.results_revealed.then(|| room.results()),
                })
            })
            .await?;

        self.set_connection_room(connection_id, Some(code)).await;

        self.send_to(
            connection_id,
            ServerMessage::RoomJoined {
                code: code.to_string(),
            },
        )
        .await;
        if view.voting_open {
            self.send_to(connection_id, ServerMessage::VotingStarted).await;
        }
        if let Some(results) = view.revealed {
            self.send_to(connection_id, ServerMessage::ResultsRevealed { results })
                .await;
        }
        self.broadcast_presence(code).await;
        Ok(())
    }

    /// Record a vote and evaluate auto-reveal.
    ///
    /// Once every online participant has voted (and at least one is online)
    /// the room transitions straight to `Revealed` without an admin action.
    pub async fn submit_vote(
        &self,
        connection_id: &str,
        code: &str,
        emoji: &str,
        scale: i64,
    ) -> RoomResult<()> {
        let vote = validate_vote(emoji, scale)?;

        let outcome = self
            .with_room_mut(code, |room| {
                if room.finished {
                    return Err(RoomError::Finished);
                }
                if !room.voting_open {
                    return Ok(VoteOutcome::Ignored);
                }
                let participant =
                    room.participants.get_mut(connection_id).ok_or_else(|| {
                        RoomError::Unauthorized("Only room participants can vote".to_string())
                    })?;
                participant.has_voted = true;
                participant.vote = Some(vote);

                let all_online_voted = room.online_count() > 0
                    && room
                        .participants
                        .values()
                        .filter(|p| p.online)
                        .all(|p| p.has_voted);
                if all_online_voted {
                    room.results_revealed = true;
                    room.voting_open = false;
                    Ok(VoteOutcome::Revealed(
                        room.results(),
                        room.session_participants(),
                    ))
                } else {
                    Ok(VoteOutcome::Recorded)
                }
            })
            .await?;

        match outcome {
            VoteOutcome::Ignored => {}
            VoteOutcome::Recorded => {
                self.send_to(connection_id, ServerMessage::VoteAck).await;
                self.broadcast_presence(code).await;
            }
            VoteOutcome::Revealed(results, participants) => {
                self.send_to(connection_id, ServerMessage::VoteAck).await;
                self.broadcast_presence(code).await;
                self.broadcast_to_room(code, ServerMessage::ResultsRevealed { results })
                    .await;
                self.notifier.spawn_recap(code.to_string(), participants);
            }
        }
        Ok(())
    }

    /// Legacy manual close: stop accepting votes without revealing
    pub async fn close_voting(&self, connection_id: &str, code: &str) -> RoomResult<()> {
        self.with_room_mut(code, |room| {
            if room.finished {
                return Err(RoomError::Finished);
            }
            room.require_admin(connection_id, "close voting")?;
            room.voting_open = false;
            room.closed = true;
            Ok(())
        })
        .await?;
        self.broadcast_to_room(code, ServerMessage::VotingClosed).await;
        Ok(())
    }

    /// Re-open voting after a manual close. Revealed rooms need a reset
    /// first; re-running the vote on top of visible results is not allowed.
    pub async fn start_voting(&self, connection_id: &str, code: &str) -> RoomResult<()> {
        self.with_room_mut(code, |room| {
            if room.finished {
                return Err(RoomError::Finished);
            }
            room.require_admin(connection_id, "start voting")?;
            if room.results_revealed {
                return Err(RoomError::InvalidPayload(
                    "Results are already revealed, reset the round first".to_string(),
                ));
            }
            room.voting_open = true;
            room.closed = false;
            Ok(())
        })
        .await?;
        self.broadcast_to_room(code, ServerMessage::VotingStarted).await;
        Ok(())
    }

    /// Reveal the results to the whole room and hand a recap to the notifier
    pub async fn reveal(&self, connection_id: &str, code: &str) -> RoomResult<()> {
        let (results, participants) = self
            .with_room_mut(code, |room| {
                if room.finished {
                    return Err(RoomError::Finished);
                }
                room.require_admin(connection_id, "reveal results")?;
                room.results_revealed = true;
                room.voting_open = false;
                Ok((room.results(), room.session_participants()))
            })
            .await?;

        self.broadcast_to_room(code, ServerMessage::ResultsRevealed { results })
            .await;
        self.notifier.spawn_recap(code.to_string(), participants);
        Ok(())
    }

    /// Clear all votes for a new round. Participants are retained, so nobody
    /// has to re-join, and the room goes straight back to open voting.
    pub async fn reset(&self, connection_id: &str, code: &str) -> RoomResult<()> {
        self.with_room_mut(code, |room| {
            if room.finished {
                return Err(RoomError::Finished);
            }
            room.require_admin(connection_id, "reset the round")?;
            for participant in room.participants.values_mut() {
                participant.has_voted = false;
                participant.vote = None;
            }
            room.voting_open = true;
            room.closed = false;
            room.results_revealed = false;
            Ok(())
        })
        .await?;

        self.broadcast_presence(code).await;
        self.broadcast_to_room(code, ServerMessage::RoundReset).await;
        Ok(())
    }

    /// Terminal transition. Idempotent: the `finished` flag guards the
    /// single recap and persistence dispatch, so a racing second finish is a
    /// no-op.
    pub async fn finish(&self, connection_id: &str, code: &str) -> RoomResult<()> {
        let snapshot = self
            .with_room_mut(code, |room| {
                room.require_admin(connection_id, "finish the session")?;
                if room.finished {
                    return Ok(None);
                }
                room.finished = true;
                room.voting_open = false;
                Ok(Some(room.session_participants()))
            })
            .await?;

        if let Some(participants) = snapshot {
            tracing::info!("Room {} finished", code);
            self.broadcast_to_room(
                code,
                ServerMessage::SessionFinished {
                    code: code.to_string(),
                },
            )
            .await;
            self.notifier
                .spawn_recap(code.to_string(), participants.clone());
            self.notifier
                .spawn_persist(code.to_string(), Utc::now(), participants);
        }
        Ok(())
    }

    /// Explicit leave: the participant goes offline but keeps its record and
    /// vote, exactly like a connection loss, and stops receiving broadcasts.
    pub async fn leave_room(&self, connection_id: &str, code: &str) -> RoomResult<()> {
        let changed = self
            .with_room_mut(code, |room| {
                if room.finished {
                    return Ok(false);
                }
                Ok(room.mark_offline(connection_id))
            })
            .await?;

        self.set_connection_room(connection_id, None).await;
        if changed {
            self.broadcast_presence(code).await;
        }
        Ok(())
    }

    /// Connection-loss hook. The participant record and any vote survive;
    /// only its online flag changes, so the room keeps working for everyone
    /// else and the identity can be reclaimed on rejoin.
    pub async fn handle_disconnect(&self, connection_id: &str) {
        let room_code = self
            .connections
            .write()
            .await
            .remove(connection_id)
            .and_then(|handle| handle.room);
        let Some(code) = room_code else { return };

        let changed = self
            .with_room_mut(&code, |room| {
                if room.finished {
                    return Ok(false);
                }
                Ok(room.mark_offline(connection_id))
            })
            .await
            .unwrap_or(false);

        if changed {
            tracing::info!("Connection {} went offline in room {}", connection_id, code);
            self.broadcast_presence(&code).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn connect(
        state: &AppState,
        id: &str,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.register_connection(id, tx).await;
        rx
    }

    async fn three_person_room(state: &AppState) -> RoomCode {
        let _ = connect(state, "conn_ana").await;
        let _ = connect(state, "conn_ben").await;
        let _ = connect(state, "conn_cleo").await;
        let code = state
            .create_room("conn_ana", "Ana", Some("ana-1"))
            .await
            .unwrap();
        state
            .join_room("conn_ben", &code, "Ben", Some("ben-1"))
            .await
            .unwrap();
        state
            .join_room("conn_cleo", &code, "Cleo", Some("cleo-1"))
            .await
            .unwrap();
        code
    }

    #[test]
    fn test_vote_validation_rejects_out_of_range_scale() {
        assert!(matches!(
            validate_vote("😀", 0),
            Err(RoomError::InvalidPayload(_))
        ));
        assert!(matches!(
            validate_vote("😀", 11),
            Err(RoomError::InvalidPayload(_))
        ));
        assert!(validate_vote("😀", 1).is_ok());
        assert!(validate_vote("😀", 10).is_ok());
    }

    #[test]
    fn test_vote_validation_requires_single_grapheme() {
        assert!(matches!(
            validate_vote("ab", 5),
            Err(RoomError::InvalidPayload(_))
        ));
        assert!(matches!(
            validate_vote("😀😀", 5),
            Err(RoomError::InvalidPayload(_))
        ));
        assert!(matches!(
            validate_vote("", 5),
            Err(RoomError::InvalidPayload(_))
        ));
        // Multi-codepoint emoji are still one grapheme
        assert!(validate_vote("👍🏽", 5).is_ok());
        assert!(validate_vote("😢", 2).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_vote_leaves_state_untouched() {
        let state = AppState::new();
        let code = three_person_room(&state).await;

        let err = state
            .submit_vote("conn_ben", &code, "😀", 11)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::InvalidPayload(_)));

        let room = state.get_room(&code).await.unwrap();
        assert!(!room.participants.get("conn_ben").unwrap().has_voted);
        assert_eq!(room.phase(), RoomPhase::Open);
    }

    #[tokio::test]
    async fn test_auto_reveal_fires_on_last_online_vote() {
        let state = AppState::new();
        let code = three_person_room(&state).await;

        state.submit_vote("conn_ana", &code, "😀", 8).await.unwrap();
        state.submit_vote("conn_ben", &code, "😐", 5).await.unwrap();
        assert_eq!(
            state.get_room(&code).await.unwrap().phase(),
            RoomPhase::Open,
            "room stays open at 2/3 votes"
        );

        state.submit_vote("conn_cleo", &code, "😢", 2).await.unwrap();

        let room = state.get_room(&code).await.unwrap();
        assert_eq!(room.phase(), RoomPhase::Revealed);
        let results = room.results();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].display_name, "Ana");
        assert_eq!(results[0].scale, 8);
        assert_eq!(results[2].emoji, "😢");
    }

    #[tokio::test]
    async fn test_auto_reveal_ignores_offline_participants() {
        let state = AppState::new();
        let code = three_person_room(&state).await;

        state.handle_disconnect("conn_cleo").await;

        state.submit_vote("conn_ana", &code, "😀", 8).await.unwrap();
        state.submit_vote("conn_ben", &code, "😐", 5).await.unwrap();

        let room = state.get_room(&code).await.unwrap();
        assert_eq!(
            room.phase(),
            RoomPhase::Revealed,
            "offline participant must not block the round"
        );
        assert_eq!(room.results().len(), 2);
        // Cleo's record survives the disconnect
        assert!(room
            .participants
            .values()
            .any(|p| p.persistent_id == "cleo-1" && !p.online));
    }

    #[tokio::test]
    async fn test_vote_after_reveal_is_silently_ignored() {
        let state = AppState::new();
        let code = three_person_room(&state).await;
        state.reveal("conn_ana", &code).await.unwrap();

        // No error, no state change
        state.submit_vote("conn_ben", &code, "😀", 7).await.unwrap();
        let room = state.get_room(&code).await.unwrap();
        assert!(!room.participants.get("conn_ben").unwrap().has_voted);
    }

    #[tokio::test]
    async fn test_vote_on_closed_room_is_silently_ignored() {
        let state = AppState::new();
        let code = three_person_room(&state).await;
        state.close_voting("conn_ana", &code).await.unwrap();

        state.submit_vote("conn_ben", &code, "😀", 7).await.unwrap();
        let room = state.get_room(&code).await.unwrap();
        assert!(!room.participants.get("conn_ben").unwrap().has_voted);
        assert!(room.closed);

        // Re-opening lets the vote through again
        state.start_voting("conn_ana", &code).await.unwrap();
        state.submit_vote("conn_ben", &code, "😀", 7).await.unwrap();
        let room = state.get_room(&code).await.unwrap();
        assert!(room.participants.get("conn_ben").unwrap().has_voted);
    }

    #[tokio::test]
    async fn test_reset_round_trip() {
        let state = AppState::new();
        let code = three_person_room(&state).await;

        state.submit_vote("conn_ana", &code, "😀", 8).await.unwrap();
        state.reveal("conn_ana", &code).await.unwrap();
        assert_eq!(
            state.get_room(&code).await.unwrap().phase(),
            RoomPhase::Revealed
        );

        state.reset("conn_ana", &code).await.unwrap();

        let room = state.get_room(&code).await.unwrap();
        assert_eq!(room.phase(), RoomPhase::Open);
        assert_eq!(room.participants.len(), 3, "participants are retained");
        for participant in room.participants.values() {
            assert!(!participant.has_voted);
            assert!(participant.vote.is_none());
        }
        assert!(room.results().is_empty());

        // The next cycle looks exactly like the first
        state.submit_vote("conn_ana", &code, "🎉", 10).await.unwrap();
        assert!(state
            .get_room(&code)
            .await
            .unwrap()
            .participants
            .get("conn_ana")
            .unwrap()
            .has_voted);
    }

    #[tokio::test]
    async fn test_admin_only_transitions() {
        let state = AppState::new();
        let code = three_person_room(&state).await;

        for result in [
            state.reveal("conn_ben", &code).await,
            state.reset("conn_ben", &code).await,
            state.finish("conn_ben", &code).await,
            state.close_voting("conn_ben", &code).await,
            state.start_voting("conn_ben", &code).await,
        ] {
            assert!(matches!(result, Err(RoomError::Unauthorized(_))));
        }
        assert_eq!(
            state.get_room(&code).await.unwrap().phase(),
            RoomPhase::Open
        );
    }

    #[tokio::test]
    async fn test_finished_room_rejects_everything_but_finish() {
        let state = AppState::new();
        let code = three_person_room(&state).await;
        state.finish("conn_ana", &code).await.unwrap();

        let _ = connect(&state, "conn_late").await;
        assert!(matches!(
            state.join_room("conn_late", &code, "Late", None).await,
            Err(RoomError::Finished)
        ));
        assert!(matches!(
            state.submit_vote("conn_ana", &code, "😀", 5).await,
            Err(RoomError::Finished)
        ));
        assert!(matches!(
            state.reveal("conn_ana", &code).await,
            Err(RoomError::Finished)
        ));
        assert!(matches!(
            state.reset("conn_ana", &code).await,
            Err(RoomError::Finished)
        ));

        // Second finish is a no-op, not an error
        assert!(state.finish("conn_ana", &code).await.is_ok());
        assert_eq!(
            state.get_room(&code).await.unwrap().phase(),
            RoomPhase::Finished
        );
    }

    #[tokio::test]
    async fn test_start_voting_after_reveal_requires_reset() {
        let state = AppState::new();
        let code = three_person_room(&state).await;
        state.reveal("conn_ana", &code).await.unwrap();

        assert!(matches!(
            state.start_voting("conn_ana", &code).await,
            Err(RoomError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_rejoin_after_reveal_receives_results() {
        let state = AppState::new();
        let code = three_person_room(&state).await;
        state.submit_vote("conn_ben", &code, "😐", 5).await.unwrap();
        state.reveal("conn_ana", &code).await.unwrap();

        state.handle_disconnect("conn_ben").await;
        let mut rx = connect(&state, "conn_ben2").await;
        state
            .join_room("conn_ben2", &code, "Ben", Some("ben-1"))
            .await
            .unwrap();

        // room-joined first, then the current results, then presence
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::RoomJoined { .. }
        ));
        match rx.try_recv().unwrap() {
            ServerMessage::ResultsRevealed { results } => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].participant_id, "ben-1");
            }
            other => panic!("Expected results on rejoin, got {:?}", other),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Presence { .. }
        ));
    }

    #[tokio::test]
    async fn test_vote_ack_is_queued_before_presence() {
        let state = AppState::new();
        let code = three_person_room(&state).await;

        let mut rx = {
            // Re-register Ben to start from an empty queue
            let (tx, rx) = mpsc::unbounded_channel();
            state.register_connection("conn_ben", tx).await;
            state.set_connection_room("conn_ben", Some(&code)).await;
            rx
        };

        state.submit_vote("conn_ben", &code, "😐", 5).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::VoteAck));
        match rx.try_recv().unwrap() {
            ServerMessage::Presence { participants } => {
                let ben = participants
                    .iter()
                    .find(|p| p.persistent_id == "ben-1")
                    .unwrap();
                assert!(ben.has_voted);
            }
            other => panic!("Expected presence after ack, got {:?}", other),
        }
    }
}
