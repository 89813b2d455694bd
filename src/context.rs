// ABOUTME: Builds the bounded, role-normalized turn sequence sent upstream for each exchange
// ABOUTME: System persona first, newest user message last, oldest history trimmed to the turn cap
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Context Builder
//!
//! Translates stored conversation history into the turn sequence the
//! AI gateway ships upstream. The upstream API only knows two speaking
//! roles, so every stored message maps to either the user side or the
//! model side, with the persona instruction carried as a leading system
//! turn. The budget is expressed in turns, derived from a flat token
//! estimate per turn.

use crate::models::{Message, AI_SENTINEL};

/// Speaking role of one context turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Persona / instruction turn, always first when present
    System,
    /// Human side of the exchange
    User,
    /// AI side of the exchange
    Model,
}

impl Role {
    /// Map a stored message sender to its context role
    ///
    /// Everything not authored by the AI sentinel counts as the user
    /// side, so unknown senders never leak a third role upstream.
    #[must_use]
    pub fn from_sender(sender: &str) -> Self {
        if sender == AI_SENTINEL {
            Self::Model
        } else {
            Self::User
        }
    }
}

/// One turn in the upstream context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextTurn {
    pub role: Role,
    pub text: String,
}

impl ContextTurn {
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Assembles bounded contexts from history plus the incoming message
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_turns: usize,
    system_prompt: String,
}

impl ContextBuilder {
    #[must_use]
    pub fn new(max_turns: usize, system_prompt: impl Into<String>) -> Self {
        Self {
            max_turns: max_turns.max(2),
            system_prompt: system_prompt.into(),
        }
    }

    /// Build the turn sequence for one exchange
    ///
    /// The result always starts with the system turn, always ends with
    /// the new user message, and never exceeds the turn cap. When the
    /// history overflows the cap, the oldest history is dropped first.
    #[must_use]
    pub fn build(&self, history: &[Message], new_message: &str) -> Vec<ContextTurn> {
        let mut turns: Vec<ContextTurn> = Vec::with_capacity(history.len() + 2);
        turns.push(ContextTurn::system(self.system_prompt.clone()));
        for message in history {
            turns.push(ContextTurn {
                role: Role::from_sender(&message.sender),
                text: message.content.clone(),
            });
        }
        turns.push(ContextTurn::user(new_message));

        if turns.len() > self.max_turns {
            // Keep the system turn and the most recent tail.
            let keep_tail = self.max_turns - 1;
            let drop_from = turns.len() - keep_tail;
            turns.drain(1..drop_from);
        }

        turns
    }
}
