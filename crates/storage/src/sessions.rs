// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat session persistence.
//!
//! One `sessions/<agent>.chat.json` per agent holding a channel → session
//! map. Writes are serialized through a store-level lock; reads are free.
//! Expiry is opportunistic: callers sweep when convenient, nothing runs on
//! a timer here.

use crate::atomic::{read_json, write_json};
use crate::error::StorageError;
use crate::store::StateStore;
use drover_core::{ChannelId, ChatSession, SessionId};
use std::collections::BTreeMap;
use std::time::Duration;

type SessionMap = BTreeMap<String, ChatSession>;

impl StateStore {
    fn read_sessions(&self, agent: &str) -> Result<SessionMap, StorageError> {
        Ok(read_json(&self.session_file_path(agent)?)?.unwrap_or_default())
    }

    fn write_sessions(&self, agent: &str, map: &SessionMap) -> Result<(), StorageError> {
        write_json(&self.session_file_path(agent)?, map)
    }

    /// Look up the session for `(agent, channel)`.
    pub fn chat_session(
        &self,
        agent: &str,
        channel: &ChannelId,
    ) -> Result<Option<ChatSession>, StorageError> {
        Ok(self.read_sessions(agent)?.get(channel.as_str()).cloned())
    }

    /// Store (or replace) the session for `(agent, channel)`.
    pub fn set_chat_session(
        &self,
        agent: &str,
        channel: &ChannelId,
        session: ChatSession,
    ) -> Result<(), StorageError> {
        let _guard = self.sessions_lock.lock();
        let mut map = self.read_sessions(agent)?;
        map.insert(channel.to_string(), session);
        self.write_sessions(agent, &map)
    }

    /// Return the existing session or create one with the given id.
    pub fn get_or_create_chat_session(
        &self,
        agent: &str,
        channel: &ChannelId,
        session_id: SessionId,
        now_ms: u64,
    ) -> Result<ChatSession, StorageError> {
        let _guard = self.sessions_lock.lock();
        let mut map = self.read_sessions(agent)?;
        if let Some(existing) = map.get(channel.as_str()) {
            return Ok(existing.clone());
        }
        let session = ChatSession::new(session_id, now_ms);
        map.insert(channel.to_string(), session.clone());
        self.write_sessions(agent, &map)?;
        Ok(session)
    }

    /// Refresh a session's last-message timestamp. No-op when absent.
    pub fn touch_chat_session(
        &self,
        agent: &str,
        channel: &ChannelId,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let _guard = self.sessions_lock.lock();
        let mut map = self.read_sessions(agent)?;
        if let Some(session) = map.get_mut(channel.as_str()) {
            session.last_message_at_ms = now_ms;
            self.write_sessions(agent, &map)?;
        }
        Ok(())
    }

    /// Remove the session for `(agent, channel)`. Returns whether one existed.
    pub fn clear_chat_session(
        &self,
        agent: &str,
        channel: &ChannelId,
    ) -> Result<bool, StorageError> {
        let _guard = self.sessions_lock.lock();
        let mut map = self.read_sessions(agent)?;
        let existed = map.remove(channel.as_str()).is_some();
        if existed {
            self.write_sessions(agent, &map)?;
        }
        Ok(existed)
    }

    /// Drop sessions older than `max_age`. Returns how many were removed.
    pub fn cleanup_expired_sessions(
        &self,
        agent: &str,
        max_age: Duration,
        now_ms: u64,
    ) -> Result<usize, StorageError> {
        let _guard = self.sessions_lock.lock();
        let mut map = self.read_sessions(agent)?;
        let before = map.len();
        map.retain(|_, session| !session.is_expired(max_age, now_ms));
        let removed = before - map.len();
        if removed > 0 {
            self.write_sessions(agent, &map)?;
        }
        Ok(removed)
    }

    /// Number of live sessions for an agent.
    pub fn active_session_count(&self, agent: &str) -> Result<usize, StorageError> {
        Ok(self.read_sessions(agent)?.len())
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
