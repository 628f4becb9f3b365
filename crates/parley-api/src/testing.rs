//! Shared fixtures for handler tests.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::bus::EventBus;
use parley_types::models::{Session, User};

use crate::{AppState, AppStateInner};

pub fn state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        bus: EventBus::new(),
    })
}

pub fn seed_user(state: &AppState, username: &str) -> User {
    let id = Uuid::new_v4();
    let email = format!("{username}@example.com");
    state.db.insert_user(id, Some(username), &email).unwrap();
    User {
        id,
        username: Some(username.to_string()),
        email,
        email_verified: true,
        image: None,
        name: None,
    }
}

/// A user who has not picked a username yet (fresh signup).
pub fn seed_user_without_username(state: &AppState, email: &str) -> User {
    let id = Uuid::new_v4();
    state.db.insert_user(id, None, email).unwrap();
    User {
        id,
        username: None,
        email: email.to_string(),
        email_verified: true,
        image: None,
        name: None,
    }
}

pub fn session_for(user: &User) -> Session {
    Session {
        user: Some(user.clone()),
        expires: Utc::now() + chrono::Duration::hours(1),
    }
}

pub fn anonymous_session() -> Session {
    Session {
        user: None,
        expires: Utc::now() + chrono::Duration::hours(1),
    }
}
