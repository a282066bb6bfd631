//! bcrypt hashing for account passwords.

use std::collections::HashMap;

use crate::error::AppError;
use bcrypt::{hash, verify};
use lazy_static::lazy_static;
use parking_lot::Mutex;

const DUMMY_PASSWORD: &str = "taskboard-dummy-password";

lazy_static! {
    // Keyed by work factor so an unknown e-mail costs exactly what a real check does.
    static ref DUMMY_HASHES: Mutex<HashMap<u32, String>> = Mutex::new(HashMap::new());
}

/// Hashes `password` with the given work factor (4..=31).
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    Ok(hash(password, cost)?)
}

/// A stored hash that bcrypt cannot parse is an internal error, not a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    Ok(verify(password, password_hash)?)
}

/// Burns the same time as a real verification at `cost` and always reports a mismatch.
pub fn verify_against_dummy(password: &str, cost: u32) -> bool {
    if let Some(dummy) = dummy_hash(cost) {
        let _ = verify(password, &dummy);
    }
    false
}

fn dummy_hash(cost: u32) -> Option<String> {
    if let Some(known) = DUMMY_HASHES.lock().get(&cost) {
        return Some(known.clone());
    }
    let fresh = hash(DUMMY_PASSWORD, cost).ok()?;
    Some(DUMMY_HASHES.lock().entry(cost).or_insert(fresh).clone())
}
